//! Run a few commands in a root shell, then one without escalation.
//!
//! # Prerequisites
//!
//! - SSH server on the target host
//! - A login user allowed to `sudo su -`
//!
//! # Usage
//!
//! ```bash
//! cargo run --example sudo_commands -- --host myserver --user deploy --password secret
//! ```
//!
//! The sudo password defaults to the login password; pass `--sudo-password`
//! when they differ.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sudossh::SessionBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .timeout(Duration::from_secs(args.timeout))
        .prompt_timeout(Duration::from_secs(120))
        .prompt(r"Do you want to continue\? \[Y/n\]", "Y");

    if let Some(password) = &args.password {
        builder = builder.password(password);
    }
    if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    }
    if let Some(sudo_password) = args.sudo_password.as_ref().or(args.password.as_ref()) {
        builder = builder.sudo_password(sudo_password);
    }

    let mut session = builder.connect().await?;
    println!("Connected!");

    println!("\nRoot shell");
    println!("{}", "-".repeat(50));
    let status = session
        .sudo(["whoami", "cd /etc", "pwd", "ls -la | head -5"])
        .await?;
    println!("{}", "-".repeat(50));
    println!("Root shell exited with {:?}", status);

    let response = session.run("whoami").await?;
    println!("\nWithout sudo, running as: {}", response.output.trim());

    println!("\nClosing connection...");
    session.close().await?;
    println!("Done!");

    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    sudo_password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 22u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "root".to_string());
        let mut password = None;
        let mut sudo_password = None;
        let mut key = None;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => host = value.unwrap_or(host),
                "--port" | "-p" => port = value.and_then(|v| v.parse().ok()).unwrap_or(22),
                "--user" | "-u" => user = value.unwrap_or(user),
                "--password" | "-P" => password = value,
                "--sudo-password" | "-S" => sudo_password = value,
                "--key" | "-k" => key = value.map(PathBuf::from),
                "--timeout" | "-t" => timeout = value.and_then(|v| v.parse().ok()).unwrap_or(30),
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        Self {
            host,
            port,
            user,
            password,
            sudo_password,
            key,
            timeout,
        }
    }

    fn print_help() {
        println!(
            r#"sudossh sudo_commands example

USAGE:
    cargo run --example sudo_commands -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>            Target host [default: localhost]
    -p, --port <PORT>            SSH port [default: 22]
    -u, --user <USER>            Username [default: $USER]
    -P, --password <PASS>        Password for authentication
    -S, --sudo-password <PASS>   Password for sudo [default: --password]
    -k, --key <PATH>             Path to SSH private key
    -t, --timeout <SECS>         Connection timeout [default: 30]
    --help                       Print this help message
"#
        );
    }
}
