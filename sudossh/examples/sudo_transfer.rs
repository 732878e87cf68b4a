//! Install a local file at a root-owned path, two ways.
//!
//! The first copy is streamed through the root shell in base64 chunks. The
//! second is uploaded over SFTP to a private staging directory and moved
//! into place by root.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example sudo_transfer -- --host myserver --user deploy --password secret \
//!     --file ./motd --dest /etc/motd
//! ```

use std::env;
use std::path::PathBuf;

use sudossh::{CapturedOutput, Directive, SessionBuilder, TransferTask};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let Some(file) = args.file else {
        eprintln!("Error: Must provide --file");
        std::process::exit(1);
    };

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .output(CapturedOutput::new());
    if let Some(password) = &args.password {
        builder = builder.password(password).sudo_password(password);
    }

    let mut session = builder.connect().await?;

    println!("Streaming {} to {}...", file.display(), args.dest);
    let task = TransferTask::from_file(&file, &args.dest).with_chunk_size(4096);
    session
        .sudo([
            Directive::from(task),
            Directive::from(format!("chmod 0644 {}", args.dest)),
        ])
        .await?;

    println!("Uploading {} to {}.sftp via staging...", file.display(), args.dest);
    let content = std::fs::read(&file)?;
    session
        .sudo_put(&format!("{}.sftp", args.dest), content)
        .await?;

    let response = session
        .run(&format!("cmp {0} {0}.sftp && echo identical", args.dest))
        .await?;
    println!("{}", response.output.trim());

    session.close().await?;
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    file: Option<PathBuf>,
    dest: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 22,
            user: env::var("USER").unwrap_or_else(|_| "root".to_string()),
            password: None,
            file: None,
            dest: "/etc/motd".to_string(),
        };

        let mut i = 1;
        while i + 1 < args.len() {
            let value = args[i + 1].clone();
            match args[i].as_str() {
                "--host" | "-h" => parsed.host = value,
                "--port" | "-p" => parsed.port = value.parse().unwrap_or(22),
                "--user" | "-u" => parsed.user = value,
                "--password" | "-P" => parsed.password = Some(value),
                "--file" | "-f" => parsed.file = Some(PathBuf::from(value)),
                "--dest" | "-d" => parsed.dest = value,
                other => eprintln!("Unknown argument: {}", other),
            }
            i += 2;
        }

        parsed
    }
}
