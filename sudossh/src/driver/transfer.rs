//! Chunked payload transfer through a shell pipe.
//!
//! Each chunk becomes one shell line that base64-decodes a literal payload
//! into the remote path:
//!
//! ```text
//! echo -n '<base64 chunk>' | base64 -d > /remote/path     (first chunk)
//! echo -n '<base64 chunk>' | base64 -d >> /remote/path    (every later chunk)
//! ```
//!
//! An empty source still produces one `>` line, which creates an empty file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::error::TransferError;

/// Default number of source bytes per transfer line.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Upper bound on the read buffer allocated up front; larger chunks grow it.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Shell redirection used for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// `>`: create or truncate the target.
    Truncate,
    /// `>>`: append to the target.
    Append,
}

impl Redirect {
    pub fn as_str(self) -> &'static str {
        match self {
            Redirect::Truncate => ">",
            Redirect::Append => ">>",
        }
    }
}

/// Build the shell line that writes `payload` to `remote_path`.
pub fn encode_chunk(payload: &[u8], redirect: Redirect, remote_path: &str) -> String {
    format!(
        "echo -n '{}' | base64 -d {} {}\n",
        STANDARD.encode(payload),
        redirect.as_str(),
        remote_path
    )
}

#[derive(Debug)]
enum TransferSource {
    File {
        path: PathBuf,
        reader: Option<BufReader<File>>,
    },
    Inline {
        content: Bytes,
        cursor: Option<usize>,
    },
}

/// A payload to deliver to a remote path, one chunk per dispatch cycle.
///
/// The source is opened lazily on first use. Opening an already-open task
/// rewinds it instead of reopening. The source is closed once it reports
/// end-of-data, and is never read after that.
#[derive(Debug)]
pub struct TransferTask {
    remote_path: String,
    chunk_size: usize,
    source: TransferSource,
}

impl TransferTask {
    /// Transfer the contents of a local file.
    pub fn from_file(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            source: TransferSource::File {
                path: local_path.into(),
                reader: None,
            },
        }
    }

    /// Transfer in-memory content.
    pub fn from_bytes(content: impl Into<Bytes>, remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            source: TransferSource::Inline {
                content: content.into(),
                cursor: None,
            },
        }
    }

    /// Set the number of source bytes per line (at least 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Local file backing this task, if any.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            TransferSource::File { path, .. } => Some(path),
            TransferSource::Inline { .. } => None,
        }
    }

    pub fn is_open(&self) -> bool {
        match &self.source {
            TransferSource::File { reader, .. } => reader.is_some(),
            TransferSource::Inline { cursor, .. } => cursor.is_some(),
        }
    }

    /// Open the source, or rewind it to the start if it is already open.
    pub fn open(&mut self) -> Result<(), TransferError> {
        match &mut self.source {
            TransferSource::File { path, reader } => {
                let result = match reader.as_mut() {
                    Some(open) => open.rewind(),
                    None => File::open(&*path).map(|file| {
                        *reader = Some(BufReader::new(file));
                    }),
                };
                result.map_err(|source| TransferError::SourceUnreadable {
                    path: path.clone(),
                    source,
                })
            }
            TransferSource::Inline { cursor, .. } => {
                *cursor = Some(0);
                Ok(())
            }
        }
    }

    /// Whether the source has no more data. A closed source is at its end.
    pub fn is_eof(&mut self) -> Result<bool, TransferError> {
        match &mut self.source {
            TransferSource::File { path, reader } => match reader {
                Some(reader) => reader
                    .fill_buf()
                    .map(|buf| buf.is_empty())
                    .map_err(|source| TransferError::SourceUnreadable {
                        path: path.clone(),
                        source,
                    }),
                None => Ok(true),
            },
            TransferSource::Inline { content, cursor } => {
                Ok(cursor.is_none_or(|pos| pos >= content.len()))
            }
        }
    }

    /// Read up to `chunk_size` bytes, opening the source first if needed.
    pub fn read_chunk(&mut self) -> Result<Vec<u8>, TransferError> {
        if !self.is_open() {
            self.open()?;
        }

        let chunk_size = self.chunk_size;
        match &mut self.source {
            TransferSource::File { path, reader } => {
                let mut chunk = Vec::with_capacity(chunk_size.min(MAX_PREALLOCATION));
                let result = match reader {
                    Some(reader) => reader
                        .by_ref()
                        .take(u64::try_from(chunk_size).unwrap_or(u64::MAX))
                        .read_to_end(&mut chunk),
                    None => Err(io::Error::other("source closed")),
                };
                result.map_err(|source| TransferError::SourceUnreadable {
                    path: path.clone(),
                    source,
                })?;
                Ok(chunk)
            }
            TransferSource::Inline { content, cursor } => {
                let start = cursor.unwrap_or(0).min(content.len());
                let end = start.saturating_add(chunk_size).min(content.len());
                *cursor = Some(end);
                Ok(content[start..end].to_vec())
            }
        }
    }

    /// Release the source. Does nothing if it was never opened.
    pub fn close(&mut self) {
        match &mut self.source {
            TransferSource::File { reader, .. } => *reader = None,
            TransferSource::Inline { cursor, .. } => *cursor = None,
        }
    }

    /// Produce the shell line for the next chunk.
    ///
    /// Returns the line and whether the transfer is complete. On completion
    /// the source has been closed and the task can be dropped; otherwise the
    /// task must be dispatched again to continue.
    pub fn next_line(&mut self) -> Result<(String, bool), TransferError> {
        let redirect = if self.is_open() {
            Redirect::Append
        } else {
            self.open()?;
            Redirect::Truncate
        };

        let payload = if self.is_eof()? {
            Vec::new()
        } else {
            self.read_chunk()?
        };

        let line = encode_chunk(&payload, redirect, &self.remote_path);

        let done = self.is_eof()?;
        if done {
            self.close();
        }

        Ok((line, done))
    }
}
