//! Chat log sink
//!
//! One line per chat message, prefixed with the local time it was observed:
//! `[2024-01-31 18:04:05]<alice> hi`. Lines are flushed as they are written.

use crate::error::BotError;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl ChatRecord {
    pub fn new(timestamp: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    pub fn now(text: impl Into<String>) -> Self {
        Self::new(Local::now(), text)
    }

    /// The log line for this record, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!("[{}]{}", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}

/// Destination for observed chat. A failed write is fatal to the caller.
pub trait ChatSink: Send {
    fn record(&mut self, record: &ChatRecord) -> Result<(), BotError>;
}

impl<S: ChatSink + ?Sized> ChatSink for &mut S {
    fn record(&mut self, record: &ChatRecord) -> Result<(), BotError> {
        (**self).record(record)
    }
}

/// Keeps formatted lines in memory.
impl ChatSink for Vec<String> {
    fn record(&mut self, record: &ChatRecord) -> Result<(), BotError> {
        self.push(record.to_line());
        Ok(())
    }
}

/// Append-only UTF-8 text file, opened once.
pub struct FileChatSink {
    path: PathBuf,
    file: File,
}

impl FileChatSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| BotError::ChatSink {
                path: path.clone(),
                source,
            })?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChatSink for FileChatSink {
    fn record(&mut self, record: &ChatRecord) -> Result<(), BotError> {
        writeln!(self.file, "{}", record.to_line())
            .and_then(|()| self.file.flush())
            .map_err(|source| BotError::ChatSink {
                path: self.path.clone(),
                source,
            })
    }
}
