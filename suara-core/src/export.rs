//! Save-to-file export.
//!
//! Text is trimmed, encoded as UTF-8 and handed to a [`DownloadSink`] under
//! the name `<kind>-<YYYY-MM-DD>.txt`. The sink decides what "download" means
//! on the host (browser blob download, a file in a chosen directory, …).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SuaraError};

pub const TEXT_MIME: &str = "text/plain;charset=utf-8";

/// Which buffer is being exported; determines the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// Text typed into the read-aloud editor.
    Written,
    /// Text produced by dictation.
    Recorded,
}

impl ExportKind {
    pub fn file_prefix(self) -> &'static str {
        match self {
            ExportKind::Written => "teks-saya",
            ExportKind::Recorded => "rekaman-saya",
        }
    }
}

/// Destination for exported files.
pub trait DownloadSink {
    fn deliver(&mut self, file_name: &str, mime: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Writes exports into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, file_name: &str, _mime: &str, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(file_name), bytes)
    }
}

pub fn export_file_name(kind: ExportKind, date: NaiveDate) -> String {
    format!("{}-{}.txt", kind.file_prefix(), date.format("%Y-%m-%d"))
}

/// Export `text` stamped with today's UTC date. Returns the file name used.
pub fn export_text(text: &str, kind: ExportKind, sink: &mut dyn DownloadSink) -> Result<String> {
    export_text_on(text, kind, Utc::now().date_naive(), sink)
}

/// As [`export_text`] with an explicit date.
///
/// # Errors
/// - `EmptyInput` for empty or whitespace-only text; the sink is not called.
/// - `Io` if the sink fails.
pub fn export_text_on(
    text: &str,
    kind: ExportKind,
    date: NaiveDate,
    sink: &mut dyn DownloadSink,
) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SuaraError::EmptyInput);
    }
    let file_name = export_file_name(kind, date);
    sink.deliver(&file_name, TEXT_MIME, text.as_bytes())?;
    info!(file = %file_name, bytes = text.len(), "text exported");
    Ok(file_name)
}
