//! Per-run scan ledger.
//!
//! A [`ScanRun`] collects the counters and log lines of one library scan and
//! is written out as a JSON-lines file when the scan ends: the run summary
//! first, then one line per log entry.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Library;

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

/// Severity of a scan log line. Persisted as its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
    Note = 6,
}

impl LogLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Trace),
            1 => Some(Self::Debug),
            2 => Some(Self::Info),
            3 => Some(Self::Warn),
            4 => Some(Self::Error),
            5 => Some(Self::Fatal),
            6 => Some(Self::Note),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Note => "NOTE",
        }
    }
}

/// Name of a raw level number, `"UNKNOWN"` if it is out of range.
pub fn level_name(level: u8) -> &'static str {
    LogLevel::from_u8(level).map_or("UNKNOWN", |l| l.name())
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

// ---------------------------------------------------------------------------
// Scan run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanKind {
    Scan,
    ForceScan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogEntry {
    /// ISO-8601, captured when the line was appended.
    pub timestamp: String,
    pub message: String,
    pub level_name: &'static str,
    pub level: LogLevel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub added: u32,
    pub updated: u32,
    pub missing: u32,
}

/// Progress event payload sent to clients while a scan is running.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEmitData<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: ScanKind,
    pub name: &'a str,
    pub results: ScanResults,
}

/// One execution of a library scan.
///
/// The `Serialize` impl is the summary line of the log file; log entries and
/// scanner bookkeeping are not part of it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    id: String,
    #[serde(rename = "type")]
    kind: ScanKind,
    /// Snapshot taken at `begin`; later library edits don't reach the run.
    library: Library,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    finished_at: Option<DateTime<Utc>>,
    /// Milliseconds.
    elapsed: Option<i64>,
    pub results_added: u32,
    pub results_updated: u32,
    pub results_missing: u32,
    #[serde(skip)]
    pub verbose: bool,
    #[serde(skip)]
    pub authors_removed_from_books: Vec<String>,
    #[serde(skip)]
    pub series_removed_from_books: Vec<String>,
    #[serde(skip)]
    logs: Vec<ScanLogEntry>,
}

impl ScanRun {
    pub fn begin(library: &Library, kind: ScanKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            library: library.clone(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed: None,
            results_added: 0,
            results_updated: 0,
            results_missing: 0,
            verbose: false,
            authors_removed_from_books: Vec::new(),
            series_removed_from_books: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        self.elapsed = Some((finished_at - self.started_at).num_milliseconds());
        self.finished_at = Some(finished_at);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.elapsed
    }

    pub fn logs(&self) -> &[ScanLogEntry] {
        &self.logs
    }

    /// Append a log line; `parts` are joined with single spaces.
    pub fn append_log<I, S>(&mut self, level: LogLevel, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let message = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        if self.verbose {
            debug!(library = %self.library.name, "[LibraryScan] {}", message);
        }

        self.logs.push(ScanLogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message,
            level_name: level.name(),
            level,
        });
    }

    pub fn total_results(&self) -> u32 {
        self.results_added + self.results_updated + self.results_missing
    }

    pub fn result_stats(&self) -> String {
        format!(
            "{} Added | {} Updated | {} Missing",
            self.results_added, self.results_updated, self.results_missing
        )
    }

    /// Elapsed time as `M:SS` or `H:MM:SS`; empty while the run is open.
    pub fn elapsed_timestamp(&self) -> String {
        self.elapsed
            .map(|ms| seconds_to_timestamp(ms.max(0) as u64 / 1000))
            .unwrap_or_default()
    }

    pub fn emit_data(&self) -> ScanEmitData<'_> {
        ScanEmitData {
            id: &self.library.id,
            kind: self.kind,
            name: &self.library.name,
            results: ScanResults {
                added: self.results_added,
                updated: self.results_updated,
                missing: self.results_missing,
            },
        }
    }

    pub fn log_filename(&self) -> String {
        format!("{}_{}.txt", Utc::now().format("%Y-%m-%d"), self.id)
    }

    /// Write the run to `<log_dir>/<YYYY-MM-DD>_<id>.txt`, creating the
    /// directory if needed. Returns the written path.
    pub fn persist(&self, log_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(log_dir)?;

        let mut contents = serde_json::to_string(self)?;
        contents.push('\n');
        for entry in &self.logs {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }

        let output_path = log_dir.join(self.log_filename());
        fs::write(&output_path, contents)?;

        info!(path = %output_path.display(), "[LibraryScan] Scan log saved");
        Ok(output_path)
    }
}

fn seconds_to_timestamp(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours == 0 {
        format!("{minutes}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}
