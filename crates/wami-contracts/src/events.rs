use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Session activity kept in `events.jsonl`, one tagged object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    RunState {
        running: bool,
    },
    FlowSelected {
        flow_id: String,
        name: String,
        steps: usize,
    },
    InputsPublished {
        names: Vec<String>,
    },
    OutputsPublished {
        names: Vec<String>,
        /// Write-back location of the first input, if it has one.
        origin: Option<PathBuf>,
    },
    AutoRunScheduled {
        flow_id: String,
        delay_ms: u64,
    },
    ActivationScrubbed {
        query: String,
    },
    ActivationFailed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Append-only event log owned by one session.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<File>,
}

impl EventLog {
    /// Opens `path` for appending, creating it and its directory if needed.
    pub fn open(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            session_id: session_id.into(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self, event: SessionEvent) -> Result<EventRecord> {
        let record = EventRecord {
            session_id: self.session_id.clone(),
            ts: Utc::now(),
            event,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        Ok(record)
    }

    /// Every record in the log at `path`, oldest first. A missing log is empty.
    pub fn read(path: &Path) -> Result<Vec<EventRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
