use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use wami_contracts::{Result, WamiError};

use crate::flow_engine::{ImageFile, OutputImage};

/// Where an input image may be written back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteHandle {
    Present(PathBuf),
    Absent,
}

impl WriteHandle {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Present(path) => Some(path),
            Self::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    pub file: ImageFile,
    pub handle: WriteHandle,
}

/// How an image entered the session.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// Picked from the filesystem; writable unless the file is read-only.
    Picked { path: PathBuf },
    Dropped { name: String, bytes: Vec<u8> },
    Fetched { name: String, bytes: Vec<u8> },
    Shared { name: String, bytes: Vec<u8> },
}

pub fn load(source: SourceDescriptor) -> Result<InputImage> {
    match source {
        SourceDescriptor::Picked { path } => {
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .and_then(|value| value.to_str())
                .unwrap_or("image")
                .to_string();
            let writable = fs::metadata(&path)
                .map(|meta| !meta.permissions().readonly())
                .unwrap_or(false);
            let handle = if writable {
                WriteHandle::Present(path)
            } else {
                WriteHandle::Absent
            };
            Ok(InputImage {
                file: ImageFile::new(name, bytes),
                handle,
            })
        }
        SourceDescriptor::Dropped { name, bytes }
        | SourceDescriptor::Fetched { name, bytes }
        | SourceDescriptor::Shared { name, bytes } => Ok(InputImage {
            file: ImageFile::new(name, bytes),
            handle: WriteHandle::Absent,
        }),
    }
}

fn writable_origin<'a>(inputs: &'a [InputImage], name: &str) -> Option<&'a Path> {
    inputs
        .iter()
        .filter(|input| input.file.name == name)
        .find_map(|input| input.handle.path())
}

/// All-or-nothing precondition for writing outputs back to their origins.
pub fn can_save_in_place(inputs: &[InputImage], outputs: &[OutputImage]) -> bool {
    inputs.len() == outputs.len()
        && outputs
            .iter()
            .all(|output| writable_origin(inputs, &output.name).is_some())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Preconditions did not hold; nothing was touched.
    Skipped,
    Saved(SaveReport),
}

/// Writes each output over the input it came from.
///
/// Failing to open a destination aborts the rest of the batch. A failed write
/// is recorded and the batch continues. Completed writes are never rolled back.
pub fn save_in_place(inputs: &[InputImage], outputs: &[OutputImage]) -> Result<SaveOutcome> {
    if outputs.is_empty() || !can_save_in_place(inputs, outputs) {
        return Ok(SaveOutcome::Skipped);
    }

    let mut report = SaveReport::default();
    for output in outputs {
        let path = writable_origin(inputs, &output.name)
            .ok_or_else(|| WamiError::acquisition(&output.name, "no writable origin"))?
            .to_path_buf();
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| WamiError::acquisition(path.display().to_string(), err))?;
        match file.write_all(&output.bytes).and_then(|_| file.flush()) {
            Ok(()) => report.written.push(path),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "save in place write failed");
                report.failed.push((path, err.to_string()));
            }
        }
    }
    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "save in place finished"
    );
    Ok(SaveOutcome::Saved(report))
}
