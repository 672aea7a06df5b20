use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info};
use wami_contracts::config::WamiConfig;
use wami_contracts::flows::Flow;
use wami_contracts::{Result, WamiError};

/// Raw image content as handed to the flow engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl OutputImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub output_files: Vec<OutputImage>,
}

/// The pixel-processing collaborator. Implementations own step semantics and
/// fail on parameters they cannot apply.
pub trait FlowEngine: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, flow: &Flow, inputs: &[ImageFile]) -> Result<EngineOutput>;
}

#[derive(Default)]
pub struct FlowEngineRegistry {
    engines: BTreeMap<String, Arc<dyn FlowEngine>>,
}

impl FlowEngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: FlowEngine + 'static>(&mut self, engine: E) {
        self.engines
            .insert(engine.name().to_string(), Arc::new(engine));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FlowEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn select(&self, name: &str) -> Result<Arc<dyn FlowEngine>> {
        self.get(name).ok_or_else(|| {
            WamiError::InvalidConfig(format!(
                "unknown engine '{name}' (available: {})",
                self.names().join(", ")
            ))
        })
    }
}

pub fn default_engine_registry(config: &WamiConfig) -> Result<FlowEngineRegistry> {
    let mut engines = FlowEngineRegistry::new();
    engines.register(DryrunEngine);
    if let Some(command) = config.engine_command.as_deref() {
        engines.register(ProcessEngine::from_command_line(command)?);
    }
    Ok(engines)
}

/// Hands every input back unchanged under its own name.
pub struct DryrunEngine;

impl FlowEngine for DryrunEngine {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn run(&self, flow: &Flow, inputs: &[ImageFile]) -> Result<EngineOutput> {
        debug!(flow = %flow.name, steps = flow.steps.len(), inputs = inputs.len(), "dryrun engine");
        Ok(EngineOutput {
            output_files: inputs
                .iter()
                .map(|file| OutputImage::new(file.name.clone(), file.bytes.clone()))
                .collect(),
        })
    }
}

/// Delegates to an external program invoked as
/// `<program> [args..] <flow.json> <input_dir> <output_dir>`.
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parses a configured command line with shell quoting: program, then
    /// leading arguments.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = shell_words::split(command)
            .map_err(|err| WamiError::InvalidConfig(format!("engine_command: {err}")))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| WamiError::InvalidConfig("engine_command is empty".to_string()))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.collect(),
        })
    }
}

impl FlowEngine for ProcessEngine {
    fn name(&self) -> &str {
        "process"
    }

    fn run(&self, flow: &Flow, inputs: &[ImageFile]) -> Result<EngineOutput> {
        let work = tempfile::tempdir().map_err(WamiError::engine)?;
        let flow_path = work.path().join("flow.json");
        let in_dir = work.path().join("in");
        let out_dir = work.path().join("out");
        fs::create_dir_all(&in_dir)?;
        fs::create_dir_all(&out_dir)?;
        fs::write(&flow_path, serde_json::to_vec_pretty(flow)?)?;
        for file in inputs {
            fs::write(in_dir.join(safe_file_name(&file.name)), &file.bytes)?;
        }

        info!(program = %self.program.display(), flow = %flow.name, "invoking engine process");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&flow_path)
            .arg(&in_dir)
            .arg(&out_dir)
            .status()
            .map_err(|err| WamiError::engine(format!("{}: {err}", self.program.display())))?;
        if !status.success() {
            return Err(WamiError::engine(format!(
                "{} exited with {status}",
                self.program.display()
            )));
        }

        Ok(EngineOutput {
            output_files: read_outputs(&out_dir)?,
        })
    }
}

fn read_outputs(dir: &Path) -> Result<Vec<OutputImage>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    let mut outputs = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("output")
            .to_string();
        outputs.push(OutputImage::new(name, fs::read(&path)?));
    }
    Ok(outputs)
}

/// Final path component of an image name, so names never escape a directory.
pub(crate) fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("image")
        .to_string()
}
