use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use wami_contracts::flows::Flow;
use wami_contracts::{Result, WamiError};

use crate::flow_engine::{safe_file_name, FlowEngine, ImageFile, OutputImage};
use crate::observer::{OutputDisplay, SessionObserver};
use crate::provenance::{self, InputImage, SaveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    NoFlow,
    NoInputs,
    /// A scheduled run whose flow is no longer current.
    FlowChanged,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Published { count: usize },
    /// Navigation or a newer run took over before the engine returned; the
    /// late result was dropped.
    Superseded,
    Skipped(SkipReason),
}

struct PendingAutoRun {
    id: u64,
    cancel: Arc<AtomicBool>,
    wake: mpsc::Sender<()>,
}

impl PendingAutoRun {
    fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
    }
}

#[derive(Default)]
struct SessionState {
    current_flow: Option<Flow>,
    inputs: Vec<InputImage>,
    outputs: Vec<OutputImage>,
    /// Token of the run allowed to publish, if one is in flight.
    running: Option<u64>,
    next_token: u64,
    pending_auto_run: Option<PendingAutoRun>,
}

impl SessionState {
    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn cancel_auto_run(&mut self) {
        if let Some(pending) = self.pending_auto_run.take() {
            pending.cancel();
        }
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    engine: Arc<dyn FlowEngine>,
    observer: Arc<dyn SessionObserver>,
}

/// The orchestration core: owns the current flow, input batch and outputs
/// and runs at most one flow at a time.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(engine: Arc<dyn FlowEngine>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::default()),
                engine,
                observer,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn observer(&self) -> &dyn SessionObserver {
        self.inner.observer.as_ref()
    }

    pub fn engine_name(&self) -> &str {
        self.inner.engine.name()
    }

    pub fn current_flow(&self) -> Option<Flow> {
        self.lock().current_flow.clone()
    }

    pub fn inputs(&self) -> Vec<InputImage> {
        self.lock().inputs.clone()
    }

    pub fn outputs(&self) -> Vec<OutputImage> {
        self.lock().outputs.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Navigates to `flow`. Any in-flight run is superseded, any scheduled
    /// run is cancelled and previous outputs are dropped.
    pub fn select_flow(&self, flow: Flow) {
        let was_running = {
            let mut state = self.lock();
            state.cancel_auto_run();
            state.outputs.clear();
            state.current_flow = Some(flow.clone());
            state.running.take().is_some()
        };
        if was_running {
            debug!(flow = %flow.name, "in-flight run superseded by navigation");
            self.observer().running_changed(false);
        }
        self.observer().flow_selected(&flow);
    }

    /// Picks up an edit of the current flow without navigating. Returns
    /// whether `flow` was the current one.
    pub fn refresh_flow(&self, flow: &Flow) -> bool {
        let mut state = self.lock();
        match state.current_flow.as_mut() {
            Some(current) if current.id == flow.id => {
                *current = flow.clone();
                true
            }
            _ => false,
        }
    }

    /// Replaces the input batch. A pending scheduled run is cancelled.
    pub fn set_inputs(&self, inputs: Vec<InputImage>) {
        {
            let mut state = self.lock();
            state.cancel_auto_run();
            state.inputs = inputs.clone();
        }
        self.observer().inputs_published(&inputs);
    }

    /// Runs the current flow over the current inputs.
    ///
    /// Engine failures clear the running state and are returned; they are
    /// never retried.
    pub fn run(&self) -> Result<RunOutcome> {
        self.run_with(|_| None)
    }

    fn run_with(
        &self,
        precheck: impl FnOnce(&mut SessionState) -> Option<SkipReason>,
    ) -> Result<RunOutcome> {
        let (token, flow, files, origin) = {
            let mut state = self.lock();
            if let Some(reason) = precheck(&mut state) {
                return Ok(RunOutcome::Skipped(reason));
            }
            if state.running.is_some() {
                return Ok(RunOutcome::Skipped(SkipReason::AlreadyRunning));
            }
            let Some(flow) = state.current_flow.clone() else {
                return Ok(RunOutcome::Skipped(SkipReason::NoFlow));
            };
            let Some(first) = state.inputs.first() else {
                return Ok(RunOutcome::Skipped(SkipReason::NoInputs));
            };
            let origin = first.handle.clone();
            let files: Vec<ImageFile> = state.inputs.iter().map(|input| input.file.clone()).collect();
            let token = state.issue_token();
            state.running = Some(token);
            state.outputs.clear();
            (token, flow, files, origin)
        };

        self.observer().running_changed(true);
        info!(flow = %flow.name, inputs = files.len(), token, engine = self.engine_name(), "run started");
        let result = self.inner.engine.run(&flow, &files);

        let mut state = self.lock();
        if state.running != Some(token) {
            debug!(token, "late run result discarded");
            return Ok(RunOutcome::Superseded);
        }
        state.running = None;
        match result {
            Ok(output) => {
                state.outputs = output.output_files;
                let displays: Vec<OutputDisplay> = state
                    .outputs
                    .iter()
                    .map(|output| OutputDisplay {
                        name: output.name.clone(),
                        size: output.bytes.len(),
                        origin: origin.clone(),
                    })
                    .collect();
                drop(state);
                info!(token, outputs = displays.len(), "run finished");
                self.observer().outputs_published(&displays);
                self.observer().running_changed(false);
                Ok(RunOutcome::Published {
                    count: displays.len(),
                })
            }
            Err(err) => {
                drop(state);
                warn!(token, error = %err, "run failed");
                self.observer().running_changed(false);
                Err(err)
            }
        }
    }

    /// Runs the current flow after `delay` unless cancelled, navigated away
    /// from, or replaced by a newer schedule first.
    pub fn schedule_auto_run(&self, delay: Duration) -> Option<AutoRunHandle> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (wake, wakeup) = mpsc::channel();
        let (flow, id) = {
            let mut state = self.lock();
            let flow = state.current_flow.clone()?;
            state.cancel_auto_run();
            let id = state.issue_token();
            state.pending_auto_run = Some(PendingAutoRun {
                id,
                cancel: cancel.clone(),
                wake: wake.clone(),
            });
            (flow, id)
        };
        self.observer().auto_run_scheduled(&flow, delay);

        let session = self.clone();
        let thread_cancel = cancel.clone();
        let keepalive = wake.clone();
        let thread = thread::spawn(move || {
            let _keepalive = keepalive;
            let _ = wakeup.recv_timeout(delay);
            session.run_with(|state| {
                if state.pending_auto_run.as_ref().map(|pending| pending.id) == Some(id) {
                    state.pending_auto_run = None;
                }
                if thread_cancel.load(Ordering::SeqCst) {
                    return Some(SkipReason::Cancelled);
                }
                let current = state.current_flow.as_ref().map(|current| current.id.as_str());
                if current != Some(flow.id.as_str()) {
                    return Some(SkipReason::FlowChanged);
                }
                None
            })
        });

        Some(AutoRunHandle {
            cancel,
            wake,
            thread,
        })
    }

    pub fn save_in_place(&self) -> Result<SaveOutcome> {
        let (inputs, outputs) = {
            let state = self.lock();
            if state.running.is_some() {
                return Ok(SaveOutcome::Skipped);
            }
            (state.inputs.clone(), state.outputs.clone())
        };
        provenance::save_in_place(&inputs, &outputs)
    }

    /// Writes the current outputs into `dir`, one file per output.
    pub fn export_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let outputs = self.outputs();
        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(dir)?;
        let mut taken = HashSet::with_capacity(outputs.len());
        let mut written = Vec::with_capacity(outputs.len());
        for output in outputs {
            let name = unique_file_name(&safe_file_name(&output.name), &mut taken);
            if name != output.name {
                debug!(output = %output.name, exported = %name, "export name adjusted");
            }
            let path = dir.join(name);
            fs::write(&path, &output.bytes)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// `name`, or `stem-N.ext` with the smallest N >= 2 not yet in `taken`.
fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 2usize;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[derive(Debug)]
pub struct AutoRunHandle {
    cancel: Arc<AtomicBool>,
    wake: mpsc::Sender<()>,
    thread: JoinHandle<Result<RunOutcome>>,
}

impl AutoRunHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
    }

    /// Waits for the scheduled run to fire (or be skipped).
    pub fn join(self) -> Result<RunOutcome> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(WamiError::engine("auto-run thread panicked")))
    }
}
