use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Flow, Step};
use crate::error::{Result, WamiError};

pub const FLOWS_SCHEMA_VERSION: u64 = 1;

/// Persistence collaborator for the whole flow collection.
///
/// Writes replace the full collection; concurrent writers are last-writer-wins.
pub trait FlowStore: Send + Sync {
    fn get_flows(&self) -> Result<Vec<Flow>>;
    fn save_flows(&self, flows: &[Flow]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct FlowsFile {
    schema_version: u64,
    #[serde(default)]
    flows: Vec<Flow>,
}

#[derive(Debug, Clone)]
pub struct JsonFlowStore {
    path: PathBuf,
}

impl JsonFlowStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlowStore for JsonFlowStore {
    fn get_flows(&self) -> Result<Vec<Flow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(WamiError::persistence)?;
        let parsed: FlowsFile = serde_json::from_str(&raw).map_err(|err| {
            WamiError::persistence(format!("{}: {err}", self.path.display()))
        })?;
        Ok(parsed.flows)
    }

    fn save_flows(&self, flows: &[Flow]) -> Result<()> {
        let payload = FlowsFile {
            schema_version: FLOWS_SCHEMA_VERSION,
            flows: flows.to_vec(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(WamiError::persistence)?;
        }
        let raw = serde_json::to_string_pretty(&payload)?;
        std::fs::write(&self.path, raw).map_err(WamiError::persistence)?;
        debug!(path = %self.path.display(), count = flows.len(), "flows saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    flows: Mutex<Vec<Flow>>,
}

impl MemoryFlowStore {
    pub fn new(flows: Vec<Flow>) -> Self {
        Self {
            flows: Mutex::new(flows),
        }
    }
}

impl FlowStore for MemoryFlowStore {
    fn get_flows(&self) -> Result<Vec<Flow>> {
        let flows = self
            .flows
            .lock()
            .map_err(|_| WamiError::persistence("flow store lock poisoned"))?;
        Ok(flows.clone())
    }

    fn save_flows(&self, flows: &[Flow]) -> Result<()> {
        let mut guard = self
            .flows
            .lock()
            .map_err(|_| WamiError::persistence("flow store lock poisoned"))?;
        *guard = flows.to_vec();
        Ok(())
    }
}

pub fn find_by_name<'a>(flows: &'a [Flow], name: &str) -> Option<&'a Flow> {
    flows.iter().find(|flow| flow.name == name)
}

pub fn create_flow(store: &dyn FlowStore, name: &str, steps: Vec<Step>) -> Result<Flow> {
    for (index, step) in steps.iter().enumerate() {
        step.validate(index)?;
    }
    let mut flows = store.get_flows()?;
    let flow = Flow::new(name, steps);
    flows.push(flow.clone());
    store.save_flows(&flows)?;
    Ok(flow)
}

/// Name-keyed reuse: the first flow named `name` gets `steps`, otherwise a
/// new flow is appended. Returns the target and whether it was created.
pub fn upsert_by_name(store: &dyn FlowStore, name: &str, steps: Vec<Step>) -> Result<(Flow, bool)> {
    for (index, step) in steps.iter().enumerate() {
        step.validate(index)?;
    }
    let mut flows = store.get_flows()?;
    let (flow, created) = match flows.iter_mut().find(|flow| flow.name == name) {
        Some(existing) => {
            existing.steps = steps;
            (existing.clone(), false)
        }
        None => {
            let flow = Flow::new(name, steps);
            flows.push(flow.clone());
            (flow, true)
        }
    };
    store.save_flows(&flows)?;
    debug!(name, created, "flow upserted by name");
    Ok((flow, created))
}

/// Returns `false` when no flow carried `id`.
pub fn delete_flow(store: &dyn FlowStore, id: &str) -> Result<bool> {
    let mut flows = store.get_flows()?;
    let before = flows.len();
    flows.retain(|flow| flow.id != id);
    if flows.len() == before {
        return Ok(false);
    }
    store.save_flows(&flows)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{
        create_flow, delete_flow, find_by_name, upsert_by_name, FlowStore, JsonFlowStore,
        MemoryFlowStore,
    };
    use crate::error::WamiError;
    use crate::flows::{Step, StepParam};

    #[test]
    fn missing_file_reads_as_empty_collection() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFlowStore::new(temp.path().join("nested/flows.json"));
        assert!(store.get_flows()?.is_empty());
        Ok(())
    }

    #[test]
    fn saved_flows_reload_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFlowStore::new(temp.path().join("nested/flows.json"));
        let first = create_flow(
            &store,
            "Sepia",
            vec![Step::new("sepia-tone", vec![StepParam::int(80)])],
        )?;
        let second = create_flow(&store, "Flip", vec![Step::new("flip", Vec::new())])?;

        let reloaded = JsonFlowStore::new(store.path()).get_flows()?;
        assert_eq!(reloaded, vec![first.clone(), second]);
        assert_eq!(find_by_name(&reloaded, "Sepia"), Some(&first));
        Ok(())
    }

    #[test]
    fn malformed_file_is_a_persistence_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("flows.json");
        std::fs::write(&path, "{not json")?;
        let err = JsonFlowStore::new(path).get_flows().unwrap_err();
        assert!(matches!(err, WamiError::Persistence(_)));
        Ok(())
    }

    #[test]
    fn delete_reports_whether_flow_existed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFlowStore::new(temp.path().join("flows.json"));
        let flow = create_flow(&store, "Blur", vec![Step::new("blur", vec![StepParam::int(3)])])?;
        assert!(delete_flow(&store, &flow.id)?);
        assert!(!delete_flow(&store, &flow.id)?);
        assert!(store.get_flows()?.is_empty());
        Ok(())
    }

    #[test]
    fn create_rejects_untagged_steps() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFlowStore::new(temp.path().join("flows.json"));
        let err = create_flow(&store, "Bad", vec![Step::new(" ", Vec::new())]).unwrap_err();
        assert!(matches!(err, WamiError::InvalidStep { index: 0, .. }));
        Ok(())
    }

    #[test]
    fn upsert_overwrites_steps_of_a_same_named_flow() -> anyhow::Result<()> {
        let store = MemoryFlowStore::default();
        let other = create_flow(&store, "Flip", vec![Step::new("flip", Vec::new())])?;
        let (first, created) =
            upsert_by_name(&store, "resize 250", vec![Step::new("blur", vec![StepParam::int(3)])])?;
        assert!(created);

        let steps = vec![Step::new("resize-width-if-larger", vec![StepParam::int(250)])];
        let (second, created) = upsert_by_name(&store, "resize 250", steps.clone())?;
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.steps, steps);

        let flows = store.get_flows()?;
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0], other);
        assert_eq!(flows[1], second);
        Ok(())
    }
}
