use serde::{Deserialize, Serialize};

use super::{Flow, FlowStore, Step, StepParam};
use crate::error::{Result, WamiError};

/// One step row of the editor, in visual order. `inputs` are the raw
/// parameter field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepForm {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorForm {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepForm>,
}

impl EditorForm {
    /// Snapshot of a flow as the editor would render it.
    pub fn from_flow(flow: &Flow) -> Self {
        Self {
            name: flow.name.clone(),
            steps: flow
                .steps
                .iter()
                .map(|step| StepForm {
                    kind: step.kind.clone(),
                    inputs: step.params.iter().map(param_to_input).collect(),
                })
                .collect(),
        }
    }
}

fn param_to_input(param: &StepParam) -> String {
    match param {
        StepParam::Bool(value) => value.to_string(),
        StepParam::Number(value) => value.to_string(),
        StepParam::Text(value) => value.clone(),
    }
}

/// Builds the canonical flow from editor state. Identity is kept; only
/// `name` and `steps` are replaced.
pub fn commit(flow: &Flow, form: &EditorForm) -> Result<Flow> {
    let mut steps = Vec::with_capacity(form.steps.len());
    for (index, row) in form.steps.iter().enumerate() {
        let step = Step::new(
            row.kind.trim(),
            row.inputs
                .iter()
                .map(|raw| StepParam::from_input(raw))
                .collect(),
        );
        step.validate(index)?;
        steps.push(step);
    }
    Ok(Flow {
        id: flow.id.clone(),
        name: form.name.clone(),
        steps,
    })
}

/// Commits the form and replaces the identified flow in the persisted
/// collection. A flow that is no longer in the collection is `FlowNotFound`.
pub fn commit_to_store(store: &dyn FlowStore, flow: &Flow, form: &EditorForm) -> Result<Flow> {
    let updated = commit(flow, form)?;
    let mut flows = store.get_flows()?;
    let slot = flows
        .iter_mut()
        .find(|candidate| candidate.id == updated.id)
        .ok_or_else(|| WamiError::FlowNotFound(updated.id.clone()))?;
    *slot = updated.clone();
    store.save_flows(&flows)?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::{commit, commit_to_store, EditorForm, StepForm};
    use crate::error::WamiError;
    use crate::flows::{create_flow, FlowStore, MemoryFlowStore, Step, StepParam};

    fn row(kind: &str, inputs: &[&str]) -> StepForm {
        StepForm {
            kind: kind.to_string(),
            inputs: inputs.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn commit_preserves_visual_order_and_params() -> anyhow::Result<()> {
        let store = MemoryFlowStore::default();
        let flow = create_flow(&store, "Draft", Vec::new())?;
        let form = EditorForm {
            name: "Postcard".to_string(),
            steps: vec![
                row("rotate", &["90"]),
                row("sepia-tone", &["80"]),
                row("flip", &[]),
                row("paint", &["5"]),
            ],
        };

        commit_to_store(&store, &flow, &form)?;

        let stored = store.get_flows()?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, flow.id);
        assert_eq!(stored[0].name, "Postcard");
        assert_eq!(
            stored[0].steps,
            vec![
                Step::new("rotate", vec![StepParam::int(90)]),
                Step::new("sepia-tone", vec![StepParam::int(80)]),
                Step::new("flip", Vec::new()),
                Step::new("paint", vec![StepParam::int(5)]),
            ]
        );
        Ok(())
    }

    #[test]
    fn commit_leaves_other_flows_in_place() -> anyhow::Result<()> {
        let store = MemoryFlowStore::default();
        let first = create_flow(&store, "First", Vec::new())?;
        let target = create_flow(&store, "Target", Vec::new())?;
        let last = create_flow(&store, "Last", vec![Step::new("negate", Vec::new())])?;

        let mut form = EditorForm::from_flow(&target);
        form.steps.push(row("blur", &["3"]));
        commit_to_store(&store, &target, &form)?;

        let names: Vec<String> = store
            .get_flows()?
            .into_iter()
            .map(|flow| flow.name)
            .collect();
        assert_eq!(names, vec!["First", "Target", "Last"]);
        assert_eq!(store.get_flows()?[0], first);
        assert_eq!(store.get_flows()?[2], last);
        Ok(())
    }

    #[test]
    fn commit_on_deleted_flow_is_not_found() -> anyhow::Result<()> {
        let store = MemoryFlowStore::default();
        let orphan = commit(
            &crate::flows::Flow::new("Gone", Vec::new()),
            &EditorForm {
                name: "Gone".to_string(),
                steps: Vec::new(),
            },
        )?;
        let err = commit_to_store(&store, &orphan, &EditorForm::from_flow(&orphan)).unwrap_err();
        assert!(matches!(err, WamiError::FlowNotFound(id) if id == orphan.id));
        Ok(())
    }

    #[test]
    fn form_roundtrips_existing_flow() -> anyhow::Result<()> {
        let flow = crate::flows::Flow::new(
            "Mixed",
            vec![Step::new(
                "custom",
                vec![StepParam::Bool(true), StepParam::int(7), StepParam::from("left")],
            )],
        );
        let recommitted = commit(&flow, &EditorForm::from_flow(&flow))?;
        assert_eq!(recommitted, flow);
        Ok(())
    }
}
