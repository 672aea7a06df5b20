mod editor;
mod store;

use serde::{Deserialize, Serialize};
use serde_json::Number;
use uuid::Uuid;

use crate::error::{Result, WamiError};

pub use editor::{commit, commit_to_store, EditorForm, StepForm};
pub use store::{
    create_flow, delete_flow, find_by_name, upsert_by_name, FlowStore, JsonFlowStore,
    MemoryFlowStore,
};

/// A positional step parameter. Only primitive shapes are representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepParam {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl StepParam {
    pub fn int(value: i64) -> Self {
        Self::Number(Number::from(value))
    }

    /// Coerces a raw editor input: booleans first, then numbers, else text.
    pub fn from_input(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::int(value);
        }
        if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Self::Number(number);
        }
        Self::Text(raw.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(number) => number.as_i64(),
            _ => None,
        }
    }
}

impl From<i64> for StepParam {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

impl From<bool> for StepParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for StepParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Vec<StepParam>,
}

impl Step {
    pub fn new(kind: impl Into<String>, params: Vec<StepParam>) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub(crate) fn validate(&self, index: usize) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(WamiError::InvalidStep {
                index,
                reason: "missing type tag".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Flow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
        }
    }
}
