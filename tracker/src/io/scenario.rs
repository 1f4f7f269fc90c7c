//! Replay scenario files (`*.json`, schema `schemas/scenario/v1.schema.json`).
//!
//! A scenario declares the models and a script of engine operations. Ops may
//! carry a nested `body` that runs inside the step they open, which is how
//! call trees are expressed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::runtime::model::{Model, ModelRegistry, TargetPath};

pub const V1_SCHEMA: &str = include_str!("../../../schemas/scenario/v1.schema.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub models: Vec<ModelSpec>,
    pub script: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: TargetPath,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub properties: Vec<String>,
}

/// One engine operation. Async ops address their chain by `handle`, the name
/// given at `spawn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Sync action. Returns `returns` (default `null`) unless `throws` is set.
    Call {
        #[serde(default = "TargetPath::root")]
        target: TargetPath,
        name: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        body: Vec<Op>,
        #[serde(default)]
        returns: Value,
        /// Present even when the thrown value is `null`.
        #[serde(
            default,
            deserialize_with = "present_value",
            skip_serializing_if = "Option::is_none"
        )]
        throws: Option<Value>,
    },
    Spawn {
        handle: String,
        #[serde(default = "TargetPath::root")]
        target: TargetPath,
        name: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        body: Vec<Op>,
    },
    Resume {
        handle: String,
        #[serde(default)]
        body: Vec<Op>,
    },
    ResumeError {
        handle: String,
        error: Value,
        #[serde(default)]
        body: Vec<Op>,
    },
    Return {
        handle: String,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        body: Vec<Op>,
    },
    Throw {
        handle: String,
        error: Value,
        #[serde(default)]
        body: Vec<Op>,
    },
    Cancel {
        handle: String,
        #[serde(default = "default_reason")]
        reason: String,
    },
}

/// A field that is present deserializes to `Some`, `null` included.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn default_reason() -> String {
    "cancelled".to_string()
}

impl Op {
    pub fn handle(&self) -> Option<&str> {
        match self {
            Op::Call { .. } => None,
            Op::Spawn { handle, .. }
            | Op::Resume { handle, .. }
            | Op::ResumeError { handle, .. }
            | Op::Return { handle, .. }
            | Op::Throw { handle, .. }
            | Op::Cancel { handle, .. } => Some(handle),
        }
    }

    pub fn body(&self) -> &[Op] {
        match self {
            Op::Call { body, .. }
            | Op::Spawn { body, .. }
            | Op::Resume { body, .. }
            | Op::ResumeError { body, .. }
            | Op::Return { body, .. }
            | Op::Throw { body, .. } => body,
            Op::Cancel { .. } => &[],
        }
    }

    fn closes_chain(&self) -> bool {
        matches!(self, Op::Return { .. } | Op::Throw { .. } | Op::Cancel { .. })
    }
}

impl Scenario {
    pub fn build_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        for spec in &self.models {
            let model = spec.actions.iter().fold(
                Model::new(spec.path.clone(), spec.type_name.clone()),
                |model, action| model.with_action(action.clone()),
            );
            let model = spec
                .properties
                .iter()
                .fold(model, |model, property| model.with_property(property.clone()));
            registry.register(model);
        }
        registry
    }
}

/// Load and validate a scenario from disk.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_scenario(&raw).with_context(|| format!("load scenario {}", path.display()))
}

/// Parse and validate a scenario: schema conformance, then handle usage.
pub fn parse_scenario(raw: &str) -> Result<Scenario> {
    let instance: Value = serde_json::from_str(raw).context("parse scenario json")?;
    validate_schema(&instance)?;
    let scenario: Scenario =
        serde_json::from_value(instance).context("parse scenario as v1 struct")?;
    check_handles(&scenario.script)?;
    Ok(scenario)
}

/// Validate a scenario instance against the v1 JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(V1_SCHEMA).context("parse scenario schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("invalid schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[derive(Default)]
struct HandleUsage<'s> {
    spawned: HashSet<&'s str>,
    closed: HashSet<&'s str>,
    running: Vec<&'s str>,
    /// Chain whose step spawned each handle, if any.
    spawned_by: HashMap<&'s str, &'s str>,
}

impl<'s> HandleUsage<'s> {
    /// True when `handle` encloses a running step: it is running itself or
    /// it spawned (transitively) a chain that is.
    fn encloses_running(&self, handle: &str) -> bool {
        self.running.iter().any(|&running| {
            let mut cursor = Some(running);
            while let Some(current) = cursor {
                if current == handle {
                    return true;
                }
                cursor = self.spawned_by.get(current).copied();
            }
            false
        })
    }
}

/// Every async op must address a chain spawned earlier (in execution order),
/// still open, and not enclosing the step the op is nested in.
fn check_handles(script: &[Op]) -> Result<()> {
    let mut usage = HandleUsage::default();
    check_ops(script, &mut usage)
}

fn check_ops<'s>(ops: &'s [Op], usage: &mut HandleUsage<'s>) -> Result<()> {
    for op in ops {
        let handle = op.handle();
        if let Some(handle) = handle {
            if matches!(op, Op::Spawn { .. }) {
                if !usage.spawned.insert(handle) {
                    bail!("handle '{handle}' is spawned twice");
                }
                if let Some(&parent) = usage.running.last() {
                    usage.spawned_by.insert(handle, parent);
                }
            } else if !usage.spawned.contains(handle) {
                bail!("handle '{handle}' is used before it is spawned");
            } else if usage.closed.contains(handle) {
                bail!("handle '{handle}' is used after its chain was closed");
            } else if usage.running.contains(&handle) {
                bail!("handle '{handle}' is stepped from inside its own step");
            } else if usage.encloses_running(handle) {
                bail!("handle '{handle}' is stepped from inside a step of a chain it spawned");
            }
            usage.running.push(handle);
        }

        check_ops(op.body(), usage)?;

        if let Some(handle) = handle {
            usage.running.pop();
            if op.closes_chain() {
                usage.closed.insert(handle);
            }
        }
    }
    Ok(())
}
