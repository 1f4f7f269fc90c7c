//! Test-only helpers: a store model, engines with trackers installed, and
//! scenario files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::events::EventLog;
use crate::core::tracker::{ActionTracker, TrackerTarget};
use crate::runtime::engine::Engine;
use crate::runtime::middleware::MiddlewareId;
use crate::runtime::model::{Model, ModelRegistry, TargetPath};

/// Actions of the root `Store` model.
pub const STORE_ACTIONS: [&str; 6] = ["add", "fetch", "load", "ignored", "outer", "inner"];

/// `/` is a `Store` with [`STORE_ACTIONS`] and an `items` property; `/child`
/// is a `Child` with a single `tick` action.
pub fn store_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    let store = STORE_ACTIONS
        .iter()
        .fold(Model::new(TargetPath::root(), "Store"), |model, action| {
            model.with_action(*action)
        })
        .with_property("items");
    registry.register(store);
    registry.register(Model::new(child_path(), "Child").with_action("tick"));
    registry
}

pub fn child_path() -> TargetPath {
    TargetPath::parse("/child").expect("child path")
}

pub fn store_engine() -> Engine {
    Engine::new(store_registry())
}

/// Install a tracker recording into `log`.
pub fn track(
    engine: &Engine,
    target: TrackerTarget,
    log: &EventLog,
    resume_suspend: bool,
) -> MiddlewareId {
    let hooks = if resume_suspend {
        log.hooks_with_resume_suspend()
    } else {
        log.hooks()
    };
    ActionTracker::new(engine.registry(), target, hooks)
        .expect("tracker config")
        .install(engine)
}

/// Scenario document over the store models.
pub fn store_scenario(script: Value) -> Value {
    json!({
        "version": 1,
        "models": [
            { "path": "/", "type": "Store", "actions": STORE_ACTIONS, "properties": ["items"] },
            { "path": "/child", "type": "Child", "actions": ["tick"] }
        ],
        "script": script,
    })
}

/// Temporary directory holding scenario and config files.
pub struct ScenarioDir {
    temp: TempDir,
}

impl ScenarioDir {
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_scenario(&self, name: &str, scenario: &Value) -> PathBuf {
        let mut payload = serde_json::to_string_pretty(scenario).expect("serialize scenario");
        payload.push('\n');
        self.write(name, &payload)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }
}

impl Default for ScenarioDir {
    fn default() -> Self {
        Self::new()
    }
}
