//! Replay orchestration: run a scenario script on a fresh engine with one
//! tracker installed and collect the hook events it produced.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::events::{EventLog, HookEvent};
use crate::core::hooks::TrackingHooks;
use crate::core::tracker::ActionTracker;
use crate::io::config::{TrackerConfig, load_config};
use crate::io::scenario::{Op, Scenario, load_scenario};
use crate::runtime::context::ContextId;
use crate::runtime::engine::{AsyncHandle, Engine, Scope};
use crate::runtime::fault::Fault;
use crate::runtime::middleware::{ActionError, ActionOutcome};

/// Hook events recorded during a replay, plus the fault that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub events: Vec<HookEvent>,
    pub fault: Option<Fault>,
}

impl ReplayOutcome {
    pub fn labels(&self) -> Vec<String> {
        self.events.iter().map(HookEvent::label).collect()
    }
}

/// Load both files and replay. A missing config file means the default
/// config, like a missing `--config`.
pub fn replay_files(config_path: Option<&Path>, scenario_path: &Path) -> Result<ReplayOutcome> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };
    let scenario = load_scenario(scenario_path)?;
    run_replay(&config, &scenario)
}

/// Replay `scenario` with a tracker configured from `config`.
///
/// Configuration problems are errors. A fault raised while the script runs
/// stops the script and is reported in the outcome next to the events
/// recorded up to that point.
pub fn run_replay(config: &TrackerConfig, scenario: &Scenario) -> Result<ReplayOutcome> {
    config.validate()?;
    let engine = Engine::new(scenario.build_registry());
    let log = EventLog::new();
    let tracker = ActionTracker::new(engine.registry(), config.target(), tracker_hooks(config, &log)?)
        .context("configure tracker")?;
    let id = tracker.install(&engine);
    debug!(model = %config.model, ops = scenario.script.len(), "replaying scenario");

    let interpreter = Interpreter {
        engine: &engine,
        handles: RefCell::new(HashMap::new()),
    };
    let fault = interpreter.run(None, &scenario.script).err();
    engine.remove_middleware(id);
    if let Some(fault) = &fault {
        warn!(%fault, "replay stopped on fault");
    }

    Ok(ReplayOutcome {
        events: log.events(),
        fault,
    })
}

fn tracker_hooks(config: &TrackerConfig, log: &EventLog) -> Result<TrackingHooks> {
    let hooks = if config.resume_suspend {
        log.hooks_with_resume_suspend()
    } else {
        log.hooks()
    };
    let names = config.name_filter()?;
    Ok(hooks.with_filter(move |ctx| names.allows(&ctx.name)))
}

/// Executes script ops against the engine. Nested bodies run inside the
/// step that opened them, with that step as parent.
struct Interpreter<'e> {
    engine: &'e Engine,
    handles: RefCell<HashMap<String, AsyncHandle>>,
}

impl Interpreter<'_> {
    fn run(&self, parent: Option<ContextId>, ops: &[Op]) -> Result<(), Fault> {
        for op in ops {
            self.step(parent, op)?;
        }
        Ok(())
    }

    fn step(&self, parent: Option<ContextId>, op: &Op) -> Result<(), Fault> {
        match op {
            Op::Call {
                target,
                name,
                args,
                body,
                returns,
                throws,
            } => {
                let outcome = self
                    .engine
                    .call_sync(parent, target, name, args.clone(), |scope| {
                        self.nested(scope, body)?;
                        Ok(match throws {
                            Some(error) => Err(ActionError(error.clone())),
                            None => Ok(returns.clone()),
                        })
                    })?;
                log_outcome(name, &outcome);
            }
            Op::Spawn {
                handle,
                target,
                name,
                args,
                body,
            } => {
                let spawned = self
                    .engine
                    .spawn(parent, target, name, args.clone(), |scope| {
                        self.nested(scope, body)
                    })?;
                self.handles.borrow_mut().insert(handle.clone(), spawned);
            }
            Op::Resume { handle, body } => {
                let chain = self.handle(handle)?;
                self.engine
                    .resume(chain, |scope| self.nested(scope, body))?;
            }
            Op::ResumeError {
                handle,
                error,
                body,
            } => {
                let chain = self.handle(handle)?;
                self.engine
                    .resume_error(chain, error.clone(), |scope| self.nested(scope, body))?;
            }
            Op::Return {
                handle,
                value,
                body,
            } => {
                let chain = self.handle(handle)?;
                let outcome = self.engine.finish_return(chain, |scope| {
                    self.nested(scope, body)?;
                    Ok(value.clone())
                })?;
                log_outcome(handle, &outcome);
            }
            Op::Throw {
                handle,
                error,
                body,
            } => {
                let chain = self.handle(handle)?;
                let outcome = self.engine.finish_throw(chain, |scope| {
                    self.nested(scope, body)?;
                    Ok(error.clone())
                })?;
                log_outcome(handle, &outcome);
            }
            Op::Cancel { handle, reason } => {
                let chain = self.handle(handle)?;
                let outcome = self.engine.cancel(chain, reason)?;
                log_outcome(handle, &outcome);
            }
        }
        Ok(())
    }

    fn nested(&self, scope: &Scope<'_>, body: &[Op]) -> Result<(), Fault> {
        self.run(Some(scope.context()), body)
    }

    fn handle(&self, name: &str) -> Result<AsyncHandle, Fault> {
        self.handles
            .borrow()
            .get(name)
            .copied()
            .ok_or_else(|| Fault::UnknownHandle(name.to_string()))
    }
}

fn log_outcome(label: &str, outcome: &ActionOutcome) {
    let (status, value): (&str, &Value) = match outcome {
        Ok(value) => ("returned", value),
        Err(ActionError(error)) => ("threw", error),
    };
    debug!(action = label, status, %value, "caller observed outcome");
}
