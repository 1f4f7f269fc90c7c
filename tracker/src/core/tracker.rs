//! The action-tracking middleware.
//!
//! One [`ActionTracker`] observes every step of the actions running inside
//! its model subtree. Each step is simplified to its invocation, checked by
//! the acceptance filter and then driven through the lifecycle: the `next`
//! continuation is bracketed by a real resume and a guaranteed suspend.

use std::rc::Rc;

use tracing::error;

use crate::core::error::ConfigError;
use crate::core::filter::AcceptanceFilter;
use crate::core::hooks::TrackingHooks;
use crate::core::lifecycle::LifecycleDriver;
use crate::core::local_store::LocalStore;
use crate::core::simplify::{SimpleActionContext, simplify};
use crate::core::types::ActionTrackingResult;
use crate::runtime::context::{ActionContext, ActionKind, AsyncStepType, ContextTree};
use crate::runtime::engine::Engine;
use crate::runtime::fault::Fault;
use crate::runtime::middleware::{ActionError, Flow, Middleware, MiddlewareId};
use crate::runtime::model::{MemberKind, ModelRegistry, TargetPath};

/// Which model (and optionally which single action) a tracker watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTarget {
    pub model: String,
    pub action_name: Option<String>,
}

impl TrackerTarget {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            action_name: None,
        }
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.action_name = Some(name.into());
        self
    }
}

#[derive(Debug)]
pub struct ActionTracker {
    target: TargetPath,
    action_name: Option<String>,
    store: LocalStore,
    hooks: TrackingHooks,
}

impl ActionTracker {
    /// Validate `target` against `registry` and mint a private store key.
    ///
    /// An empty `action_name` means "every action".
    pub fn new(
        registry: &ModelRegistry,
        target: TrackerTarget,
        hooks: TrackingHooks,
    ) -> Result<Self, ConfigError> {
        let path =
            TargetPath::parse(&target.model).map_err(|source| ConfigError::InvalidTarget {
                raw: target.model.clone(),
                source,
            })?;
        let model = registry
            .get(&path)
            .ok_or_else(|| ConfigError::NotAModel(path.clone()))?;

        let action_name = target.action_name.filter(|name| !name.is_empty());
        if let Some(name) = action_name
            .as_deref()
            .filter(|name| model.member(name) != Some(MemberKind::Action))
        {
            return Err(ConfigError::NotAnAction {
                model: path,
                name: name.to_string(),
            });
        }

        Ok(Self {
            target: path,
            action_name,
            store: LocalStore::new(),
            hooks,
        })
    }

    pub fn action_name(&self) -> Option<&str> {
        self.action_name.as_deref()
    }

    /// Store holding this tracker's per-invocation records.
    pub fn store(&self) -> LocalStore {
        self.store
    }

    /// Register on `engine`. Dispose with [`Engine::remove_middleware`].
    pub fn install(self, engine: &Engine) -> MiddlewareId {
        engine.add_middleware(Rc::new(self))
    }

    fn acceptance(&self) -> AcceptanceFilter<'_> {
        AcceptanceFilter {
            action_name: self.action_name(),
            store: self.store,
            hooks: &self.hooks,
        }
    }

    fn driver(&self) -> LifecycleDriver<'_> {
        LifecycleDriver {
            store: self.store,
            hooks: &self.hooks,
        }
    }
}

impl Middleware for ActionTracker {
    fn target(&self) -> &TargetPath {
        &self.target
    }

    fn filter(&self, tree: &ContextTree, ctx: &ActionContext) -> bool {
        self.acceptance().accept(tree, ctx)
    }

    fn call(
        &self,
        tree: &ContextTree,
        ctx: &ActionContext,
        next: &mut dyn FnMut() -> Flow,
    ) -> Flow {
        let simple = simplify(tree, ctx);
        let driver = self.driver();
        let mut bracketed = || {
            driver.resume(&simple, true);
            let _suspend = SuspendOnExit {
                driver: &driver,
                ctx: &simple,
            };
            next()
        };

        match ctx.kind {
            ActionKind::Sync => {
                driver.start(&simple);
                let outcome = bracketed()?;
                let (result, value) = match &outcome {
                    Ok(value) => (ActionTrackingResult::Return, value),
                    Err(ActionError(error)) => (ActionTrackingResult::Throw, error),
                };
                driver.finish(&simple, result, value);
                Ok(outcome)
            }
            ActionKind::Async(AsyncStepType::Spawn) => {
                driver.start(&simple);
                bracketed()
            }
            ActionKind::Async(step @ (AsyncStepType::Return | AsyncStepType::Throw)) => {
                let outcome = bracketed()?;
                let value = match &outcome {
                    Ok(value) | Err(ActionError(value)) => value,
                };
                let result = if step == AsyncStepType::Return {
                    ActionTrackingResult::Return
                } else {
                    ActionTrackingResult::Throw
                };
                driver.finish(&simple, result, value);
                Ok(outcome)
            }
            ActionKind::Async(step @ (AsyncStepType::Resume | AsyncStepType::ResumeError)) => {
                if self.hooks.tracks_resume_suspend() {
                    return bracketed();
                }
                error!(context = %ctx.id, action = %ctx.name, step = %step, "resume step reached tracker without resume/suspend hooks");
                Err(Fault::UnfilteredStep {
                    name: ctx.name.clone(),
                    context: ctx.id,
                    step,
                })
            }
        }
    }
}

/// Suspends the invocation when the continuation's extent ends, however it
/// ends.
struct SuspendOnExit<'a> {
    driver: &'a LifecycleDriver<'a>,
    ctx: &'a SimpleActionContext,
}

impl Drop for SuspendOnExit<'_> {
    fn drop(&mut self) {
        self.driver.suspend(self.ctx);
    }
}
