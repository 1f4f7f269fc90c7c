//! Recording hook set: turns every hook call into a [`HookEvent`].
//!
//! Used by replay to build timelines and by tests to assert hook order.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::hooks::TrackingHooks;
use crate::core::simplify::SimpleActionContext;
use crate::core::types::ActionTrackingResult;
use crate::runtime::context::ContextId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Start,
    Resume,
    Suspend,
    Finish,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::Start => "start",
            HookKind::Resume => "resume",
            HookKind::Suspend => "suspend",
            HookKind::Finish => "finish",
        }
    }
}

/// One observed hook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub hook: HookKind,
    /// Spawn (or sync) context of the invocation.
    pub context: ContextId,
    pub name: String,
    /// Ancestor count of the invocation.
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionTrackingResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl HookEvent {
    fn observe(hook: HookKind, ctx: &SimpleActionContext) -> Self {
        Self {
            hook,
            context: ctx.id,
            name: ctx.name.clone(),
            depth: ctx.depth(),
            result: None,
            value: None,
        }
    }

    fn finished(ctx: &SimpleActionContext, result: ActionTrackingResult, value: &Value) -> Self {
        Self {
            result: Some(result),
            value: Some(value.clone()),
            ..Self::observe(HookKind::Finish, ctx)
        }
    }

    /// Compact form: `start:add`, `finish:fetch:return:"data"`.
    pub fn label(&self) -> String {
        match (self.result, &self.value) {
            (Some(result), Some(value)) => format!(
                "{}:{}:{}:{}",
                self.hook.as_str(),
                self.name,
                result.as_str(),
                value
            ),
            _ => format!("{}:{}", self.hook.as_str(), self.name),
        }
    }
}

/// Shared, append-only list of hook events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<HookEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `on_start` and `on_finish` only: resume steps stay untracked.
    pub fn hooks(&self) -> TrackingHooks {
        let start = self.clone();
        let finish = self.clone();
        TrackingHooks::new(
            move |ctx| start.push(HookEvent::observe(HookKind::Start, ctx)),
            move |ctx, result, value| finish.push(HookEvent::finished(ctx, result, value)),
        )
    }

    /// All four hooks.
    pub fn hooks_with_resume_suspend(&self) -> TrackingHooks {
        let resume = self.clone();
        let suspend = self.clone();
        self.hooks()
            .with_resume(move |ctx| resume.push(HookEvent::observe(HookKind::Resume, ctx)))
            .with_suspend(move |ctx| suspend.push(HookEvent::observe(HookKind::Suspend, ctx)))
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events.borrow().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.borrow().iter().map(HookEvent::label).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: HookEvent) {
        self.events.borrow_mut().push(event);
    }
}
