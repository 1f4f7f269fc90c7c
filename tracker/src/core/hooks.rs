//! User hooks invoked by the lifecycle driver.

use std::fmt;

use serde_json::Value;

use crate::core::simplify::SimpleActionContext;
use crate::core::types::ActionTrackingResult;

pub type FilterHook = Box<dyn Fn(&SimpleActionContext) -> bool>;
pub type ContextHook = Box<dyn Fn(&SimpleActionContext)>;
pub type FinishHook = Box<dyn Fn(&SimpleActionContext, ActionTrackingResult, &Value)>;

/// Hook set for one tracker.
///
/// `on_start` and `on_finish` are mandatory. Supplying `on_resume` or
/// `on_suspend` turns on resume/suspend tracking for resume steps; without
/// either, those steps are never processed.
pub struct TrackingHooks {
    filter: Option<FilterHook>,
    on_start: ContextHook,
    on_resume: Option<ContextHook>,
    on_suspend: Option<ContextHook>,
    on_finish: FinishHook,
}

impl TrackingHooks {
    pub fn new(
        on_start: impl Fn(&SimpleActionContext) + 'static,
        on_finish: impl Fn(&SimpleActionContext, ActionTrackingResult, &Value) + 'static,
    ) -> Self {
        Self {
            filter: None,
            on_start: Box::new(on_start),
            on_resume: None,
            on_suspend: None,
            on_finish: Box::new(on_finish),
        }
    }

    /// Predicate deciding which invocations are tracked. Evaluated once per
    /// invocation, at its spawn or sync step.
    pub fn with_filter(mut self, filter: impl Fn(&SimpleActionContext) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_resume(mut self, on_resume: impl Fn(&SimpleActionContext) + 'static) -> Self {
        self.on_resume = Some(Box::new(on_resume));
        self
    }

    pub fn with_suspend(mut self, on_suspend: impl Fn(&SimpleActionContext) + 'static) -> Self {
        self.on_suspend = Some(Box::new(on_suspend));
        self
    }

    pub fn tracks_resume_suspend(&self) -> bool {
        self.on_resume.is_some() || self.on_suspend.is_some()
    }

    pub(crate) fn accepts(&self, ctx: &SimpleActionContext) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(ctx))
    }

    pub(crate) fn start(&self, ctx: &SimpleActionContext) {
        (self.on_start)(ctx);
    }

    pub(crate) fn resume(&self, ctx: &SimpleActionContext) {
        if let Some(on_resume) = &self.on_resume {
            on_resume(ctx);
        }
    }

    pub(crate) fn suspend(&self, ctx: &SimpleActionContext) {
        if let Some(on_suspend) = &self.on_suspend {
            on_suspend(ctx);
        }
    }

    pub(crate) fn finish(&self, ctx: &SimpleActionContext, result: ActionTrackingResult, value: &Value) {
        (self.on_finish)(ctx, result, value);
    }
}

impl fmt::Debug for TrackingHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingHooks")
            .field("filter", &self.filter.is_some())
            .field("on_resume", &self.on_resume.is_some())
            .field("on_suspend", &self.on_suspend.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_hooks() -> TrackingHooks {
        TrackingHooks::new(|_| {}, |_, _, _| {})
    }

    #[test]
    fn either_optional_hook_enables_resume_suspend() {
        assert!(!noop_hooks().tracks_resume_suspend());
        assert!(noop_hooks().with_resume(|_| {}).tracks_resume_suspend());
        assert!(noop_hooks().with_suspend(|_| {}).tracks_resume_suspend());
    }

    #[test]
    fn debug_reports_configured_hooks() {
        let rendered = format!("{:?}", noop_hooks().with_suspend(|_| {}));
        assert!(rendered.contains("on_suspend: true"));
        assert!(rendered.contains("on_resume: false"));
    }
}
