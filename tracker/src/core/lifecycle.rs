//! Lifecycle driver: emits start/resume/suspend/finish for tracked
//! invocations, including the fake resume/suspend pairs ancestors receive
//! while a descendant runs.
//!
//! Ancestor propagation walks `parent` links iteratively. An ancestor without
//! accepted tracking data stops the walk.

use serde_json::Value;
use tracing::{trace, warn};

use crate::core::hooks::TrackingHooks;
use crate::core::local_store::LocalStore;
use crate::core::simplify::SimpleActionContext;
use crate::core::types::{ActionTrackingResult, TrackingPatch, TrackingState};

pub struct LifecycleDriver<'a> {
    pub store: LocalStore,
    pub hooks: &'a TrackingHooks,
}

impl LifecycleDriver<'_> {
    pub fn start(&self, ctx: &SimpleActionContext) {
        self.enter(ctx, TrackingState::Started);
        self.hooks.start(ctx);
    }

    /// Resume `ctx`, first fake-resuming every directly enclosing ancestor
    /// that is currently suspended (outermost first).
    pub fn resume(&self, ctx: &SimpleActionContext, real: bool) {
        let mut suspended = Vec::new();
        let mut cursor = ctx.parent();
        while let Some(parent) = cursor {
            if self.tracked_state(parent) != Some(TrackingState::Suspended) {
                break;
            }
            suspended.push(parent);
            cursor = parent.parent();
        }
        for ancestor in suspended.into_iter().rev() {
            self.enter(ancestor, TrackingState::FakeResumed);
            self.hooks.resume(ancestor);
        }

        let state = if real {
            TrackingState::RealResumed
        } else {
            TrackingState::FakeResumed
        };
        self.enter(ctx, state);
        self.hooks.resume(ctx);
    }

    /// Suspend `ctx`, then every enclosing ancestor that was only fake-resumed
    /// on its behalf (innermost first).
    pub fn suspend(&self, ctx: &SimpleActionContext) {
        let mut cursor = Some(ctx);
        while let Some(current) = cursor {
            self.enter(current, TrackingState::Suspended);
            self.hooks.suspend(current);
            cursor = current
                .parent()
                .filter(|parent| self.tracked_state(parent) == Some(TrackingState::FakeResumed));
        }
    }

    /// Finish `ctx`. A suspended parent is fake-resumed around the finish
    /// hook and suspended again afterwards.
    pub fn finish(&self, ctx: &SimpleActionContext, result: ActionTrackingResult, value: &Value) {
        let suspended_parent = ctx
            .parent()
            .filter(|parent| self.tracked_state(parent) == Some(TrackingState::Suspended));
        if let Some(parent) = suspended_parent {
            self.resume(parent, false);
        }

        self.enter(ctx, TrackingState::Finished);
        self.hooks.finish(ctx, result, value);

        if let Some(parent) = suspended_parent {
            self.suspend(parent);
        }
    }

    /// State of `ctx` if this tracker accepted it.
    pub fn tracked_state(&self, ctx: &SimpleActionContext) -> Option<TrackingState> {
        self.store
            .get(ctx)
            .filter(|data| data.start_accepted)
            .map(|data| data.state)
    }

    fn enter(&self, ctx: &SimpleActionContext, next: TrackingState) {
        let previous = self.store.get(ctx).map(|data| data.state);
        if previous.is_some_and(|previous| !previous.can_transition_to(next)) {
            warn!(
                context = %ctx.id,
                action = %ctx.name,
                from = previous.map(TrackingState::as_str),
                to = next.as_str(),
                "unexpected tracking transition"
            );
        }
        self.store.set(ctx, TrackingPatch::state(next));
        trace!(
            context = %ctx.id,
            action = %ctx.name,
            from = previous.map(TrackingState::as_str),
            to = next.as_str(),
            "tracking transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventLog;
    use crate::core::simplify::simplify;
    use crate::runtime::context::{AsyncStepType, ContextTree};
    use crate::runtime::model::TargetPath;

    struct Fixture {
        log: EventLog,
        hooks: TrackingHooks,
        store: LocalStore,
    }

    impl Fixture {
        fn new() -> Self {
            let log = EventLog::new();
            let hooks = log.hooks_with_resume_suspend();
            Self {
                log,
                hooks,
                store: LocalStore::new(),
            }
        }

        fn driver(&self) -> LifecycleDriver<'_> {
            LifecycleDriver {
                store: self.store,
                hooks: &self.hooks,
            }
        }

        fn accept(&self, ctx: &SimpleActionContext) {
            self.store.set(ctx, TrackingPatch::accepted());
        }
    }

    /// outer (spawn) -> middle (spawn) -> inner (spawn), all suspended.
    fn suspended_chain(fx: &Fixture, tree: &ContextTree) -> Vec<SimpleActionContext> {
        let root = TargetPath::root();
        let outer = tree.create_spawn(None, root.clone(), "outer", Vec::new());
        let middle = tree.create_spawn(Some(outer.id), root.clone(), "middle", Vec::new());
        let inner = tree.create_spawn(Some(middle.id), root, "inner", Vec::new());
        let driver = fx.driver();
        let simple: Vec<_> = [outer, middle, inner]
            .iter()
            .map(|ctx| simplify(tree, ctx))
            .collect();
        for ctx in &simple {
            fx.accept(ctx);
            driver.start(ctx);
            driver.resume(ctx, true);
        }
        for ctx in simple.iter().rev() {
            driver.suspend(ctx);
        }
        fx.log.clear();
        simple
    }

    #[test]
    fn real_resume_fake_resumes_suspended_ancestors_outermost_first() {
        let fx = Fixture::new();
        let tree = ContextTree::new();
        let chain = suspended_chain(&fx, &tree);
        let driver = fx.driver();

        driver.resume(&chain[2], true);
        assert_eq!(
            fx.log.labels(),
            vec!["resume:outer", "resume:middle", "resume:inner"]
        );
        assert_eq!(driver.tracked_state(&chain[0]), Some(TrackingState::FakeResumed));
        assert_eq!(driver.tracked_state(&chain[2]), Some(TrackingState::RealResumed));

        fx.log.clear();
        driver.suspend(&chain[2]);
        assert_eq!(
            fx.log.labels(),
            vec!["suspend:inner", "suspend:middle", "suspend:outer"]
        );
        assert_eq!(driver.tracked_state(&chain[0]), Some(TrackingState::Suspended));
    }

    #[test]
    fn suspend_stops_at_really_resumed_ancestor() {
        let fx = Fixture::new();
        let tree = ContextTree::new();
        let chain = suspended_chain(&fx, &tree);
        let driver = fx.driver();

        driver.resume(&chain[0], true);
        driver.resume(&chain[2], true);
        fx.log.clear();

        driver.suspend(&chain[2]);
        assert_eq!(fx.log.labels(), vec!["suspend:inner", "suspend:middle"]);
        assert_eq!(driver.tracked_state(&chain[0]), Some(TrackingState::RealResumed));
    }

    #[test]
    fn finish_brackets_suspended_parent_with_fake_pair() {
        let fx = Fixture::new();
        let tree = ContextTree::new();
        let chain = suspended_chain(&fx, &tree);
        let driver = fx.driver();

        driver.finish(&chain[2], ActionTrackingResult::Return, &Value::Null);
        assert_eq!(
            fx.log.labels(),
            vec![
                "resume:outer",
                "resume:middle",
                "finish:inner:return:null",
                "suspend:middle",
                "suspend:outer",
            ]
        );
        assert_eq!(driver.tracked_state(&chain[2]), Some(TrackingState::Finished));
        assert_eq!(driver.tracked_state(&chain[1]), Some(TrackingState::Suspended));
    }

    #[test]
    fn untracked_parent_stops_propagation() {
        let fx = Fixture::new();
        let tree = ContextTree::new();
        let root = TargetPath::root();
        let outer = tree.create_spawn(None, root.clone(), "outer", Vec::new());
        let inner = tree.create_spawn(Some(outer.id), root, "inner", Vec::new());
        let step = tree
            .create_step(inner.id, AsyncStepType::Resume)
            .expect("resume");
        let inner = simplify(&tree, &step);
        fx.accept(&inner);

        let driver = fx.driver();
        driver.start(&inner);
        driver.resume(&inner, true);
        driver.suspend(&inner);
        driver.finish(&inner, ActionTrackingResult::Throw, &Value::from("boom"));

        assert_eq!(
            fx.log.labels(),
            vec![
                "start:inner",
                "resume:inner",
                "suspend:inner",
                "finish:inner:throw:\"boom\""
            ]
        );
        assert!(fx.store.get(inner.parent().expect("parent")).is_none());
    }
}
