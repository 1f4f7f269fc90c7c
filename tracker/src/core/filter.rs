//! Acceptance filter: decides, per step, whether the tracker processes it.
//!
//! The user predicate runs once per invocation (sync step or spawn step).
//! Later steps of the same step-chain inherit that decision through the
//! tracking data stored on the chain's first step.

use tracing::debug;

use crate::core::hooks::TrackingHooks;
use crate::core::local_store::LocalStore;
use crate::core::simplify::simplify;
use crate::core::types::TrackingPatch;
use crate::runtime::context::{ActionContext, ActionKind, AsyncStepType, ContextTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Tracker is bound to a different action name.
    OtherAction,
    /// User predicate declined the invocation.
    Predicate,
    /// Spawn step of this chain was never accepted.
    SpawnNotAccepted,
    /// Resume steps are ignored when no resume/suspend hook is configured.
    ResumeSuspendDisabled,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::OtherAction => "other_action",
            Rejection::Predicate => "predicate",
            Rejection::SpawnNotAccepted => "spawn_not_accepted",
            Rejection::ResumeSuspendDisabled => "resume_suspend_disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

pub struct AcceptanceFilter<'a> {
    pub action_name: Option<&'a str>,
    pub store: LocalStore,
    pub hooks: &'a TrackingHooks,
}

impl AcceptanceFilter<'_> {
    pub fn accept(&self, tree: &ContextTree, ctx: &ActionContext) -> bool {
        let verdict = self.verdict(tree, ctx);
        match verdict {
            Verdict::Accept => {
                debug!(context = %ctx.id, action = %ctx.name, kind = ?ctx.kind, "step accepted");
                true
            }
            Verdict::Reject(reason) => {
                debug!(context = %ctx.id, action = %ctx.name, kind = ?ctx.kind, reason = reason.as_str(), "step rejected");
                false
            }
        }
    }

    /// Evaluate the acceptance rules for `ctx`.
    ///
    /// Accepting a sync or spawn step records `{start_accepted, idle}` on the
    /// step-chain; no other branch writes anything.
    pub fn verdict(&self, tree: &ContextTree, ctx: &ActionContext) -> Verdict {
        if self.action_name.is_some_and(|name| ctx.name != name) {
            return Verdict::Reject(Rejection::OtherAction);
        }

        match ctx.kind {
            ActionKind::Sync | ActionKind::Async(AsyncStepType::Spawn) => {
                if !self.hooks.accepts(&simplify(tree, ctx)) {
                    return Verdict::Reject(Rejection::Predicate);
                }
                self.store.set(ctx, TrackingPatch::accepted());
                Verdict::Accept
            }
            ActionKind::Async(AsyncStepType::Return | AsyncStepType::Throw) => {
                if self.spawn_accepted(tree, ctx) {
                    Verdict::Accept
                } else {
                    Verdict::Reject(Rejection::SpawnNotAccepted)
                }
            }
            ActionKind::Async(AsyncStepType::Resume | AsyncStepType::ResumeError) => {
                if !self.hooks.tracks_resume_suspend() {
                    Verdict::Reject(Rejection::ResumeSuspendDisabled)
                } else if !self.spawn_accepted(tree, ctx) {
                    Verdict::Reject(Rejection::SpawnNotAccepted)
                } else {
                    Verdict::Accept
                }
            }
        }
    }

    fn spawn_accepted(&self, tree: &ContextTree, ctx: &ActionContext) -> bool {
        let accepted = match tree.chain_root(ctx.id) {
            Some(root) => self.store.get(&*root),
            None => self.store.get(ctx),
        };
        accepted.is_some_and(|data| data.start_accepted)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::runtime::model::TargetPath;

    fn hooks() -> TrackingHooks {
        TrackingHooks::new(|_| {}, |_, _, _| {})
    }

    #[test]
    fn sync_step_runs_predicate_and_records_acceptance() {
        let hooks = hooks().with_filter(|ctx| ctx.name != "ignored");
        let filter = AcceptanceFilter {
            action_name: None,
            store: LocalStore::new(),
            hooks: &hooks,
        };
        let tree = ContextTree::new();
        let ignored = tree.create_sync(None, TargetPath::root(), "ignored", Vec::new());
        let add = tree.create_sync(None, TargetPath::root(), "add", Vec::new());

        assert_eq!(
            filter.verdict(&tree, &ignored),
            Verdict::Reject(Rejection::Predicate)
        );
        assert_eq!(filter.store.get(&*ignored), None);
        assert_eq!(filter.verdict(&tree, &add), Verdict::Accept);
        assert_eq!(filter.store.get(&*add).map(|d| d.start_accepted), Some(true));
    }

    #[test]
    fn action_name_restricts_tracking() {
        let hooks = hooks();
        let filter = AcceptanceFilter {
            action_name: Some("add"),
            store: LocalStore::new(),
            hooks: &hooks,
        };
        let tree = ContextTree::new();
        let fetch = tree.create_spawn(None, TargetPath::root(), "fetch", Vec::new());
        assert_eq!(
            filter.verdict(&tree, &fetch),
            Verdict::Reject(Rejection::OtherAction)
        );
    }

    #[test]
    fn terminal_steps_inherit_the_spawn_decision() {
        let allow = Rc::new(Cell::new(true));
        let predicate = Rc::clone(&allow);
        let hooks = hooks().with_filter(move |_| predicate.get());
        let filter = AcceptanceFilter {
            action_name: None,
            store: LocalStore::new(),
            hooks: &hooks,
        };
        let tree = ContextTree::new();

        let accepted = tree.create_spawn(None, TargetPath::root(), "fetch", Vec::new());
        assert!(filter.accept(&tree, &accepted));
        allow.set(false);
        let ret = tree
            .create_step(accepted.id, AsyncStepType::Return)
            .expect("return");
        assert!(filter.accept(&tree, &ret));

        let rejected = tree.create_spawn(None, TargetPath::root(), "fetch", Vec::new());
        assert!(!filter.accept(&tree, &rejected));
        allow.set(true);
        let throw = tree
            .create_step(rejected.id, AsyncStepType::Throw)
            .expect("throw");
        assert_eq!(
            filter.verdict(&tree, &throw),
            Verdict::Reject(Rejection::SpawnNotAccepted)
        );
    }

    #[test]
    fn resume_steps_need_resume_suspend_hooks() {
        let tree = ContextTree::new();
        let spawn = tree.create_spawn(None, TargetPath::root(), "fetch", Vec::new());
        let resume = tree
            .create_step(spawn.id, AsyncStepType::ResumeError)
            .expect("resume");

        let plain = hooks();
        let without = AcceptanceFilter {
            action_name: None,
            store: LocalStore::new(),
            hooks: &plain,
        };
        assert!(without.accept(&tree, &spawn));
        assert_eq!(
            without.verdict(&tree, &resume),
            Verdict::Reject(Rejection::ResumeSuspendDisabled)
        );

        let tracking = hooks().with_suspend(|_| {});
        let with = AcceptanceFilter {
            action_name: None,
            store: LocalStore::new(),
            hooks: &tracking,
        };
        assert_eq!(
            with.verdict(&tree, &resume),
            Verdict::Reject(Rejection::SpawnNotAccepted)
        );
        assert!(with.accept(&tree, &spawn));
        assert_eq!(with.verdict(&tree, &resume), Verdict::Accept);
    }
}
