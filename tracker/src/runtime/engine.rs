//! Single-threaded cooperative engine that emits action steps.
//!
//! Sync actions run as one step. Async actions run as a step-chain: a spawn
//! step, zero or more resume steps and a final return or throw step. The
//! caller decides the interleaving of independent chains; every step runs to
//! completion through the middleware chain before the next one starts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::debug;

use crate::runtime::context::{ActionContext, AsyncStepType, ContextId, ContextTree};
use crate::runtime::fault::Fault;
use crate::runtime::middleware::{ActionError, Flow, Middleware, MiddlewareChain, MiddlewareId};
use crate::runtime::model::{ModelRegistry, TargetPath};

/// Handle on a spawned async invocation, identified by its spawn step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncHandle {
    spawn: ContextId,
}

impl AsyncHandle {
    pub fn spawn_context(self) -> ContextId {
        self.spawn
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainCursor {
    last: ContextId,
    closed: bool,
}

/// View handed to action bodies while their step runs.
pub struct Scope<'e> {
    engine: &'e Engine,
    current: ContextId,
    incoming_error: Option<Value>,
}

impl<'e> Scope<'e> {
    /// Context of the step currently running.
    pub fn context(&self) -> ContextId {
        self.current
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Error the chain was resumed with, for resume-error steps.
    pub fn incoming_error(&self) -> Option<&Value> {
        self.incoming_error.as_ref()
    }

    /// Invoke a sync child action of the running step.
    pub fn call_sync(
        &self,
        target: &TargetPath,
        name: &str,
        args: Vec<Value>,
        body: impl FnOnce(&Scope<'_>) -> Flow,
    ) -> Flow {
        self.engine
            .call_sync(Some(self.current), target, name, args, body)
    }

    /// Spawn an async child action of the running step.
    pub fn spawn(
        &self,
        target: &TargetPath,
        name: &str,
        args: Vec<Value>,
        body: impl FnOnce(&Scope<'_>) -> Result<(), Fault>,
    ) -> Result<AsyncHandle, Fault> {
        self.engine
            .spawn(Some(self.current), target, name, args, body)
    }
}

/// The engine owns every context it creates for as long as it lives: the
/// arena and the chain cursors only grow, and data bags are released when
/// the engine is dropped. One engine is meant to serve one replay.
pub struct Engine {
    registry: ModelRegistry,
    tree: ContextTree,
    chain: MiddlewareChain,
    cursors: RefCell<HashMap<ContextId, ChainCursor>>,
    /// Steps currently executing, outermost first.
    running: RefCell<Vec<ContextId>>,
}

impl Engine {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            tree: ContextTree::new(),
            chain: MiddlewareChain::new(),
            cursors: RefCell::new(HashMap::new()),
            running: RefCell::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    pub fn add_middleware(&self, middleware: Rc<dyn Middleware>) -> MiddlewareId {
        self.chain.add(middleware)
    }

    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        self.chain.remove(id)
    }

    /// Run a sync action as a single step.
    pub fn call_sync(
        &self,
        parent: Option<ContextId>,
        target: &TargetPath,
        name: &str,
        args: Vec<Value>,
        body: impl FnOnce(&Scope<'_>) -> Flow,
    ) -> Flow {
        let ctx = self.tree.create_sync(parent, target.clone(), name, args);
        debug!(context = %ctx.id, action = name, target = %target, "sync step");
        self.dispatch(&ctx, None, body)
    }

    /// Start an async action: runs the spawn step, whose body is the segment
    /// up to the first suspension point.
    pub fn spawn(
        &self,
        parent: Option<ContextId>,
        target: &TargetPath,
        name: &str,
        args: Vec<Value>,
        body: impl FnOnce(&Scope<'_>) -> Result<(), Fault>,
    ) -> Result<AsyncHandle, Fault> {
        let ctx = self.tree.create_spawn(parent, target.clone(), name, args);
        debug!(context = %ctx.id, action = name, target = %target, "spawn step");
        self.cursors.borrow_mut().insert(
            ctx.id,
            ChainCursor {
                last: ctx.id,
                closed: false,
            },
        );
        self.dispatch(&ctx, None, segment(body))?;
        Ok(AsyncHandle { spawn: ctx.id })
    }

    /// Continue a suspended chain up to its next suspension point.
    pub fn resume(
        &self,
        handle: AsyncHandle,
        body: impl FnOnce(&Scope<'_>) -> Result<(), Fault>,
    ) -> Flow {
        let ctx = self.advance(handle, AsyncStepType::Resume)?;
        self.dispatch(&ctx, None, segment(body))
    }

    /// Continue a suspended chain whose awaited operation failed with `error`.
    pub fn resume_error(
        &self,
        handle: AsyncHandle,
        error: Value,
        body: impl FnOnce(&Scope<'_>) -> Result<(), Fault>,
    ) -> Flow {
        let ctx = self.advance(handle, AsyncStepType::ResumeError)?;
        self.dispatch(&ctx, Some(error), segment(body))
    }

    /// Close a chain successfully with the value produced by `body`.
    pub fn finish_return(
        &self,
        handle: AsyncHandle,
        body: impl FnOnce(&Scope<'_>) -> Result<Value, Fault>,
    ) -> Flow {
        let ctx = self.advance(handle, AsyncStepType::Return)?;
        self.dispatch(&ctx, None, |scope: &Scope<'_>| body(scope).map(Ok))
    }

    /// Close a chain with the error produced by `body`.
    pub fn finish_throw(
        &self,
        handle: AsyncHandle,
        body: impl FnOnce(&Scope<'_>) -> Result<Value, Fault>,
    ) -> Flow {
        let ctx = self.advance(handle, AsyncStepType::Throw)?;
        self.dispatch(&ctx, None, |scope: &Scope<'_>| {
            body(scope).map(|error| Err(ActionError(error)))
        })
    }

    /// Abandon a chain. The abandonment is delivered as a throw step whose
    /// error is `{"cancelled": reason}`, so trackers observe a terminal
    /// failure instead of a chain that stays suspended forever.
    pub fn cancel(&self, handle: AsyncHandle, reason: &str) -> Flow {
        debug!(spawn = %handle.spawn, reason, "cancelling async chain");
        let error = json!({ "cancelled": reason });
        self.finish_throw(handle, move |_| Ok(error))
    }

    /// True once the chain's return or throw step has been issued.
    pub fn is_closed(&self, handle: AsyncHandle) -> bool {
        self.cursors
            .borrow()
            .get(&handle.spawn)
            .is_some_and(|cursor| cursor.closed)
    }

    fn advance(&self, handle: AsyncHandle, step: AsyncStepType) -> Result<Rc<ActionContext>, Fault> {
        self.ensure_not_running(handle)?;
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors
            .get_mut(&handle.spawn)
            .ok_or(Fault::UnknownChain(handle.spawn))?;
        if cursor.closed {
            return Err(Fault::ChainClosed(handle.spawn));
        }
        let ctx = self.tree.create_step(cursor.last, step)?;
        cursor.last = ctx.id;
        cursor.closed = step.is_terminal();
        debug!(context = %ctx.id, spawn = %handle.spawn, step = %step, action = %ctx.name, "async step");
        Ok(ctx)
    }

    /// A suspended chain cannot be stepped from a step it encloses: neither
    /// from one of its own running steps nor from a descendant's step.
    fn ensure_not_running(&self, handle: AsyncHandle) -> Result<(), Fault> {
        for &running in self.running.borrow().iter() {
            let mut cursor = Some(running);
            while let Some(id) = cursor {
                let Some(root) = self.tree.chain_root(id) else {
                    break;
                };
                if root.id == handle.spawn {
                    return Err(Fault::SteppedFromWithin {
                        spawn: handle.spawn,
                        running,
                    });
                }
                cursor = root.parent;
            }
        }
        Ok(())
    }

    fn dispatch(
        &self,
        ctx: &ActionContext,
        incoming_error: Option<Value>,
        body: impl FnOnce(&Scope<'_>) -> Flow,
    ) -> Flow {
        let scope = Scope {
            engine: self,
            current: ctx.id,
            incoming_error,
        };
        let mut body = Some(body);
        let mut run_body = || match body.take() {
            Some(body) => body(&scope),
            None => Err(Fault::NextReentered {
                name: ctx.name.clone(),
                context: ctx.id,
            }),
        };
        self.running.borrow_mut().push(ctx.id);
        let flow = self.chain.run(&self.tree, ctx, &mut run_body);
        self.running.borrow_mut().pop();
        flow
    }
}

/// Lift a segment body (no value of its own) into a step body.
fn segment(
    body: impl FnOnce(&Scope<'_>) -> Result<(), Fault>,
) -> impl FnOnce(&Scope<'_>) -> Flow {
    move |scope: &Scope<'_>| body(scope).map(|()| Ok(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::ActionKind;

    fn engine() -> Engine {
        Engine::new(ModelRegistry::new())
    }

    #[test]
    fn async_chain_links_steps_and_closes() {
        let engine = engine();
        let root = TargetPath::root();
        let handle = engine
            .spawn(None, &root, "fetch", Vec::new(), |_| Ok(()))
            .expect("spawn");
        engine.resume(handle, |_| Ok(())).expect("resume").expect("outcome");
        let out = engine
            .finish_return(handle, |_| Ok(json!("data")))
            .expect("return");

        assert_eq!(out, Ok(json!("data")));
        assert!(engine.is_closed(handle));
        assert_eq!(engine.tree().len(), 3);

        let last = engine
            .tree()
            .get(ContextId::from_index(2))
            .expect("return step");
        assert_eq!(last.kind, ActionKind::Async(AsyncStepType::Return));
        assert_eq!(
            engine.tree().chain_root(last.id).map(|root| root.id),
            Some(handle.spawn_context())
        );
    }

    #[test]
    fn closed_chain_rejects_further_steps() {
        let engine = engine();
        let handle = engine
            .spawn(None, &TargetPath::root(), "fetch", Vec::new(), |_| Ok(()))
            .expect("spawn");
        let out = engine.cancel(handle, "timeout").expect("cancel");
        assert_eq!(out, Err(ActionError(json!({ "cancelled": "timeout" }))));

        let err = engine.resume(handle, |_| Ok(())).expect_err("closed");
        assert_eq!(err, Fault::ChainClosed(handle.spawn_context()));
    }

    #[test]
    fn nested_actions_point_at_the_running_step() {
        let engine = engine();
        let root = TargetPath::root();
        let handle = engine
            .spawn(None, &root, "outer", Vec::new(), |_| Ok(()))
            .expect("spawn");
        let mut child_parent = None;
        engine
            .resume(handle, |scope| {
                let _outcome = scope.call_sync(&root, "inner", Vec::new(), |inner| {
                    child_parent = engine
                        .tree()
                        .get(inner.context())
                        .and_then(|ctx| ctx.parent);
                    Ok(Ok(Value::Null))
                })?;
                Ok(())
            })
            .expect("resume")
            .expect("outcome");

        // Parent is the resume step, which simplifies back to the spawn.
        assert_eq!(child_parent, Some(ContextId::from_index(1)));
    }

    #[test]
    fn chain_cannot_be_stepped_from_inside_a_descendant() {
        let engine = engine();
        let root = TargetPath::root();
        let mut inner = None;
        let outer = engine
            .spawn(None, &root, "outer", Vec::new(), |scope| {
                inner = Some(scope.spawn(&root, "inner", Vec::new(), |_| Ok(()))?);
                Ok(())
            })
            .expect("spawn outer");
        let inner = inner.expect("inner spawned");

        let err = engine
            .resume(inner, |_| {
                engine.resume(outer, |_| Ok(()))?;
                Ok(())
            })
            .expect_err("outer is suspended around inner");
        assert!(matches!(
            err,
            Fault::SteppedFromWithin { spawn, .. } if spawn == outer.spawn_context()
        ));

        // Once nothing runs, both chains step normally again.
        engine.resume(outer, |_| Ok(())).expect("resume").expect("outcome");
        engine
            .finish_return(inner, |_| Ok(Value::Null))
            .expect("return")
            .expect("outcome");
    }

    #[test]
    fn chain_cannot_be_stepped_from_its_own_step() {
        let engine = engine();
        let handle = engine
            .spawn(None, &TargetPath::root(), "fetch", Vec::new(), |_| Ok(()))
            .expect("spawn");
        let err = engine
            .resume(handle, |_| {
                engine.resume(handle, |_| Ok(()))?;
                Ok(())
            })
            .expect_err("own step");
        assert!(matches!(err, Fault::SteppedFromWithin { .. }));
    }

    #[test]
    fn dropping_the_engine_releases_contexts_and_data() {
        let engine = engine();
        let handle = engine
            .spawn(None, &TargetPath::root(), "fetch", Vec::new(), |_| Ok(()))
            .expect("spawn");
        engine.cancel(handle, "done").expect("cancel").expect_err("thrown");
        let spawn = Rc::downgrade(&engine.tree().get(handle.spawn_context()).expect("spawn ctx"));
        assert!(spawn.upgrade().is_some());

        drop(engine);
        assert!(spawn.upgrade().is_none());
    }

    #[test]
    fn resume_error_exposes_the_incoming_error() {
        let engine = engine();
        let handle = engine
            .spawn(None, &TargetPath::root(), "fetch", Vec::new(), |_| Ok(()))
            .expect("spawn");
        let mut seen = None;
        engine
            .resume_error(handle, json!("offline"), |scope| {
                seen = scope.incoming_error().cloned();
                Ok(())
            })
            .expect("resume")
            .expect("outcome");
        assert_eq!(seen, Some(json!("offline")));
    }
}
