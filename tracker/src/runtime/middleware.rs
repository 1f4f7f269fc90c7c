//! Generic middleware chain wrapped around every action step.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::runtime::context::{ActionContext, ContextTree};
use crate::runtime::fault::Fault;
use crate::runtime::model::TargetPath;

/// Value thrown by an action body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("action threw {0}")]
pub struct ActionError(pub Value);

/// What the caller of an action step observes.
pub type ActionOutcome = Result<Value, ActionError>;

/// Result of running one step through the chain. The outer error is an
/// unrecoverable [`Fault`]; user errors stay inside [`ActionOutcome`].
pub type Flow = Result<ActionOutcome, Fault>;

pub trait Middleware {
    /// Only steps whose target lies within this path reach the middleware.
    fn target(&self) -> &TargetPath;

    /// Decide whether [`Middleware::call`] runs for this step.
    fn filter(&self, tree: &ContextTree, ctx: &ActionContext) -> bool;

    /// Handle one step. `next` runs the rest of the chain and the action
    /// body; it may be invoked at most once.
    fn call(&self, tree: &ContextTree, ctx: &ActionContext, next: &mut dyn FnMut() -> Flow)
    -> Flow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

/// Ordered middleware registrations.
#[derive(Default)]
pub struct MiddlewareChain {
    entries: RefCell<Vec<(MiddlewareId, Rc<dyn Middleware>)>>,
    next_id: Cell<u64>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, middleware: Rc<dyn Middleware>) -> MiddlewareId {
        let id = MiddlewareId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, middleware));
        id
    }

    /// Dispose a registration. Returns false if `id` was already removed.
    pub fn remove(&self, id: MiddlewareId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Run `body` wrapped by every registered middleware whose target
    /// contains `ctx.target` and whose filter accepts `ctx`, outermost first.
    pub fn run(
        &self,
        tree: &ContextTree,
        ctx: &ActionContext,
        body: &mut dyn FnMut() -> Flow,
    ) -> Flow {
        // Registrations made while the step runs apply from the next step on.
        let applicable: Vec<Rc<dyn Middleware>> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, middleware)| ctx.target.is_within(middleware.target()))
            .map(|(_, middleware)| Rc::clone(middleware))
            .collect();
        run_from(&applicable, tree, ctx, body)
    }
}

fn run_from(
    chain: &[Rc<dyn Middleware>],
    tree: &ContextTree,
    ctx: &ActionContext,
    body: &mut dyn FnMut() -> Flow,
) -> Flow {
    let Some((first, rest)) = chain.split_first() else {
        return body();
    };
    if !first.filter(tree, ctx) {
        trace!(context = %ctx.id, action = %ctx.name, "middleware filtered step out");
        return run_from(rest, tree, ctx, body);
    }

    let mut called = false;
    let mut next = || {
        if called {
            return Err(Fault::NextReentered {
                name: ctx.name.clone(),
                context: ctx.id,
            });
        }
        called = true;
        run_from(rest, tree, ctx, &mut *body)
    };
    first.call(tree, ctx, &mut next)
}
