//! Collapse async step-chains into one canonical view per action call.
//!
//! Every step of a step-chain (spawn, resumes, return/throw) simplifies to the
//! same [`SimpleActionContext`]: fields are read from the chain's first step,
//! and the parent is simplified the same way, all the way up the call tree.

use std::iter;
use std::rc::Rc;

use serde_json::Value;

use crate::runtime::context::{ActionContext, ActionType, ContextId, ContextTree, DataBag};
use crate::runtime::model::TargetPath;

/// De-asynced view of one logical action invocation.
///
/// Equality compares the data bag by identity, so two views are equal only
/// if they describe the same invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleActionContext {
    /// Id of the chain's first step (the spawn for async actions).
    pub id: ContextId,
    pub name: String,
    pub action_type: ActionType,
    pub target: TargetPath,
    pub args: Vec<Value>,
    pub data: DataBag,
    pub parent: Option<Rc<SimpleActionContext>>,
}

impl SimpleActionContext {
    pub fn parent(&self) -> Option<&SimpleActionContext> {
        self.parent.as_deref()
    }

    /// Parent, grandparent, ... up to the outermost action.
    pub fn ancestors(&self) -> impl Iterator<Item = &SimpleActionContext> {
        iter::successors(self.parent(), |ctx| ctx.parent())
    }

    /// Outermost action of the call tree (`self` for top-level calls).
    pub fn root(&self) -> &SimpleActionContext {
        self.ancestors().last().unwrap_or(self)
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }
}

/// Simplify any step context into its canonical invocation view.
pub fn simplify(tree: &ContextTree, ctx: &ActionContext) -> SimpleActionContext {
    let own_root = tree
        .chain_root(ctx.id)
        .unwrap_or_else(|| Rc::new(ctx.clone()));

    let mut ancestor_roots = Vec::new();
    let mut cursor = own_root.parent.and_then(|parent| tree.chain_root(parent));
    while let Some(root) = cursor {
        cursor = root.parent.and_then(|parent| tree.chain_root(parent));
        ancestor_roots.push(root);
    }

    let parent = ancestor_roots
        .iter()
        .rev()
        .fold(None, |parent, root| Some(Rc::new(from_root(root, parent))));
    from_root(&own_root, parent)
}

fn from_root(
    root: &ActionContext,
    parent: Option<Rc<SimpleActionContext>>,
) -> SimpleActionContext {
    SimpleActionContext {
        id: root.id,
        name: root.name.clone(),
        action_type: root.action_type(),
        target: root.target.clone(),
        args: root.args.clone(),
        data: root.data.clone(),
        parent,
    }
}
