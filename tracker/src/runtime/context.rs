//! Action contexts: one record per execution step of an action.
//!
//! Contexts live in an append-only [`ContextTree`] arena. The link to the
//! invoking action (`parent`) and the link to the previous step of the same
//! async invocation (`previous_step`) are arena ids, so walking them is a
//! lookup and never keeps anything alive. All steps of one step-chain share
//! a single [`DataBag`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::fault::Fault;
use crate::runtime::model::TargetPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(usize);

impl ContextId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncStepType {
    Spawn,
    Resume,
    ResumeError,
    Return,
    Throw,
}

impl AsyncStepType {
    pub fn as_str(self) -> &'static str {
        match self {
            AsyncStepType::Spawn => "spawn",
            AsyncStepType::Resume => "resume",
            AsyncStepType::ResumeError => "resume_error",
            AsyncStepType::Return => "return",
            AsyncStepType::Throw => "throw",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AsyncStepType::Return | AsyncStepType::Throw)
    }
}

impl fmt::Display for AsyncStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action type plus, for async actions, which step this context is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Sync,
    Async(AsyncStepType),
}

impl ActionKind {
    pub fn action_type(self) -> ActionType {
        match self {
            ActionKind::Sync => ActionType::Sync,
            ActionKind::Async(_) => ActionType::Async,
        }
    }

    pub fn async_step(self) -> Option<AsyncStepType> {
        match self {
            ActionKind::Sync => None,
            ActionKind::Async(step) => Some(step),
        }
    }
}

static NEXT_DATA_KEY: AtomicU64 = AtomicU64::new(1);

/// Opaque key into a [`DataBag`]. Every call to [`DataKey::mint`] yields a
/// key no other caller holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataKey(u64);

impl DataKey {
    pub fn mint() -> Self {
        Self(NEXT_DATA_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Mutable annotation bag shared by every step of one step-chain.
///
/// Cloning shares the bag; equality is identity.
#[derive(Clone, Default)]
pub struct DataBag {
    entries: Rc<RefCell<HashMap<DataKey, Box<dyn Any>>>>,
}

impl DataBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Clone>(&self, key: DataKey) -> Option<T> {
        self.entries
            .borrow()
            .get(&key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn insert<T: Any>(&self, key: DataKey, value: T) {
        self.entries.borrow_mut().insert(key, Box::new(value));
    }

    /// Mutate the value stored under `key` in place.
    ///
    /// Returns `None` without calling `f` if the key is absent or holds a
    /// different type. `f` must not touch this bag.
    pub fn update<T: Any, R>(&self, key: DataKey, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut entries = self.entries.borrow_mut();
        entries
            .get_mut(&key)
            .and_then(|value| value.downcast_mut::<T>())
            .map(f)
    }

    pub fn contains(&self, key: DataKey) -> bool {
        self.entries.borrow().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn same_bag(&self, other: &DataBag) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl PartialEq for DataBag {
    fn eq(&self, other: &Self) -> bool {
        self.same_bag(other)
    }
}

impl Eq for DataBag {}

impl fmt::Debug for DataBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBag")
            .field("entries", &self.len())
            .finish()
    }
}

/// One execution step of one action invocation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub id: ContextId,
    pub name: String,
    pub kind: ActionKind,
    pub target: TargetPath,
    pub args: Vec<Value>,
    /// Context of the action that invoked this one.
    pub parent: Option<ContextId>,
    /// Previous step of the same async invocation.
    pub previous_step: Option<ContextId>,
    pub data: DataBag,
}

impl ActionContext {
    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    pub fn async_step(&self) -> Option<AsyncStepType> {
        self.kind.async_step()
    }
}

/// Append-only arena of action contexts. Records, and the data bags they
/// share, live until the tree is dropped.
#[derive(Debug, Default)]
pub struct ContextTree {
    records: RefCell<Vec<Rc<ActionContext>>>,
}

impl ContextTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_sync(
        &self,
        parent: Option<ContextId>,
        target: TargetPath,
        name: &str,
        args: Vec<Value>,
    ) -> Rc<ActionContext> {
        self.push(|id| ActionContext {
            id,
            name: name.to_string(),
            kind: ActionKind::Sync,
            target,
            args,
            parent,
            previous_step: None,
            data: DataBag::new(),
        })
    }

    pub fn create_spawn(
        &self,
        parent: Option<ContextId>,
        target: TargetPath,
        name: &str,
        args: Vec<Value>,
    ) -> Rc<ActionContext> {
        self.push(|id| ActionContext {
            id,
            name: name.to_string(),
            kind: ActionKind::Async(AsyncStepType::Spawn),
            target,
            args,
            parent,
            previous_step: None,
            data: DataBag::new(),
        })
    }

    /// Append the step following `previous` in its step-chain.
    ///
    /// The new step inherits name, target, args, parent and data bag.
    pub fn create_step(
        &self,
        previous: ContextId,
        step: AsyncStepType,
    ) -> Result<Rc<ActionContext>, Fault> {
        let prev = self.get(previous).ok_or(Fault::UnknownContext(previous))?;
        if prev.action_type() != ActionType::Async {
            return Err(Fault::NotAsync(previous));
        }
        if step == AsyncStepType::Spawn {
            return Err(Fault::SpawnMidChain(previous));
        }
        Ok(self.push(|id| ActionContext {
            id,
            name: prev.name.clone(),
            kind: ActionKind::Async(step),
            target: prev.target.clone(),
            args: prev.args.clone(),
            parent: prev.parent,
            previous_step: Some(previous),
            data: prev.data.clone(),
        }))
    }

    pub fn get(&self, id: ContextId) -> Option<Rc<ActionContext>> {
        self.records.borrow().get(id.0).cloned()
    }

    /// First step of the step-chain `id` belongs to (itself for sync
    /// contexts). Stops at the last reachable link.
    pub fn chain_root(&self, id: ContextId) -> Option<Rc<ActionContext>> {
        let mut current = self.get(id)?;
        while let Some(previous) = current.previous_step {
            match self.get(previous) {
                Some(step) => current = step,
                None => break,
            }
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    fn push(&self, build: impl FnOnce(ContextId) -> ActionContext) -> Rc<ActionContext> {
        let mut records = self.records.borrow_mut();
        let record = Rc::new(build(ContextId(records.len())));
        records.push(Rc::clone(&record));
        record
    }
}
