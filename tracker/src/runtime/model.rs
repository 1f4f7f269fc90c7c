//! Model registry: the tree of model nodes actions run against.
//!
//! Models are addressed by `/`-separated paths. The registry only answers the
//! questions the tracker asks at configuration time (is this a model, is this
//! member an action); it holds no snapshot data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path '{0}' must start with '/'")]
    NotAbsolute(String),
    #[error("path '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// Absolute `/`-separated path of a model node. `/` is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetPath(String);

impl TargetPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(PathError::NotAbsolute(raw.to_string()));
        }
        if raw != "/" && raw[1..].split('/').any(str::is_empty) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Append one segment, e.g. `/todos` + `0` -> `/todos/0`.
    pub fn child(&self, segment: &str) -> Result<Self, PathError> {
        if self.0 == "/" {
            Self::parse(&format!("/{segment}"))
        } else {
            Self::parse(&format!("{}/{segment}", self.0))
        }
    }

    /// True if `self` equals `ancestor` or lies in its subtree (segment-wise).
    pub fn is_within(&self, ancestor: &TargetPath) -> bool {
        let mut own = self.segments();
        ancestor
            .segments()
            .all(|segment| own.next() == Some(segment))
    }
}

impl TryFrom<String> for TargetPath {
    type Error = PathError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TargetPath> for String {
    fn from(path: TargetPath) -> Self {
        path.0
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Action,
    Property,
}

/// A registered model node and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub path: TargetPath,
    pub type_name: String,
    members: BTreeMap<String, MemberKind>,
}

impl Model {
    pub fn new(path: TargetPath, type_name: impl Into<String>) -> Self {
        Self {
            path,
            type_name: type_name.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.members.insert(name.into(), MemberKind::Action);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.members.insert(name.into(), MemberKind::Property);
        self
    }

    pub fn member(&self, name: &str) -> Option<MemberKind> {
        self.members.get(name).copied()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(|(_, kind)| **kind == MemberKind::Action)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<TargetPath, Model>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model`, returning the model previously stored at its path.
    pub fn register(&mut self, model: Model) -> Option<Model> {
        self.models.insert(model.path.clone(), model)
    }

    pub fn get(&self, path: &TargetPath) -> Option<&Model> {
        self.models.get(path)
    }

    pub fn is_model(&self, path: &TargetPath) -> bool {
        self.models.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
