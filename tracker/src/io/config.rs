//! Tracker configuration stored as TOML (default `tracker.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::name_filter::NameFilter;
use crate::core::tracker::TrackerTarget;
use crate::runtime::model::TargetPath;

/// Tracker configuration (TOML).
///
/// Missing fields default to tracking every action of the root model with
/// start/finish hooks only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Path of the model whose subtree is tracked.
    pub model: String,

    /// Track only this action. Absent or empty tracks every action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,

    /// Install resume/suspend hooks, so resume steps are tracked too.
    pub resume_suspend: bool,

    pub filter: FilterConfig,
}

/// Acceptance predicate over action names. Patterns are anchored regexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            model: "/".to_string(),
            action_name: None,
            resume_suspend: false,
            filter: FilterConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Checks that can run without a model registry. Whether `model` names a
    /// registered model is checked when the tracker is built.
    pub fn validate(&self) -> Result<()> {
        TargetPath::parse(&self.model).with_context(|| format!("invalid model '{}'", self.model))?;
        self.name_filter()?;
        Ok(())
    }

    pub fn target(&self) -> TrackerTarget {
        TrackerTarget {
            model: self.model.clone(),
            action_name: self.action_name.clone(),
        }
    }

    pub fn name_filter(&self) -> Result<NameFilter> {
        NameFilter::new(&self.filter.include, &self.filter.exclude)
            .context("compile filter patterns")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TrackerConfig::default()`.
pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() {
        return Ok(TrackerConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TrackerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TrackerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
