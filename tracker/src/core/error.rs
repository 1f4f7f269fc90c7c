//! Errors raised while configuring a tracker.

use thiserror::Error;

use crate::runtime::model::{PathError, TargetPath};

/// Setup failure. Raised by [`ActionTracker::new`], never while actions run.
///
/// [`ActionTracker::new`]: crate::core::tracker::ActionTracker::new
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tracker target '{raw}' is not a model path")]
    InvalidTarget {
        raw: String,
        #[source]
        source: PathError,
    },

    #[error("'{0}' is not a recognized model instance")]
    NotAModel(TargetPath),

    #[error("action_name '{name}' is not a function member of '{model}'")]
    NotAnAction { model: TargetPath, name: String },
}
