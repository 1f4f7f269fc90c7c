//! Unrecoverable faults raised by the engine, the middleware chain and the
//! tracker.
//!
//! A fault means a contract between collaborators was broken (a step reached
//! a middleware branch its filter should have excluded, a closed chain was
//! stepped again, ...). Faults travel on the outer `Result` of a [`Flow`],
//! never mixed with the values thrown by action bodies.
//!
//! [`Flow`]: crate::runtime::middleware::Flow

use thiserror::Error;

use crate::runtime::context::{AsyncStepType, ContextId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("assertion error: async step '{step}' of '{name}' ({context}) should have been filtered out")]
    UnfilteredStep {
        name: String,
        context: ContextId,
        step: AsyncStepType,
    },

    #[error("next() invoked more than once for '{name}' ({context})")]
    NextReentered { name: String, context: ContextId },

    #[error("unknown context {0}")]
    UnknownContext(ContextId),

    #[error("context {0} is not part of an async step chain")]
    NotAsync(ContextId),

    #[error("a spawn step cannot continue the chain ending at {0}")]
    SpawnMidChain(ContextId),

    #[error("async chain spawned at {0} is already closed")]
    ChainClosed(ContextId),

    #[error("async chain spawned at {spawn} cannot be stepped while {running} runs inside it")]
    SteppedFromWithin { spawn: ContextId, running: ContextId },

    #[error("no async chain was spawned at {0}")]
    UnknownChain(ContextId),

    #[error("script refers to unknown async handle '{0}'")]
    UnknownHandle(String),
}
