//! Action-tracking middleware over a cooperative action runtime.
//!
//! The tracker observes every execution step of the actions running in a
//! model subtree and reconstructs, per logical invocation, a clean
//! start/resume/suspend/finish lifecycle, including the fake resume/suspend
//! pairs ancestors receive while a descendant runs.
//!
//! - **[`core`]**: the tracker itself (simplifier, local store, acceptance
//!   filter, lifecycle driver, middleware entry point). No I/O.
//! - **[`runtime`]**: contexts, model registry, middleware chain and the
//!   engine that emits sync steps and async step-chains.
//! - **[`io`]**: tracker config, scenario files and timeline reports.
//!
//! [`replay`] wires the three together for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod replay;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
