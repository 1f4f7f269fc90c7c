//! Tracking core: deterministic, no I/O.
//!
//! [`tracker::ActionTracker`] is the middleware; the other modules are the
//! pieces it is assembled from.

pub mod error;
pub mod events;
pub mod filter;
pub mod hooks;
pub mod lifecycle;
pub mod local_store;
pub mod name_filter;
pub mod simplify;
pub mod tracker;
pub mod types;
