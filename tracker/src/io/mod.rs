//! I/O helpers for tracker commands.

pub mod config;
pub mod report;
pub mod scenario;
