//! In-process action runtime the tracker plugs into.
//!
//! These modules stand in for the collaborators the tracking middleware
//! consumes: the action-context layer, the model registry, the generic
//! middleware chain and the cooperative engine that emits sync steps and
//! async step-chains.

pub mod context;
pub mod engine;
pub mod fault;
pub mod middleware;
pub mod model;
