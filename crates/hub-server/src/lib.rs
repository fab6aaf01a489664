//! Automation hub server
//!
//! This crate composes the hub's crates into the [`RuleEngine`], the public
//! "fire a trigger" surface, and ships the `automation-hub` binary.

mod engine;

pub use engine::{
    Collaborators, EngineError, EngineResult, RuleEngine, RuleRun, RunStatus,
    DEFAULT_HISTORY_HOURS,
};
