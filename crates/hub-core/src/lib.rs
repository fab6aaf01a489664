//! Core types for the automation hub
//!
//! This crate provides the fundamental types shared by every other crate:
//! the per-cycle [`Context`] data bag, [`TriggerKind`], [`ServiceCall`]
//! and entity [`State`].

mod context;
mod kind;
mod service_call;
mod state;
pub mod value;

pub use context::{Context, DEFAULT_REDACT_KEYS};
pub use kind::{TriggerKind, UnknownTriggerKind};
pub use service_call::ServiceCall;
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State value used when actual state exceeds MAX_STATE_LENGTH
pub const STATE_UNKNOWN: &str = "unknown";

/// Well-known context keys written by the convenience entry points
pub mod keys {
    pub const SENSOR: &str = "sensor";
    pub const EVENT: &str = "event";
    pub const STATE: &str = "state";
    pub const WEBHOOK: &str = "webhook";
    pub const TIME: &str = "time";
    pub const TS: &str = "ts";
}
