//! Action execution
//!
//! This crate runs the side effects of a fired rule. Each [`Action`] is
//! dispatched by kind to a collaborator:
//!
//! - `log_message` - the durable message log
//! - `send_notify` - a [`NotificationSink`] chosen by channel
//! - `set_state` - the entity state store
//! - `call_service` - the service registry
//! - `run_scene` - the scene registry
//! - `delay` - a bounded sleep
//!
//! # Key Types
//!
//! - [`ActionExecutor`] - executes actions and action sequences
//! - [`ActionOutcome`] - per-action result, persisted with the execution
//! - [`NotifierRegistry`] - channel to sink routing
//!
//! [`Action`]: hub_automation::Action

pub mod executor;
pub mod notify;

pub use executor::{ActionError, ActionExecutor, ActionOutcome, SequenceOutcome};
pub use notify::{LogNotifier, Notification, NotificationSink, NotifierRegistry, NotifyError};
