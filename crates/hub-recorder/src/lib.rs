//! Durable storage for the automation hub
//!
//! This crate owns the SQLite database shared by the rule store, the
//! execution ledger and the message log. It provides:
//!
//! - [`Database`] - connection handle with schema migrations
//! - [`ExecutionLedger`] - append-only record of rule-fire attempts
//! - [`LogBook`] - the `logs` table written by `log_message` actions
//!
//! # Concurrency
//!
//! One connection is shared behind a mutex. Every statement runs to
//! completion while the mutex is held, so readers never observe a partially
//! written row.

mod database;
mod error;
mod ledger;
mod logbook;
mod migrations;

pub use database::{format_ts, parse_ts, Database, MEMORY};
pub use error::{RecorderError, RecorderResult};
pub use ledger::{ExecutionLedger, ExecutionRecord, ExecutionStatus, NewExecution};
pub use logbook::{LogBook, LogEntry, LogLevel};
