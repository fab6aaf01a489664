//! Rule engine building blocks
//!
//! A rule ties one trigger to a guard of conditions and an ordered list of
//! actions:
//!
//! ```text
//! RULE = TRIGGER → CONDITIONS (all must pass) → ACTIONS (in order)
//! ```
//!
//! - **Triggers**: the event class that makes a rule eligible
//! - **Conditions**: dotted-path predicates over the cycle context
//! - **Actions**: side effects, executed by hub-script
//!
//! # Key Types
//!
//! - [`RuleConfig`] - the JSON rule document
//! - [`Rule`] - a stored rule with its trigger metadata
//! - [`ConditionEvaluator`] - pure condition evaluation
//! - [`TriggerRouter`] - selects candidate rules for a fired trigger
//! - [`RuleStore`] - durable keyed rule persistence

pub mod action;
pub mod condition;
pub mod eval;
pub mod rule;
pub mod store;
pub mod trigger;
pub mod trigger_eval;

pub use action::{Action, ActionKind};
pub use condition::{Condition, ConditionOp};
pub use eval::{ConditionEvaluator, Evaluation};
pub use rule::{Rule, RuleConfig, RuleError, RuleResult, RuleSummary};
pub use store::RuleStore;
pub use trigger::{
    EventTrigger, SensorTrigger, StateTrigger, TimeTrigger, Trigger, WebhookTrigger,
};
pub use trigger_eval::TriggerRouter;
