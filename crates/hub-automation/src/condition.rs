//! Condition types
//!
//! A condition is a guard predicate over one context value. All conditions
//! of a rule must hold for its actions to run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::rule::{RuleError, RuleResult};

/// The fixed operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
}

impl ConditionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOp::Eq => "==",
            ConditionOp::Ne => "!=",
            ConditionOp::Gt => ">",
            ConditionOp::Ge => ">=",
            ConditionOp::Lt => "<",
            ConditionOp::Le => "<=",
            ConditionOp::In => "in",
            ConditionOp::Contains => "contains",
        }
    }

    /// `>`, `>=`, `<` and `<=`
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ConditionOp::Gt | ConditionOp::Ge | ConditionOp::Lt | ConditionOp::Le
        )
    }

    /// Ordering operators plus `==` and `!=`
    pub fn is_comparison(&self) -> bool {
        self.is_ordering() || matches!(self, ConditionOp::Eq | ConditionOp::Ne)
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the context, e.g. `sensor.t1.value`
    pub field: String,

    pub op: ConditionOp,

    /// Comparison operand
    pub value: Value,

    /// Invert the operator result
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
            negate: false,
        }
    }

    /// Builder: invert this condition
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn validate(&self) -> RuleResult<()> {
        if self.field.trim().is_empty() {
            return Err(RuleError::Validation(
                "condition field must not be empty".to_string(),
            ));
        }

        if self.op == ConditionOp::In && !(self.value.is_array() || self.value.is_string()) {
            return Err(RuleError::Validation(format!(
                "condition on {}: 'in' requires a list or string value",
                self.field
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_condition() {
        let condition: Condition = serde_json::from_value(json!({
            "field": "sensor.t1.value",
            "op": ">",
            "value": 30
        }))
        .unwrap();

        assert_eq!(condition.op, ConditionOp::Gt);
        assert!(!condition.negate);
        assert!(condition.validate().is_ok());
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let result: Result<Condition, _> = serde_json::from_value(json!({
            "field": "sensor.t1.value",
            "op": "~=",
            "value": 30
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_value_rejected() {
        let result: Result<Condition, _> =
            serde_json::from_value(json!({"field": "event.name", "op": "=="}));
        assert!(result.is_err());
    }

    #[test]
    fn test_in_requires_collection() {
        let bad = Condition::new("event.name", ConditionOp::In, json!(5));
        assert!(matches!(bad.validate(), Err(RuleError::Validation(_))));

        let good = Condition::new("event.name", ConditionOp::In, json!(["a", "b"]));
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_empty_field_rejected() {
        let bad = Condition::new(" ", ConditionOp::Eq, json!(1));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_op_serializes_as_symbol() {
        let condition = Condition::new("x", ConditionOp::Ge, json!(1)).negated();
        let value = serde_json::to_value(&condition).unwrap();

        assert_eq!(value["op"], json!(">="));
        assert_eq!(value["negate"], json!(true));
    }
}
