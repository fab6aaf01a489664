//! Condition evaluation logic
//!
//! Conditions are evaluated against the per-cycle [`Context`]. Evaluation
//! never fails: a missing path or a type mismatch is a non-match.

use hub_core::value::{as_number, collection_contains, values_equal};
use hub_core::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::condition::{Condition, ConditionOp};

/// Outcome of evaluating a rule's guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub passed: bool,

    /// Field names of the failed conditions, in rule order
    pub failed: Vec<String>,
}

/// Condition evaluator
///
/// Holds no state; one instance can be shared by any number of cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition
    ///
    /// A path missing from the context yields `false` before negation.
    pub fn evaluate(&self, condition: &Condition, ctx: &Context) -> bool {
        let result = match ctx.resolve(&condition.field) {
            Some(actual) => compare(condition.op, actual, &condition.value),
            None => false,
        };

        trace!(
            field = %condition.field,
            op = %condition.op,
            result,
            negate = condition.negate,
            "Evaluated condition"
        );

        result != condition.negate
    }

    /// Evaluate every condition (AND); an empty list passes
    ///
    /// All conditions are evaluated so the failure list is complete.
    pub fn evaluate_all(&self, conditions: &[Condition], ctx: &Context) -> Evaluation {
        let failed: Vec<String> = conditions
            .iter()
            .filter(|c| !self.evaluate(c, ctx))
            .map(|c| c.field.clone())
            .collect();

        Evaluation {
            passed: failed.is_empty(),
            failed,
        }
    }
}

/// Apply an operator to a resolved value and an operand
///
/// Ordering operators need numbers on both sides; anything else is `false`.
pub fn compare(op: ConditionOp, actual: &Value, expected: &Value) -> bool {
    match op {
        ConditionOp::Eq => values_equal(actual, expected),
        ConditionOp::Ne => !values_equal(actual, expected),
        ConditionOp::Gt | ConditionOp::Ge | ConditionOp::Lt | ConditionOp::Le => {
            let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) else {
                return false;
            };
            match op {
                ConditionOp::Gt => a > b,
                ConditionOp::Ge => a >= b,
                ConditionOp::Lt => a < b,
                _ => a <= b,
            }
        }
        ConditionOp::In => collection_contains(expected, actual),
        ConditionOp::Contains => collection_contains(actual, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::from_value(json!({
            "sensor": {"t1": {"value": 35.0, "unit": "°C"}},
            "event": {
                "name": "stripe.invoice.payment_succeeded",
                "data": {"status": "paid", "tags": ["vip", "annual"]}
            }
        }))
        .unwrap()
    }

    fn cond(field: &str, op: ConditionOp, value: Value) -> Condition {
        Condition::new(field, op, value)
    }

    #[test]
    fn test_numeric_ordering() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        assert!(evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Gt, json!(30)), &ctx));
        assert!(evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Ge, json!(35)), &ctx));
        assert!(!evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Lt, json!(35)), &ctx));
        assert!(evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Le, json!(35.0)), &ctx));
    }

    #[test]
    fn test_non_numeric_ordering_is_false() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        assert!(!evaluator.evaluate(&cond("sensor.t1.unit", ConditionOp::Gt, json!(1)), &ctx));
        assert!(!evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Lt, json!("40")), &ctx));
    }

    #[test]
    fn test_equality() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        assert!(evaluator.evaluate(&cond("event.data.status", ConditionOp::Eq, json!("paid")), &ctx));
        assert!(evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Eq, json!(35)), &ctx));
        assert!(evaluator.evaluate(&cond("event.data.status", ConditionOp::Ne, json!("void")), &ctx));
    }

    #[test]
    fn test_membership() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        assert!(evaluator.evaluate(
            &cond("event.data.status", ConditionOp::In, json!(["paid", "trialing"])),
            &ctx
        ));
        assert!(evaluator.evaluate(&cond("event.data.tags", ConditionOp::Contains, json!("vip")), &ctx));
        assert!(evaluator.evaluate(&cond("event.name", ConditionOp::Contains, json!("invoice")), &ctx));
        assert!(!evaluator.evaluate(&cond("sensor.t1.value", ConditionOp::Contains, json!(3)), &ctx));
    }

    #[test]
    fn test_missing_path_is_false_before_negation() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();
        let missing = cond("sensor.t9.value", ConditionOp::Gt, json!(0));

        assert!(!evaluator.evaluate(&missing, &ctx));
        assert!(evaluator.evaluate(&missing.negated(), &ctx));
    }

    #[test]
    fn test_negate_inverts_exactly() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        for condition in [
            cond("sensor.t1.value", ConditionOp::Gt, json!(30)),
            cond("sensor.t1.value", ConditionOp::Lt, json!(30)),
            cond("event.data.status", ConditionOp::In, json!("paid unpaid")),
            cond("nowhere", ConditionOp::Eq, json!(null)),
        ] {
            let plain = evaluator.evaluate(&condition, &ctx);
            let negated = condition.clone().negated();
            assert_eq!(evaluator.evaluate(&negated, &ctx), !plain);
            assert_eq!(evaluator.evaluate(&negated.negated(), &ctx), plain);
        }
    }

    #[test]
    fn test_evaluate_all() {
        let evaluator = ConditionEvaluator::new();
        let ctx = ctx();

        let empty = evaluator.evaluate_all(&[], &ctx);
        assert!(empty.passed);
        assert!(empty.failed.is_empty());

        let result = evaluator.evaluate_all(
            &[
                cond("sensor.t1.value", ConditionOp::Gt, json!(40)),
                cond("event.data.status", ConditionOp::Eq, json!("paid")),
                cond("sensor.t2.value", ConditionOp::Gt, json!(0)),
            ],
            &ctx,
        );
        assert!(!result.passed);
        assert_eq!(result.failed, vec!["sensor.t1.value", "sensor.t2.value"]);
    }
}
