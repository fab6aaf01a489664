//! Trigger routing
//!
//! Turns a fired trigger into the ordered list of candidate rules. Sensor
//! triggers carry their own threshold, checked against the incoming
//! reading before any condition runs.

use hub_core::value::as_number;
use hub_core::{Context, TriggerKind};
use tracing::{debug, trace};

use crate::eval::compare;
use crate::rule::{Rule, RuleResult};
use crate::store::RuleStore;
use crate::trigger::{SensorTrigger, Trigger};

/// Trigger router
///
/// Selects enabled rules whose trigger kind matches, highest priority first.
#[derive(Debug, Clone)]
pub struct TriggerRouter {
    store: RuleStore,
}

impl TriggerRouter {
    pub fn new(store: RuleStore) -> Self {
        Self { store }
    }

    /// Candidate rules for a fired trigger, in execution order
    pub fn route(&self, kind: TriggerKind, ctx: &Context) -> RuleResult<Vec<Rule>> {
        let active = self.store.active_rules_for_trigger(kind)?;
        let total = active.len();

        let candidates: Vec<Rule> = active
            .into_iter()
            .filter(|rule| self.is_relevant(rule, ctx))
            .collect();

        debug!(
            kind = %kind,
            active = total,
            candidates = candidates.len(),
            "Routed trigger"
        );
        Ok(candidates)
    }

    /// Trigger-level pre-filter; only sensor triggers have one
    pub fn is_relevant(&self, rule: &Rule, ctx: &Context) -> bool {
        match &rule.trigger {
            Trigger::Sensor(sensor) => {
                let relevant = sensor_matches(sensor, ctx);
                if !relevant {
                    trace!(rule = %rule.name, sensor = %sensor.sensor_id, "Sensor pre-filter rejected rule");
                }
                relevant
            }
            Trigger::Time(_) | Trigger::Event(_) | Trigger::State(_) | Trigger::Webhook(_) => true,
        }
    }
}

/// The reading must be present and numeric, and satisfy the threshold if set
fn sensor_matches(trigger: &SensorTrigger, ctx: &Context) -> bool {
    let Some(reading) = ctx.resolve(&trigger.reading_path()) else {
        return false;
    };
    if as_number(reading).is_none() {
        return false;
    }

    match (&trigger.op, &trigger.value) {
        (Some(op), Some(threshold)) => compare(*op, reading, threshold),
        _ => true,
    }
}
