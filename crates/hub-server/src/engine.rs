//! Rule engine
//!
//! The [`RuleEngine`] turns one fired trigger into zero or more logged rule
//! executions. Every fire cycle and every rule mutation runs under a single
//! engine-wide guard, so the sequence route → evaluate → execute → record →
//! count is never interleaved with another cycle. This caps throughput at
//! one cycle at a time, including any `delay` actions inside it.

use chrono::{DateTime, Utc};
use hub_automation::{
    ConditionEvaluator, Rule, RuleConfig, RuleError, RuleStore, RuleSummary, TriggerRouter,
};
use hub_config::HubConfig;
use hub_core::{Context, TriggerKind};
use hub_recorder::{
    Database, ExecutionLedger, ExecutionRecord, ExecutionStatus, LogBook, LogEntry, NewExecution,
    RecorderError,
};
use hub_script::{ActionExecutor, ActionOutcome, NotifierRegistry};
use hub_service_registry::ServiceRegistry;
use hub_state_store::{Scene, SceneRegistry, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Default window for history queries
pub const DEFAULT_HISTORY_HOURS: i64 = 24;

/// Engine errors
///
/// Failures inside a rule's actions never surface here; they are part of
/// the returned [`RuleRun`]s. Only storage failures and rule management
/// errors do.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] RecorderError),

    #[error(transparent)]
    Rule(RuleError),
}

impl From<RuleError> for EngineError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::Storage(inner) => EngineError::Storage(inner),
            other => EngineError::Rule(other),
        }
    }
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Rule(RuleError::NotFound(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Rule(RuleError::Validation(_)))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// What happened to one candidate rule in a fire cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
    /// Conditions did not hold; nothing was executed or recorded
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
        })
    }
}

/// Per-rule result of a fire cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRun {
    pub rule: String,
    pub status: RunStatus,

    /// Attempted actions, in order
    #[serde(default)]
    pub actions: Vec<ActionOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: f64,

    /// Fields of the conditions that failed, for skipped rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_conditions: Vec<String>,
}

impl RuleRun {
    fn skipped(rule: String, failed_conditions: Vec<String>) -> Self {
        Self {
            rule,
            status: RunStatus::Skipped,
            actions: Vec::new(),
            error: None,
            duration_ms: 0.0,
            failed_conditions,
        }
    }

    /// Whether the rule's actions were attempted
    pub fn executed(&self) -> bool {
        self.status != RunStatus::Skipped
    }
}

/// Collaborators the actions act upon
#[derive(Clone, Default)]
pub struct Collaborators {
    pub services: Arc<ServiceRegistry>,
    pub states: Arc<StateStore>,
    pub scenes: Arc<SceneRegistry>,
    pub notifiers: Arc<NotifierRegistry>,
}

/// The rule engine
pub struct RuleEngine {
    store: RuleStore,
    router: TriggerRouter,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    ledger: ExecutionLedger,
    logbook: LogBook,
    collaborators: Collaborators,
    redact_keys: Vec<String>,
    history_hours: i64,
    guard: Mutex<()>,
}

impl RuleEngine {
    /// Create an engine over an opened database
    pub fn new(db: Database, collaborators: Collaborators) -> Self {
        let store = RuleStore::new(db.clone());
        let executor = ActionExecutor::new(
            collaborators.services.clone(),
            collaborators.states.clone(),
            collaborators.scenes.clone(),
            collaborators.notifiers.clone(),
            LogBook::new(db.clone()),
        );
        let redact_keys = executor.redact_keys().to_vec();

        Self {
            router: TriggerRouter::new(store.clone()),
            store,
            evaluator: ConditionEvaluator::new(),
            executor,
            ledger: ExecutionLedger::new(db.clone()),
            logbook: LogBook::new(db),
            collaborators,
            redact_keys,
            history_hours: DEFAULT_HISTORY_HOURS,
            guard: Mutex::new(()),
        }
    }

    /// Build an engine from configuration: open the database, define the
    /// configured scenes and import the configured rules
    pub async fn from_config(config: &HubConfig) -> EngineResult<Self> {
        let db = Database::open(&config.database)?;
        let engine = Self::new(db, Collaborators::default())
            .with_max_delay(config.max_delay())
            .with_redact_keys(config.redact_keys.clone())
            .with_history_hours(config.history_hours);

        engine.apply_config(config).await?;
        Ok(engine)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.executor = self.executor.with_max_delay(max_delay);
        self
    }

    /// Keys removed from contexts before they are persisted or sent
    pub fn with_redact_keys(mut self, redact_keys: Vec<String>) -> Self {
        self.executor = self.executor.with_redact_keys(redact_keys.clone());
        self.redact_keys = redact_keys;
        self
    }

    pub fn with_history_hours(mut self, hours: i64) -> Self {
        self.history_hours = hours;
        self
    }

    /// Define the configured scenes and upsert the configured rules
    ///
    /// Every rule document is validated before any is stored.
    pub async fn apply_config(&self, config: &HubConfig) -> EngineResult<usize> {
        for (name, entities) in &config.scenes {
            self.collaborators.scenes.define(Scene {
                name: name.clone(),
                entities: entities
                    .iter()
                    .map(|(entity_id, state)| (entity_id.clone(), state.clone()))
                    .collect(),
            });
        }

        let rules = config
            .rules
            .iter()
            .cloned()
            .map(RuleConfig::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.guard.lock().await;
        for rule in rules.iter().cloned() {
            self.store.upsert(rule)?;
        }

        info!(
            rules = rules.len(),
            scenes = config.scenes.len(),
            "Configuration applied"
        );
        Ok(rules.len())
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.collaborators.services
    }

    pub fn states(&self) -> &Arc<StateStore> {
        &self.collaborators.states
    }

    pub fn scenes(&self) -> &Arc<SceneRegistry> {
        &self.collaborators.scenes
    }

    pub fn notifiers(&self) -> &Arc<NotifierRegistry> {
        &self.collaborators.notifiers
    }

    // Fire cycles

    /// Run one fire cycle for a trigger kind
    ///
    /// Returns one [`RuleRun`] per candidate rule, in execution order.
    pub async fn fire(&self, kind: TriggerKind, ctx: Context) -> EngineResult<Vec<RuleRun>> {
        let cycle_id = Ulid::new().to_string();
        let span = info_span!("fire", cycle_id = %cycle_id, kind = %kind);

        self.run_cycle(&cycle_id, kind, &ctx).instrument(span).await
    }

    /// Fire a named event, e.g. `stripe.invoice.payment_succeeded`
    pub async fn fire_event(&self, name: &str, data: Value) -> EngineResult<Vec<RuleRun>> {
        self.fire(TriggerKind::Event, Context::for_event(name, data))
            .await
    }

    pub async fn process_sensor_update(
        &self,
        sensor_id: &str,
        value: f64,
        unit: &str,
    ) -> EngineResult<Vec<RuleRun>> {
        self.fire(TriggerKind::Sensor, Context::for_sensor(sensor_id, value, unit))
            .await
    }

    pub async fn process_state_change(
        &self,
        entity_id: &str,
        new_state: &str,
        old_state: Option<&str>,
    ) -> EngineResult<Vec<RuleRun>> {
        let ctx = Context::for_state_change(entity_id, new_state, old_state.map(str::to_string));
        self.fire(TriggerKind::State, ctx).await
    }

    /// Deliver an already authenticated webhook payload
    pub async fn receive_webhook(
        &self,
        endpoint: &str,
        payload: Value,
    ) -> EngineResult<Vec<RuleRun>> {
        self.fire(TriggerKind::Webhook, Context::for_webhook(endpoint, payload))
            .await
    }

    pub async fn fire_timer(&self, now: DateTime<Utc>) -> EngineResult<Vec<RuleRun>> {
        self.fire(TriggerKind::Time, Context::for_timer(now)).await
    }

    async fn run_cycle(
        &self,
        cycle_id: &str,
        kind: TriggerKind,
        ctx: &Context,
    ) -> EngineResult<Vec<RuleRun>> {
        let _guard = self.guard.lock().await;

        let candidates = self.router.route(kind, ctx)?;
        if candidates.is_empty() {
            debug!("No candidate rules");
            return Ok(Vec::new());
        }

        let snapshot = ctx.sanitized(&self.redact_keys);
        let mut runs = Vec::with_capacity(candidates.len());
        let mut last_timestamp = None;

        for rule in candidates {
            let evaluation = self.evaluator.evaluate_all(&rule.conditions, ctx);
            if !evaluation.passed {
                debug!(rule = %rule.name, failed = ?evaluation.failed, "Conditions not met, skipping");
                runs.push(RuleRun::skipped(rule.name, evaluation.failed));
                continue;
            }

            let timestamp = next_timestamp(Utc::now(), last_timestamp);
            last_timestamp = Some(timestamp);
            runs.push(
                self.execute_rule(cycle_id, kind, &rule, ctx, &snapshot, timestamp)
                    .await?,
            );
        }

        info!(
            candidates = runs.len(),
            executed = runs.iter().filter(|r| r.executed()).count(),
            "Fire cycle complete"
        );
        Ok(runs)
    }

    async fn execute_rule(
        &self,
        cycle_id: &str,
        kind: TriggerKind,
        rule: &Rule,
        ctx: &Context,
        snapshot: &Value,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<RuleRun> {
        info!(rule = %rule.name, priority = rule.priority, "Executing rule actions");

        let started = Instant::now();
        let sequence = self.executor.execute_all(&rule.actions, ctx).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = if sequence.is_ok() {
            ExecutionStatus::Ok
        } else {
            warn!(rule = %rule.name, error = ?sequence.error, "Rule execution failed");
            ExecutionStatus::Error
        };

        self.ledger.append(&NewExecution {
            cycle_id: cycle_id.to_string(),
            rule_name: rule.name.clone(),
            triggered_by: kind,
            context: snapshot.clone(),
            result: status,
            error: sequence.error.clone(),
            actions: serde_json::to_value(&sequence.outcomes).map_err(RecorderError::Json)?,
            timestamp,
            duration_ms,
        })?;
        self.store.record_fire(&rule.name, timestamp)?;

        Ok(RuleRun {
            rule: rule.name.clone(),
            status: match status {
                ExecutionStatus::Ok => RunStatus::Ok,
                ExecutionStatus::Error => RunStatus::Error,
            },
            actions: sequence.outcomes,
            error: sequence.error,
            duration_ms,
            failed_conditions: Vec::new(),
        })
    }

    // Rule management

    /// Add or replace a rule
    pub async fn upsert_rule(&self, config: RuleConfig) -> EngineResult<Rule> {
        let _guard = self.guard.lock().await;
        Ok(self.store.upsert(config)?)
    }

    /// Add or replace a rule from its JSON document
    pub async fn import_rule_json(&self, json: &str) -> EngineResult<Rule> {
        let _guard = self.guard.lock().await;
        Ok(self.store.import_json(json)?)
    }

    pub async fn enable_rule(&self, name: &str) -> EngineResult<()> {
        let _guard = self.guard.lock().await;
        Ok(self.store.enable(name)?)
    }

    pub async fn disable_rule(&self, name: &str) -> EngineResult<()> {
        let _guard = self.guard.lock().await;
        Ok(self.store.disable(name)?)
    }

    pub async fn delete_rule(&self, name: &str) -> EngineResult<()> {
        let _guard = self.guard.lock().await;
        Ok(self.store.delete(name)?)
    }

    // Queries; these read committed rows and do not take the guard

    pub fn get_rule(&self, name: &str) -> EngineResult<Option<Rule>> {
        Ok(self.store.get(name)?)
    }

    pub fn list_rules(&self) -> EngineResult<Vec<RuleSummary>> {
        Ok(self.store.list_summaries()?)
    }

    pub fn export_rule(&self, name: &str) -> EngineResult<String> {
        Ok(self.store.export_json(name)?)
    }

    /// Execution records newest first; `since_hours` defaults to the
    /// configured window
    pub fn history(
        &self,
        rule_name: Option<&str>,
        since_hours: Option<i64>,
    ) -> EngineResult<Vec<ExecutionRecord>> {
        let hours = since_hours.unwrap_or(self.history_hours);
        Ok(self.ledger.history(rule_name, hours)?)
    }

    /// Records written by one fire cycle, in execution order
    pub fn cycle(&self, cycle_id: &str) -> EngineResult<Vec<ExecutionRecord>> {
        Ok(self.ledger.cycle(cycle_id)?)
    }

    pub fn recent_logs(&self, limit: usize) -> EngineResult<Vec<LogEntry>> {
        Ok(self.logbook.recent(limit)?)
    }
}

/// Record timestamp for the next rule of a cycle
///
/// Stored timestamps have microsecond precision; each rule's timestamp is
/// strictly later than the previous one's at that precision.
fn next_timestamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(previous) if now < previous + chrono::Duration::microseconds(1) => {
            previous + chrono::Duration::microseconds(1)
        }
        _ => now,
    }
}
