//! Automation hub
//!
//! Usage: `automation-hub [CONFIG] [--demo]`
//!
//! Loads `CONFIG` (defaults apply when omitted), opens the database and
//! imports the configured rules and scenes. `--demo` then runs the
//! reference scenario and prints each result as JSON.

use anyhow::{Context as _, Result};
use clap::Parser;
use hub_automation::{Action, ActionKind, Condition, ConditionOp, RuleConfig, Trigger};
use hub_config::HubConfig;
use hub_server::RuleEngine;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(author, version, about = "Automation hub rule engine")]
struct Args {
    /// Configuration file; defaults apply when omitted
    config: Option<PathBuf>,

    /// Run the reference scenario and print each result as JSON
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => HubConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => HubConfig::default(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(database = %config.database, "Starting automation hub");

    let engine = RuleEngine::from_config(&config)
        .await
        .context("initialising rule engine")?;

    let rules = engine.list_rules()?;
    info!(rules = rules.len(), "Automation hub ready");

    if args.demo {
        run_demo(&engine).await?;
    } else {
        println!("{}", serde_json::to_string_pretty(&rules)?);
    }

    Ok(())
}

async fn run_demo(engine: &RuleEngine) -> Result<()> {
    engine
        .upsert_rule(
            RuleConfig::new("high_temp_alert", Trigger::sensor("t1"))
                .with_description("Alert when temperature exceeds 30°C")
                .with_priority(10)
                .with_condition(Condition::new(
                    "sensor.t1.value",
                    ConditionOp::Gt,
                    json!(30),
                ))
                .with_action(Action::notify("default", "Temperature too high"))
                .with_action(Action::log("High temperature detected")),
        )
        .await?;

    engine
        .upsert_rule(
            RuleConfig::new("motion_lights", Trigger::event("motion_detected"))
                .with_description("Turn on hallway light on motion")
                .with_priority(5)
                .with_action(
                    Action::new(ActionKind::SetState)
                        .with_target("light.hallway")
                        .with_param("state", json!("on")),
                ),
        )
        .await?;

    print_json("rules", &engine.list_rules()?)?;

    let runs = engine.process_sensor_update("t1", 35.0, "°C").await?;
    print_json("sensor_update", &runs)?;

    let runs = engine
        .fire_event("motion_detected", json!({"zone": "hallway"}))
        .await?;
    print_json("motion_event", &runs)?;

    engine.disable_rule("motion_lights").await?;
    let runs = engine
        .fire_event("motion_detected", json!({"zone": "hallway"}))
        .await?;
    print_json("motion_event_disabled", &runs)?;

    print_json("states", &engine.states().all())?;

    let history = engine.history(None, None)?;
    print_json("history_count", &history.len())?;

    Ok(())
}

fn print_json(label: &str, value: &impl serde::Serialize) -> Result<()> {
    let mut out = serde_json::Map::new();
    out.insert(label.to_string(), serde_json::to_value(value)?);
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
