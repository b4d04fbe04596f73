//! goalrunner - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use goalrunner::{
    api::{HttpWorldApi, WorldApi},
    bootstrap::{Bootstrap, BootstrapStatus},
    cli::{Args, Commands, Config},
    state::{JsonStateStore, StateStore},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(message) = args.validate() {
        eprintln!("{}", message);
        std::process::exit(2);
    }

    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.verbosity().filter_directive()))
        .context("Invalid log filter")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    if let Some(name) = &args.character {
        config.actor.name = name.clone();
    }

    match &args.command {
        Commands::Run { cycles, no_subgoals } => {
            if cycles.is_some() {
                config.orchestrator.max_cycles = *cycles;
            }
            if *no_subgoals {
                config.orchestrator.enable_subgoals = false;
            }
            run(config).await?;
        }
        Commands::Status => status(config).await?,
        Commands::Check => check(config).await?,
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}

fn connect(config: &Config) -> Result<Arc<dyn WorldApi>> {
    let api = HttpWorldApi::new(
        &config.api.base_url,
        config.api.token.clone(),
        config.request_timeout(),
    )
    .context("Failed to build HTTP client")?;
    Ok(Arc::new(api))
}

fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store = JsonStateStore::new(config.state_dir()).context("Failed to open state directory")?;
    Ok(Arc::new(store))
}

async fn run(config: Config) -> Result<()> {
    config.validate_for_run()?;
    let bootstrap = Bootstrap::new(config.clone(), connect(&config)?);

    match bootstrap.check().await {
        BootstrapStatus::Ready => {}
        BootstrapStatus::CharacterNotFound(name) => {
            anyhow::bail!("Character '{}' does not exist", name)
        }
        BootstrapStatus::ApiUnreachable(reason) => anyhow::bail!("World API unreachable: {}", reason),
    }

    let mut orchestrator = bootstrap.build_orchestrator(open_store(&config)?).await?;
    let handle = orchestrator.handle();

    let mut task = tokio::spawn(async move { orchestrator.run().await });

    tokio::select! {
        joined = &mut task => {
            joined.context("Control loop panicked")??;
            // Loop ended on its own (cycle limit); persist like a stop
            handle.stop().await?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping after the current cycle");
            handle.stop().await?;
            match task.await {
                Ok(Err(e)) => warn!(error = %e, "Control loop ended with error"),
                Err(e) => error!(error = %e, "Control loop panicked"),
                Ok(Ok(())) => {}
            }
        }
    }

    let status = handle.status().await;
    info!(
        cycles = status.cycles,
        completed = status.plans_completed,
        failed = status.plans_failed,
        "Session finished"
    );
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    config.validate_for_run()?;
    let bootstrap = Bootstrap::new(config.clone(), connect(&config)?);
    let game_data = bootstrap.load_game_data().await?;
    let (mut states, mut goals) = bootstrap.managers(game_data, open_store(&config)?);

    let state = states.get_current_state().await?;
    let emergency = goalrunner::recovery::EmergencyDetector::new(config.recovery()).assess(&state);
    let goal = goals.select_next_goal(&state);
    let plan = goals.plan_with_cooldown_awareness(states.actor(), &state, &goal)?;
    let previous = states.load_persisted()?;

    let report = serde_json::json!({
        "actor": states.actor(),
        "level": state.level,
        "hp": state.hp,
        "max_hp": state.max_hp,
        "position": [state.x, state.y],
        "cooldown_ready": state.cooldown_ready,
        "emergency": emergency,
        "next_goal": goal.name,
        "next_plan": plan.action_names(),
        "previous_snapshot_at": previous.map(|s| s.fetched_at),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    config.validate()?;
    println!("Configuration: OK");

    if config.actor.name.trim().is_empty() {
        println!("Character: not configured");
        return Ok(());
    }

    let bootstrap = Bootstrap::new(config.clone(), connect(&config)?);
    match bootstrap.check().await {
        BootstrapStatus::Ready => println!("Character '{}': OK", config.actor.name),
        BootstrapStatus::CharacterNotFound(name) => println!("Character '{}': not found", name),
        BootstrapStatus::ApiUnreachable(reason) => println!("World API: unreachable ({})", reason),
    }
    if config.api.token.is_none() {
        println!("Token: missing (actions will be rejected)");
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if shown.api.token.is_some() {
        shown.api.token = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
