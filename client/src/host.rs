use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use arrosage_client::{
    apply_env_overrides,
    common::{
        Action, HistoryQuery, HistoryResult, HistoryUnit, Mode, ModeActionState, RuntimeConfig,
        SensorSnapshot, StoreEvent,
    },
    ApiClient, AppStore, Session,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "arrosage-client",
    about = "Watch and drive the irrigation controller",
    version
)]
struct Cli {
    /// Defaults to `monitor`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Stream readings and state changes until Ctrl-C.
    Monitor,
    /// Hand watering back to the controller's schedule.
    Auto,
    /// Take manual control.
    #[command(alias = "manuel")]
    Manual,
    /// Start watering, entering manual mode first if needed.
    On,
    /// Stop watering.
    Off,
    /// Print the sensor history over a time window.
    History {
        #[arg(value_name = "DUREE", value_parser = clap::value_parser!(u32).range(1..))]
        duration: u32,
        #[arg(value_name = "UNITE", value_parser = parse_unit)]
        unit: HistoryUnit,
    },
}

fn parse_unit(raw: &str) -> Result<HistoryUnit, String> {
    HistoryUnit::from_code(raw)
        .ok_or_else(|| format!("unknown unit {raw:?} (expected m, h, d or w)"))
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Monitor);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime.session);
    runtime.session.sanitize();

    let tokens = store.token_store();
    let api = ApiClient::new(runtime.session.endpoints.api_base_url.clone(), tokens.clone());

    if let (Ok(user), Ok(pass)) = (std::env::var("ARROSAGE_USER"), std::env::var("ARROSAGE_PASS"))
    {
        api.login(&user, &pass)
            .await
            .with_context(|| format!("login failed for {user}"))?;
    }

    if let Command::History { duration, unit } = command {
        let result = api
            .fetch_history(Some(HistoryQuery::new(duration, unit)))
            .await?;
        report_history(&result);
        return Ok(());
    }

    let session = Session::start(runtime.session.clone(), tokens)
        .await
        .context("failed to start session")?;
    session.subscribe(log_store_event);

    let outcome = match command {
        Command::Monitor => monitor(&session).await,
        Command::Auto => switch_mode(&session, Mode::Auto).await,
        Command::Manual => switch_mode(&session, Mode::Manual).await,
        Command::On => water(&session, Action::Activate).await,
        Command::Off => water(&session, Action::Deactivate).await,
        Command::History { .. } => Ok(()),
    };

    session.close().await;
    outcome
}

async fn switch_mode(session: &Session, mode: Mode) -> anyhow::Result<()> {
    let state = session
        .switch_mode(mode)
        .await
        .with_context(|| format!("failed to switch to {}", mode.as_str()))?;
    report_state(state);
    Ok(())
}

async fn water(session: &Session, action: Action) -> anyhow::Result<()> {
    if session.latest_mode_state().mode != Mode::Manual {
        session
            .switch_mode(Mode::Manual)
            .await
            .context("failed to enter manual mode")?;
    }
    let state = session
        .set_action(action)
        .await
        .with_context(|| format!("failed to {}", action.as_str()))?;
    report_state(state);
    Ok(())
}

async fn monitor(session: &Session) -> anyhow::Result<()> {
    match session.wait_for_sensor_data(None).await {
        Ok(snapshot) => report_snapshot(&snapshot),
        Err(err) => warn!("no sensor data yet: {err}"),
    }

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("shutting down");
                return Ok(());
            }
            _ = status.tick() => {
                if !session.is_connected() {
                    warn!("websocket down, re-initializing");
                    if let Err(err) = session.reinit().await {
                        warn!("re-initialization failed: {err}");
                    }
                }
                report_state(session.latest_mode_state());
                report_snapshot(&session.latest_sensor_data());
            }
        }
    }
}

fn log_store_event(event: &StoreEvent) {
    match event {
        StoreEvent::Mode(change) => match &change.error_message {
            Some(message) if change.is_alert() => warn!("alert: {message}"),
            Some(message) => info!("notice: {message}"),
            None => info!(
                "mode={} action={}",
                change.mode.as_str(),
                change.action.as_str()
            ),
        },
        StoreEvent::Sensors(update) => report_snapshot(&update.snapshot),
    }
}

fn report_state(state: ModeActionState) {
    info!(
        "watering state: mode={} action={}",
        state.mode.as_str(),
        state.action.as_str()
    );
}

fn report_snapshot(snapshot: &SensorSnapshot) {
    for reading in snapshot.channels() {
        info!(
            "{}: {} {}",
            reading.channel.as_str(),
            reading.value,
            reading.channel.unit()
        );
    }
}

fn report_history(result: &HistoryResult) {
    if let Some(error) = &result.error {
        warn!("history unavailable: {error}");
        return;
    }
    info!("{} history points", result.points.len());
    for point in &result.points {
        let when = point
            .timestamp
            .map(|timestamp| timestamp.to_rfc3339())
            .unwrap_or_else(|| "?".to_string());
        info!(
            "{when} {} {} {}",
            point.channel.as_str(),
            point.value,
            point.channel.unit()
        );
    }
}
