use anyhow::Result;
use ponpulse_agent::client::{ControlPlaneClient, SharedControlPlaneClient};
use ponpulse_agent::dispatcher::Dispatcher;
use ponpulse_agent::driver::NetworkDriverFactory;
use ponpulse_agent::poller::TelemetryPoller;
use ponpulse_common::{AgentConfig, EquipmentRegistry, PusherConfig, ResilientPusher};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real deployments configure through the environment.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ponpulse_agent=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let config = AgentConfig::from_env();
    info!(
        node_id = %config.node_id,
        control_plane = %config.control_plane_url,
        "starting ponpulse agent"
    );

    let registry = Arc::new(EquipmentRegistry::new());
    if let Err(e) = registry.load_from_file(&config.equipment_file) {
        warn!(file = %config.equipment_file, "equipment file not loaded: {e}");
    }
    info!(count = registry.len(), "equipment registry ready");

    let client = Arc::new(ControlPlaneClient::new(
        &config.control_plane_url,
        &config.node_id,
        config.api_token.clone(),
    )?);

    let cancel = CancellationToken::new();

    // Enrollment: the org-scoped call wins when both credential sets are
    // configured; the flat token path is skipped with a warning.
    match (&config.org_id, &config.enroll_key, &config.api_token) {
        (Some(org_id), Some(enroll_key), _) => {
            if config.api_token.is_some() {
                warn!("both org enrollment and api token configured; using org enrollment");
            }
            client.enroll_org(&cancel, org_id, enroll_key).await?;
        }
        (None, None, Some(token)) => {
            client.enroll(&cancel, token).await?;
        }
        _ => {
            info!("no enrollment credentials configured, assuming pre-enrolled node");
        }
    }

    let factory: Arc<dyn ponpulse_agent::driver::DriverFactory> =
        Arc::new(NetworkDriverFactory);

    let pusher = ResilientPusher::new(
        SharedControlPlaneClient(Arc::clone(&client)),
        PusherConfig::default(),
        cancel.clone(),
    );
    pusher.start();

    let poller = TelemetryPoller::new(
        Arc::clone(&registry),
        Arc::clone(&factory),
        Arc::clone(&pusher),
        Duration::from_secs(config.telemetry_interval_secs),
    );
    let poller_handle = tokio::spawn(poller.run(cancel.clone()));

    let dispatcher = Dispatcher::new(Arc::clone(&registry), client.clone(), factory);

    let loop_cancel = cancel.clone();
    let loop_client = Arc::clone(&client);
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let command_loop = tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = loop_cancel.cancelled() => {
                    info!("command loop stopping");
                    return;
                }
                _ = tick.tick() => {}
            }
            match loop_client.fetch_commands(&loop_cancel).await {
                Ok(commands) if commands.is_empty() => {}
                Ok(commands) => dispatcher.run_batch(&loop_cancel, commands).await,
                Err(e) => error!("command fetch failed: {e}"),
            }
        }
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = command_loop.await;
    let _ = poller_handle.await;
    pusher.stop().await;

    let stats = pusher.stats();
    info!(
        pushed = stats.total_pushed,
        buffered = stats.total_buffered,
        retried = stats.total_retried,
        "ponpulse agent stopped"
    );
    Ok(())
}
