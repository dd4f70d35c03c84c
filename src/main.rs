use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netball_core::config::SessionConfig;
use netball_core::lobby::participant::Participant;
use netball_core::metrics::{self, Metrics};
use netball_core::net::game_session::GameSession;
use netball_core::net::transport::{InputFrame, InputSource, MoveButtons};

/// Walks a square: forward, right, back, left, one second each
struct ScriptedInput {
    ticks: u64,
    ticks_per_leg: u64,
}

impl InputSource for ScriptedInput {
    fn collect_input(&mut self) -> InputFrame {
        let leg = (self.ticks / self.ticks_per_leg) % 4;
        self.ticks += 1;

        let mut buttons = MoveButtons::default();
        match leg {
            0 => buttons.forward = true,
            1 => buttons.right = true,
            2 => buttons.back = true,
            _ => buttons.left = true,
        }
        buttons.collect_input()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Netball demo v{}", env!("CARGO_PKG_VERSION"));

    let config = SessionConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} Hz tick, {} Hz render, max_participants={}",
        config.tick_rate, config.render_rate, config.max_participants
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Host plays too, plus two scripted clients
    let host_participant = Participant::host();
    let mut host = GameSession::host(host_participant, config.clone(), metrics.clone());
    host.join(&host_participant);

    let mut clients = Vec::new();
    for _ in 0..2 {
        let participant = Participant::client();
        let Some(connection) = host.connect_client(participant.id) else {
            continue;
        };
        host.join(&participant);
        clients.push((
            GameSession::client(participant, config.clone(), connection, metrics.clone()),
            ScriptedInput {
                ticks: 0,
                ticks_per_leg: config.tick_rate as u64,
            },
        ));
    }

    host.subscribe_goals(|event| {
        info!("GOAL: ball {} in goal {} on tick {}", event.ball, event.goal, event.tick);
    });

    let mut fixed = interval(Duration::from_secs_f32(config.fixed_tick_duration()));
    fixed.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let frame_duration = config.render_frame_duration();
    let mut render = interval(Duration::from_secs_f32(frame_duration));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut host_input = MoveButtons::default();
    let stats_every = config.tick_rate as u64 * 10;

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = fixed.tick() => {
                let report = host.fixed_tick(&mut host_input);
                for (client, input) in clients.iter_mut() {
                    client.fixed_tick(input);
                }
                if report.tick % stats_every == 0 {
                    info!(
                        "Tick {}: {} entities, {} snapshots/tick, {} goals so far",
                        report.tick,
                        host.world().len(),
                        report.snapshots,
                        metrics.goals_raised.load(std::sync::atomic::Ordering::Relaxed)
                    );
                }
            }
            _ = render.tick() => {
                for (client, _) in clients.iter_mut() {
                    client.render(frame_duration);
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
        }
    }

    for (client, _) in &clients {
        host.leave(client.local().id);
    }
    info!("Demo stopped after {} ticks", host.tick());

    Ok(())
}
