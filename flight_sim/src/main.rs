mod gateway;
mod sensor;
mod servo;
mod trajectory;

use anyhow::Context;
use apogee_core::{
    command_channel, CommandRequest, CommandSender, CsvLogStore, FlightConfig, FlightPhase, Scheduler,
    TelemetryFeed, TelemetryHub,
};
use gateway::{create_router, AppState};
use sensor::SimulatedBarometer;
use servo::SimulatedServo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trajectory::{cycle_index, get_trajectory_state_at_time, TrajectoryPhase};

/// Runtime knobs, read from the environment.
struct SimOptions {
    config_path: Option<String>,
    log_path: String,
    addr: String,
    fault_probability: f64,
    servo_jammed: bool,
    auto_arm: bool,
}

impl SimOptions {
    fn from_env() -> anyhow::Result<Self> {
        let fault_probability = match std::env::var("APOGEE_FAULT_RATE") {
            Ok(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("APOGEE_FAULT_RATE is not a number: {:?}", raw))?,
            Err(_) => 0.0,
        };
        Ok(Self {
            config_path: std::env::var("APOGEE_CONFIG").ok(),
            log_path: std::env::var("APOGEE_LOG").unwrap_or_else(|_| "flight_log.csv".into()),
            addr: std::env::var("APOGEE_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            fault_probability,
            servo_jammed: flag("APOGEE_SERVO_JAMMED"),
            auto_arm: !flag("APOGEE_NO_AUTO_ARM"),
        })
    }
}

fn flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Apogee flight computer simulator");
    let options = SimOptions::from_env()?;

    let config = match &options.config_path {
        Some(path) => FlightConfig::from_json_file(path)?,
        None => FlightConfig::default(),
    };

    let start_time = Instant::now();
    let (commands, queue) = command_channel(config.command_queue_capacity);
    let hub = TelemetryHub::new(64);
    let feed = hub.feed();

    let scheduler = Scheduler::new(
        config,
        SimulatedBarometer::new(start_time, options.fault_probability),
        CsvLogStore::new(&options.log_path),
        SimulatedServo::new(options.servo_jammed),
        queue,
        hub,
    )?;
    info!("Flight log: {}", options.log_path);

    let running = Arc::new(AtomicBool::new(true));
    let control_loop = {
        let running = running.clone();
        std::thread::Builder::new()
            .name("control-loop".into())
            .spawn(move || run_control_loop(scheduler, running))
            .context("cannot spawn control loop thread")?
    };

    if options.auto_arm {
        let button = commands.clone();
        let button_feed = feed.clone();
        tokio::spawn(async move { press_pad_button(button, button_feed, start_time).await });
    }

    let state = AppState { commands, feed };
    let app = create_router(state);

    info!("WebSocket: ws://{}/ws", options.addr);
    let listener = tokio::net::TcpListener::bind(&options.addr)
        .await
        .with_context(|| format!("failed to bind to {}", options.addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    running.store(false, Ordering::Relaxed);
    if control_loop.join().is_err() {
        warn!("Control loop thread panicked");
    }
    Ok(())
}

/// Sleeps until each deadline and ticks. The only place that waits.
fn run_control_loop(
    mut scheduler: Scheduler<SimulatedBarometer, CsvLogStore, SimulatedServo>,
    running: Arc<AtomicBool>,
) {
    info!(
        "Control loop started ({} Hz)",
        1000 / scheduler.config().tick_period_ms.max(1)
    );
    let origin = Instant::now();

    while running.load(Ordering::Relaxed) {
        let now_ms = origin.elapsed().as_millis() as u64;
        scheduler.tick(now_ms);

        if let Some(deadline) = scheduler.next_deadline_ms() {
            let now_ms = origin.elapsed().as_millis() as u64;
            if deadline > now_ms {
                std::thread::sleep(Duration::from_millis(deadline - now_ms));
            }
        }
    }
    info!("Control loop stopped in {}", scheduler.phase());
}

/// Stands in for the pad arm button: presses it once per trajectory cycle
/// while the rocket sits on the pad.
async fn press_pad_button(button: CommandSender, feed: TelemetryFeed, start_time: Instant) {
    let mut ticker = interval(Duration::from_millis(500));
    let mut armed_cycle = None;

    loop {
        ticker.tick().await;
        let t = start_time.elapsed().as_secs_f32();
        let cycle = cycle_index(t);
        let on_pad = get_trajectory_state_at_time(t).phase == TrajectoryPhase::PadRest;

        if on_pad && armed_cycle != Some(cycle) && feed.current().phase == FlightPhase::Idle {
            match button.submit(CommandRequest::Arm) {
                Ok(()) => {
                    info!("Pad button pressed (cycle {})", cycle);
                    armed_cycle = Some(cycle);
                }
                Err(e) => warn!("Pad button press lost: {}", e),
            }
        }
    }
}
