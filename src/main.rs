//! flowbus demo runner
//!
//! Feeds a simulated sensor emitter through two pipelines on a tokio
//! `LocalSet`: a batched per-sensor snapshot and a delayed over-temperature
//! alert. Pass a config file path (TOML or JSON) as the first argument to
//! override the defaults.

use flowbus::{logging, Bus, BusConfig, Emitter, Runtime, Value};
use std::rc::Rc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => BusConfig::load(&path)?,
        None => BusConfig::default(),
    };

    // Keep the guard alive so file logging flushes on exit
    let _log_guard = logging::init(&config.logging)?;

    tracing::info!("Starting flowbus demo");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, run(config))?;

    tracing::info!("flowbus demo finished");
    Ok(())
}

async fn run(config: BusConfig) -> anyhow::Result<()> {
    let (runtime, timers) = Runtime::local(config);
    let sensors = Rc::new(Emitter::new());

    // Newest reading per sensor, released once per burst
    let mut snapshots = Bus::from_event(&runtime, Rc::clone(&sensors), "temperature", false);
    snapshots
        .add_event(Rc::clone(&sensors), "humidity", false)?
        .merge()?
        .group()?
        .last(0)?
        .batch()?
        .run(|snapshot, _, _| tracing::info!(%snapshot, "sensor snapshot"))?;

    // Over-temperature alerts, deduplicated and reported after a grace period
    let mut alerts = Bus::from_event(&runtime, Rc::clone(&sensors), "temperature", false);
    alerts
        .filter(|v, _, _| v.as_float().is_some_and(|t| t > 30.0))?
        .skip_dupes()?
        .delay(Duration::from_millis(50))?
        .run(|v, source, _| tracing::warn!(value = %v, source = ?source, "temperature alert"))?;

    let temperatures = [21.5, 24.0, 31.0, 31.0, 33.5];
    for (step, temperature) in temperatures.into_iter().enumerate() {
        sensors.emit("temperature", temperature)?;
        sensors.emit("humidity", Value::Int(40 + step as i64))?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    for error in timers.take_errors() {
        tracing::error!("Deferred task failed: {}", error);
    }

    snapshots.destroy();
    alerts.destroy();
    tracing::info!(
        temperature = sensors.listener_count("temperature"),
        humidity = sensors.listener_count("humidity"),
        "listeners remaining after teardown"
    );
    runtime.shutdown();
    Ok(())
}
