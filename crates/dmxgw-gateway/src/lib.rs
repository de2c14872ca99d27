//! Protocol Handlers (C8): HTTP, WebSocket, Modbus/TCP, MQTT and
//! Prometheus, plus the embedded web UI, all as thin translation layers
//! over `dmxgw_core::DmxStateCoordinator`.

mod api;
mod clock;
mod http;
mod metrics;
mod modbus;
mod mqtt;
mod webui;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use dmxgw_core::{Config, DmxStateCoordinator, Scheduler};

pub use api::{GroupSummary, LightData, Request, Response, StatusData};
pub use metrics::Metrics;

struct AppState {
    coordinator: Arc<DmxStateCoordinator>,
    metrics: Arc<Metrics>,
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Starts every protocol handler the configuration names and runs until
/// `shutdown` fires, then tears everything down in the documented order:
/// stop scheduler -> stop optional protocol handlers -> disable DMX ->
/// stop coordinator refresh -> close IPC endpoint.
pub async fn run_gateway(config: Config, shutdown: Arc<tokio::sync::Notify>) {
    let catalogue = config.catalogue();
    let coordinator = Arc::new(DmxStateCoordinator::new(
        catalogue,
        config.dmx_device.clone(),
        config.timeout_ms,
        config.throttle_ms,
    ));

    if config.auto_enable {
        if let Err(e) = coordinator.enable() {
            log::error!("auto_enable failed: {e}");
        }
    }

    let scheduler = match Scheduler::build(&config.schedule) {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            log::error!("schedule configuration rejected at startup, scheduling disabled: {e}");
            None
        }
    };

    let state = Arc::new(AppState { coordinator: coordinator.clone(), metrics: Arc::new(Metrics::new()) });
    let metrics = state.metrics.clone();
    let http_bind = config.http.as_ref().map(|h| h.bind.clone()).unwrap_or_else(default_http_bind);
    let http_task = tokio::spawn(http::serve(http_bind, state));

    let modbus_task = config.modbus.as_ref().map(|m| {
        let bind = m.bind.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = modbus::serve(&bind, coordinator).await {
                log::error!("modbus/tcp server exited: {e}");
            }
        })
    });

    let mqtt_task = config.mqtt.as_ref().map(|m| {
        let host = m.host.clone();
        let port = m.port;
        let prefix = m.prefix.clone();
        let coordinator = coordinator.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            mqtt::serve(&host, port, &prefix, coordinator, metrics).await;
        })
    });

    let refresh_ms = config.refresh_ms.unwrap_or(1000).max(1);
    let schedule_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut schedule_ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                schedule_ticker.tick().await;
                if let Some(scheduler) = &scheduler {
                    scheduler.tick(clock::now(), &coordinator);
                }
            }
        })
    };
    let refresh_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut refresh_ticker = tokio::time::interval(Duration::from_millis(refresh_ms));
            loop {
                refresh_ticker.tick().await;
                if let Err(e) = coordinator.refresh_tick() {
                    log::warn!("periodic refresh failed: {e}");
                }
            }
        })
    };

    tokio::select! {
        _ = shutdown.notified() => {
            log::info!("shutdown signal received, tearing down the gateway");
        }
        _ = http_task => {
            log::warn!("http server exited on its own, tearing down the gateway");
        }
    }

    log::info!("stopping scheduler");
    schedule_task.abort();

    log::info!("stopping optional protocol handlers");
    if let Some(task) = &modbus_task {
        task.abort();
    }
    if let Some(task) = &mqtt_task {
        task.abort();
    }

    log::info!("disabling DMX output");
    if let Err(e) = coordinator.disable() {
        log::warn!("disable on shutdown failed: {e}");
    }

    log::info!("stopping coordinator refresh");
    refresh_task.abort();

    log::info!("closing IPC endpoint");
    coordinator.close_ipc();
}
