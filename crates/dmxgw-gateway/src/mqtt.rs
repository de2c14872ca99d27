//! MQTT protocol handler: subscribes `{prefix}/cmd`, publishes
//! `{prefix}/response` per command and `{prefix}/event` per broadcast
//! state delta, and keeps a retained `{prefix}/status` snapshot current.
//! Built on `rumqttc` rather than a hand-rolled client (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use dmxgw_core::DmxStateCoordinator;

use crate::api;
use crate::metrics::Metrics;

pub async fn serve(
    host: &str,
    port: u16,
    prefix: &str,
    coordinator: Arc<DmxStateCoordinator>,
    metrics: Arc<Metrics>,
) {
    let mut options = MqttOptions::new("dmxgw", host, port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 16);

    let cmd_topic = format!("{prefix}/cmd");
    if let Err(e) = client.subscribe(&cmd_topic, QoS::AtLeastOnce).await {
        log::error!("mqtt subscribe to {cmd_topic} failed: {e}");
        return;
    }
    publish_status(&client, prefix, &coordinator).await;

    spawn_event_forwarder(client.clone(), prefix.to_string(), &coordinator);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == cmd_topic => {
                handle_command(&client, prefix, &coordinator, &metrics, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("mqtt event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Bridges the coordinator's blocking subscriber channel onto a
/// dedicated blocking thread, then republishes every delta as a
/// `{prefix}/event` message from an ordinary async task — the same
/// shape the WebSocket handler uses.
fn spawn_event_forwarder(client: AsyncClient, prefix: String, coordinator: &DmxStateCoordinator) {
    let (_id, rx) = coordinator.subscribe();
    let (tx, mut deltas) = tokio::sync::mpsc::unbounded_channel::<std::sync::Arc<str>>();
    tokio::task::spawn_blocking(move || {
        while let Ok(delta) = rx.recv() {
            if tx.send(delta).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        let topic = format!("{prefix}/event");
        while let Some(delta) = deltas.recv().await {
            let _ = client.publish(&topic, QoS::AtMostOnce, false, delta.to_string()).await;
        }
    });
}

async fn handle_command(
    client: &AsyncClient,
    prefix: &str,
    coordinator: &DmxStateCoordinator,
    metrics: &Metrics,
    payload: &[u8],
) {
    let req: api::Request = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("mqtt: bad command payload: {e}");
            return;
        }
    };
    let response = api::dispatch(coordinator, &req);
    if response.is_error() {
        metrics.record_command_error(&req.cmd);
    }
    let body = serde_json::to_string(&response).unwrap_or_default();
    if let Err(e) = client.publish(format!("{prefix}/response"), QoS::AtMostOnce, false, body).await {
        log::warn!("mqtt: failed to publish response: {e}");
    }
    publish_status(client, prefix, coordinator).await;
}

async fn publish_status(client: &AsyncClient, prefix: &str, coordinator: &DmxStateCoordinator) {
    let payload = api::status_json(coordinator);
    if let Err(e) = client.publish(format!("{prefix}/status"), QoS::AtLeastOnce, true, payload).await {
        log::warn!("mqtt: failed to publish retained status: {e}");
    }
}
