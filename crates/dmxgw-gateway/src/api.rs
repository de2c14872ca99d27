//! The unified gateway request/response contract, shared
//! verbatim by the HTTP, WebSocket, and MQTT handlers so the three
//! transports can never drift on what a `set` or `status` command means.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use dmxgw_core::{split_target, CoordinatorError, DmxStateCoordinator};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub cmd: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub values: Option<HashMap<String, u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub enabled: bool,
    pub channels: [u8; 512],
}

#[derive(Debug, Clone, Serialize)]
pub struct LightData {
    pub group: String,
    pub light: String,
    pub values: HashMap<String, u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub lights: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Ok,
    Error { error: String },
    Status { data: StatusData },
    Light { target: String, data: LightData },
    Lights { data: Vec<LightData> },
    Groups { data: Vec<GroupSummary> },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

fn error_response(e: CoordinatorError) -> Response {
    Response::Error { error: e.to_string() }
}

fn status_data(coordinator: &DmxStateCoordinator) -> StatusData {
    coordinator.with_snapshot(|snap| StatusData { enabled: snap.enabled, channels: *snap.channels })
}

/// The `{"type":"status",...}` frame sent once on every new WebSocket
/// connection before delta forwarding begins.
pub fn status_json(coordinator: &DmxStateCoordinator) -> String {
    serde_json::to_string(&Response::Status { data: status_data(coordinator) }).unwrap_or_default()
}

fn light_snapshot(coordinator: &DmxStateCoordinator, group: &str, light: &str) -> Option<LightData> {
    let (gi, li, found) = coordinator.catalogue().find(group, light)?;
    let mut values = HashMap::with_capacity(found.channels.len());
    coordinator.with_snapshot(|snap| {
        for (ci, ch) in found.channels.iter().enumerate() {
            values.insert(ch.display_name.clone(), snap.light_values[gi][li][ci]);
        }
    });
    Some(LightData { group: group.to_string(), light: light.to_string(), values })
}

fn group_snapshot(coordinator: &DmxStateCoordinator, group: &str) -> Option<Vec<LightData>> {
    let g = coordinator.catalogue().group(group)?;
    let mut out = Vec::with_capacity(g.lights.len());
    for l in &g.lights {
        if let Some(data) = light_snapshot(coordinator, group, &l.name) {
            out.push(data);
        }
    }
    Some(out)
}

fn all_lights(coordinator: &DmxStateCoordinator) -> Vec<LightData> {
    let catalogue = coordinator.catalogue();
    let total: usize = catalogue.groups.iter().map(|g| g.lights.len()).sum();
    let mut out = Vec::with_capacity(total);
    for g in &catalogue.groups {
        for l in &g.lights {
            if let Some(data) = light_snapshot(coordinator, &g.name, &l.name) {
                out.push(data);
            }
        }
    }
    out
}

fn group_summaries(coordinator: &DmxStateCoordinator) -> Vec<GroupSummary> {
    let catalogue = coordinator.catalogue();
    let mut out = Vec::with_capacity(catalogue.groups.len());
    for g in &catalogue.groups {
        let mut lights = Vec::with_capacity(g.lights.len());
        for l in &g.lights {
            lights.push(l.name.clone());
        }
        out.push(GroupSummary { group: g.name.clone(), lights });
    }
    out
}

/// Dispatches one decoded request against the coordinator. This is the
/// single chokepoint every transport (HTTP, WebSocket-inbound is out of
/// scope today, MQTT) calls through.
pub fn dispatch(coordinator: &DmxStateCoordinator, req: &Request) -> Response {
    match req.cmd.as_str() {
        "enable" => coordinator.enable().map_or_else(error_response, |()| Response::Ok),
        "disable" => coordinator.disable().map_or_else(error_response, |()| Response::Ok),
        "blackout" => coordinator.blackout().map_or_else(error_response, |()| Response::Ok),
        "set" => dispatch_set(coordinator, req),
        "get" => dispatch_get(coordinator, req),
        "status" => Response::Status { data: status_data(coordinator) },
        "lights" => Response::Lights { data: all_lights(coordinator) },
        "groups" => Response::Groups { data: group_summaries(coordinator) },
        other => Response::Error { error: format!("unknown command {other:?}") },
    }
}

fn dispatch_set(coordinator: &DmxStateCoordinator, req: &Request) -> Response {
    let Some(target) = &req.target else {
        return Response::Error { error: "set requires a target".to_string() };
    };
    let Some(values) = &req.values else {
        return Response::Error { error: "set requires values".to_string() };
    };
    let result = match split_target(target) {
        Some((group, light)) => coordinator.set_light(group, light, values),
        None => coordinator.set_group(target, values),
    };
    result.map_or_else(error_response, |()| Response::Ok)
}

fn dispatch_get(coordinator: &DmxStateCoordinator, req: &Request) -> Response {
    let Some(target) = &req.target else {
        return Response::Error { error: "get requires a target".to_string() };
    };
    match split_target(target) {
        Some((group, light)) => match light_snapshot(coordinator, group, light) {
            Some(data) => Response::Light { target: target.clone(), data },
            None => Response::Error { error: format!("unknown light {target:?}") },
        },
        None => match group_snapshot(coordinator, target) {
            Some(data) => Response::Lights { data },
            None => Response::Error { error: format!("unknown group {target:?}") },
        },
    }
}
