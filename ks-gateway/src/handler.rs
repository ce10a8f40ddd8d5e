//! Per-connection state machine
//!
//! A connection starts anonymous. The first frame must be a login; once
//! the serial number is known the session enters the registry and the
//! loop settles into answering heartbeats, polling every line the
//! heartbeat lists, and acknowledging faults. Any frame or exchange error
//! inside the loop tears the session down.

use crate::bus::{
    event_topic, fault_topic, property_topic, DeviceEvent, Event, MessageBus,
};
use crate::listener::GatewayConfig;
use crate::registry::SessionRegistry;
use crate::session::Session;
use ks_core::{KsError, KsResult, NodeId};
use ks_link::protocol::{
    telemetry_data, telemetry_request, teleindication_data, teleindication_request, FN_FAULT,
    FN_HEARTBEAT, FN_LOGIN, FN_POWER_DOWN,
};
use ks_link::{Fault, Frame, Heartbeat};
use ks_register::{ParamMap, LOGIN_BLOCK, TELEINDICATION_BLOCK, TELEMETRY_BLOCK};
use ks_transport::DeviceConn;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) async fn handle_connection(
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn MessageBus>,
    mut conn: DeviceConn,
) {
    let peer = conn.peer_addr();
    let sn = match login(&config, &mut conn).await {
        Ok(sn) => sn,
        Err(err) => {
            warn!("{} failed to log in: {}", peer, err);
            return;
        }
    };

    let session = Arc::new(Session::new(sn.clone(), conn, config.write_timeout));
    if let Some(old) = registry.insert(session.clone()).await {
        info!("{} reconnected from {}, dropping {}", sn, peer, old.peer());
        if let Err(err) = old.disconnect().await {
            debug!("{}: error closing stale connection: {}", sn, err);
        }
    }
    publish_event(&bus, &config.project, &sn, DeviceEvent::Online).await;
    info!("{} online from {}", sn, peer);

    if let Err(err) = run_session(&config, &bus, &session).await {
        match err {
            KsError::Timeout => warn!("{} idle timeout, closing", sn),
            err => warn!("{} connection error: {}", sn, err),
        }
    }

    if registry.remove_by_peer(&sn, peer).await.is_some() {
        publish_event(&bus, &config.project, &sn, DeviceEvent::Offline).await;
        info!("{} offline", sn);
    }
}

/// Wait for the login frame, extract the serial number, and echo the
/// frame back; the device treats the echo as its acceptance
async fn login(config: &GatewayConfig, conn: &mut DeviceConn) -> KsResult<String> {
    let frame = conn.read_frame(config.login_timeout).await?;
    if frame.function != FN_LOGIN {
        return Err(KsError::FrameFormat(format!(
            "expected login, got fn=0x{:02X}",
            frame.function
        )));
    }
    let fields = LOGIN_BLOCK.decode(&frame.payload)?;
    let sn = fields
        .get("SN")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KsError::FrameFormat("login payload carries no serial".to_string()))?;
    conn.write_frame(&frame, config.write_timeout).await?;
    Ok(sn)
}

async fn run_session(
    config: &GatewayConfig,
    bus: &Arc<dyn MessageBus>,
    session: &Arc<Session>,
) -> KsResult<()> {
    loop {
        let (mut conn, frame) = session.next_frame(config.idle_timeout).await?;
        match frame.function {
            FN_HEARTBEAT => {
                handle_heartbeat(config, bus, session.sn(), &mut conn, &frame).await?;
            }
            FN_FAULT => {
                handle_fault(config, bus, session.sn(), &mut conn, &frame).await?;
            }
            FN_POWER_DOWN => {
                warn!("{} reports imminent power down", frame.address);
            }
            other => {
                debug!("{}: unhandled frame fn=0x{:02X}", session.sn(), other);
            }
        }
    }
}

/// Echo the heartbeat, then poll every line it lists and publish one
/// snapshot per line
async fn handle_heartbeat(
    config: &GatewayConfig,
    bus: &Arc<dyn MessageBus>,
    sn: &str,
    conn: &mut DeviceConn,
    frame: &Frame,
) -> KsResult<()> {
    conn.write_frame(frame, config.write_timeout).await?;
    let heartbeat = Heartbeat::from_frame(frame)?;
    debug!("{} heartbeat, {} lines", sn, heartbeat.nodes.len());

    for node in &heartbeat.nodes {
        let Some(model) = node.line_model() else {
            debug!("{}: unknown line model for {}", sn, node);
            continue;
        };
        let values = poll_line(config, conn, *node).await?;
        let topic = property_topic(&config.project, sn, model, &node.to_string());
        publish(bus, &topic, &Value::Object(values)).await;
    }
    Ok(())
}

/// Read the telemetry and teleindication blocks of one line
async fn poll_line(
    config: &GatewayConfig,
    conn: &mut DeviceConn,
    node: NodeId,
) -> KsResult<ParamMap> {
    conn.write_frame(&telemetry_request(node), config.write_timeout)
        .await?;
    let response = conn.read_frame(config.poll_timeout).await?;
    let mut values = TELEMETRY_BLOCK.decode(telemetry_data(&response)?)?;

    conn.write_frame(&teleindication_request(node), config.write_timeout)
        .await?;
    let response = conn.read_frame(config.poll_timeout).await?;
    values.append(&mut TELEINDICATION_BLOCK.decode(teleindication_data(&response)?)?);

    Ok(values)
}

/// Acknowledge a fault so the device stops repeating it, then publish
/// the tripped point with its captured analog samples
async fn handle_fault(
    config: &GatewayConfig,
    bus: &Arc<dyn MessageBus>,
    sn: &str,
    conn: &mut DeviceConn,
    frame: &Frame,
) -> KsResult<()> {
    let fault = Fault::from_frame(frame)?;
    conn.write_frame(&fault.ack_frame(frame.address), config.write_timeout)
        .await?;
    warn!(
        "{} fault on {}: type=0x{:02X} dit=0x{:04X} value={}",
        sn, frame.address, fault.telemetering_type, fault.dit, fault.value
    );

    let Some(model) = frame.address.line_model() else {
        debug!("{}: fault from unknown line model {}", sn, frame.address);
        return Ok(());
    };
    let body = json!({
        "type": fault.telemetering_type,
        "dit": fault.dit,
        "value": fault.value,
        "time": fault.time.to_datetime().map(|t| t.to_string()),
        "points": fault
            .points
            .iter()
            .map(|p| json!({"dit": p.dit, "value": p.value}))
            .collect::<Vec<_>>(),
    });
    let topic = fault_topic(&config.project, sn, model, &frame.address.to_string());
    publish(bus, &topic, &body).await;
    Ok(())
}

async fn publish_event(bus: &Arc<dyn MessageBus>, project: &str, sn: &str, event: DeviceEvent) {
    let topic = event_topic(project, sn);
    publish(bus, &topic, &Event { event }).await;
}

/// Publish, logging failures; a bus outage must not take sessions down
async fn publish<T: serde::Serialize>(bus: &Arc<dyn MessageBus>, topic: &str, body: &T) {
    let payload = match serde_json::to_vec(body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("cannot encode payload for {}: {}", topic, err);
            return;
        }
    };
    if let Err(err) = bus.publish(topic, payload).await {
        warn!("publish to {} failed: {}", topic, err);
    }
}
