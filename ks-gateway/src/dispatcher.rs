//! Command dispatch from the bus to live sessions
//!
//! Every command resolves its registers and builds its frames before any
//! I/O, so a bad request fails fast without touching the device. A
//! command for a concentrator that is not connected fails the same way:
//! a lookup error, no I/O. The outcome is always published on the topic
//! named by the request id, and also returned to the caller.

use crate::bus::{
    CommandResponse, GetPropertyRequest, InvokeServiceRequest, MessageBus, SetPropertyRequest,
};
use crate::listener::GatewayConfig;
use crate::registry::SessionRegistry;
use crate::session::Session;
use ks_core::{KsError, KsResult, NodeId};
use ks_link::protocol::bind_nodes_request;
use ks_register::{find_register, ParamMap, Register, ALARM_SETTINGS};
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// The command templates have room for one protocol address, so a
/// request must name exactly one register
fn resolve(identifiers: &[String]) -> KsResult<&'static Register> {
    let [name] = identifiers else {
        return Err(KsError::Parameter(format!(
            "expected exactly one identifier, got {}",
            identifiers.len()
        )));
    };
    find_register(name).ok_or_else(|| KsError::Lookup(format!("unknown register {}", name)))
}

pub struct Dispatcher {
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn MessageBus>,
}

impl Dispatcher {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<SessionRegistry>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            config,
            registry,
            bus,
        }
    }

    pub async fn get_property(&self, req: GetPropertyRequest) -> CommandResponse {
        let result = self.do_get(&req).await;
        self.respond(req.request_id, result).await
    }

    pub async fn set_property(&self, req: SetPropertyRequest) -> CommandResponse {
        let result = self.do_set(&req).await;
        self.respond(req.request_id, result).await
    }

    pub async fn invoke_service(&self, req: InvokeServiceRequest) -> CommandResponse {
        let result = self.do_invoke(&req).await;
        self.respond(req.request_id, result).await
    }

    async fn do_get(&self, req: &GetPropertyRequest) -> KsResult<ParamMap> {
        let node: NodeId = req.node.parse()?;
        let register = resolve(&req.identifiers)?;
        let frame = register.read_frame(node)?;
        let session = self.session(&req.sn).await?;
        let response = session.exchange(&frame, self.config.read_timeout).await?;
        register.parse_read_response(&response)
    }

    async fn do_set(&self, req: &SetPropertyRequest) -> KsResult<ParamMap> {
        let node: NodeId = req.node.parse()?;
        let register = resolve(&req.identifiers)?;
        let frame = register.write_frame(node, &req.params)?;
        let session = self.session(&req.sn).await?;
        let ack = session.exchange(&frame, self.config.command_timeout).await?;
        register.parse_write_response(&ack)?;
        Ok(ParamMap::new())
    }

    async fn do_invoke(&self, req: &InvokeServiceRequest) -> KsResult<ParamMap> {
        match req.identifier.as_str() {
            "Disconnect" => {
                let session = self.session(&req.sn).await?;
                session.disconnect().await?;
                Ok(ParamMap::new())
            }
            "BindSwitch" => {
                let concentrator: NodeId = req.sn.parse()?;
                let nodes = req
                    .params
                    .get("Nodes")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        KsError::Parameter("BindSwitch expects a Nodes list".to_string())
                    })?;
                let mut parsed = Vec::with_capacity(nodes.len());
                for value in nodes {
                    let sn = value.as_str().ok_or_else(|| {
                        KsError::Parameter(format!("invalid node entry {}", value))
                    })?;
                    parsed.push(sn.parse::<NodeId>()?);
                }
                let frame = bind_nodes_request(concentrator, &parsed)?;
                let session = self.session(&req.sn).await?;
                session.send(&frame).await?;
                Ok(ParamMap::new())
            }
            "ReadAlarmSettings" => {
                let node: NodeId = req.node.parse()?;
                let frame = ALARM_SETTINGS.read_frame(node);
                let session = self.session(&req.sn).await?;
                let response = session.exchange(&frame, self.config.read_timeout).await?;
                ALARM_SETTINGS.decode_response(&response)
            }
            other => Err(KsError::Lookup(format!("unknown service {}", other))),
        }
    }

    async fn session(&self, sn: &str) -> KsResult<Arc<Session>> {
        self.registry
            .get(sn)
            .await
            .ok_or_else(|| KsError::Lookup(format!("{} is not connected", sn)))
    }

    async fn respond(&self, request_id: String, result: KsResult<ParamMap>) -> CommandResponse {
        let response = match result {
            Ok(data) => CommandResponse::ok(request_id.clone(), data),
            Err(err) => {
                warn!("command {} failed: {}", request_id, err);
                CommandResponse::error(request_id.clone(), &err)
            }
        };
        match serde_json::to_vec(&response) {
            Ok(payload) => {
                if let Err(err) = self.bus.publish(&request_id, payload).await {
                    warn!("publish of response {} failed: {}", request_id, err);
                }
            }
            Err(err) => warn!("cannot encode response {}: {}", request_id, err),
        }
        response
    }
}
