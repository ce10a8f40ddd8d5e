//! TCP acceptor and gateway wiring

use crate::bus::MessageBus;
use crate::dispatcher::Dispatcher;
use crate::handler::handle_connection;
use crate::registry::SessionRegistry;
use ks_core::KsResult;
use ks_transport::DeviceConn;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the acceptor binds
    pub listen: String,
    /// Topic namespace prefix
    pub project: String,
    /// How long a fresh connection may take to send its login
    pub login_timeout: Duration,
    /// How long a session may stay silent before it is torn down;
    /// heartbeats arrive every minute, so this allows several misses
    pub idle_timeout: Duration,
    /// Deadline for one frame write
    pub write_timeout: Duration,
    /// Wait for a poll response during the heartbeat follow-up
    pub poll_timeout: Duration,
    /// Wait for a register read response
    pub read_timeout: Duration,
    /// Wait for a write acknowledgement; breakers act slowly
    pub command_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5002".to_string(),
            project: "ks".to_string(),
            login_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            command_timeout: Duration::from_secs(120),
        }
    }
}

/// The gateway: accepts terminal connections on one side, publishes to
/// and takes commands from the message bus on the other
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn MessageBus>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            bus,
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Command entry point for the bus subscription side
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.config.clone(), self.registry.clone(), self.bus.clone())
    }

    /// Bind the configured address and serve forever
    pub async fn serve(&self) -> KsResult<()> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn serve_on(&self, listener: TcpListener) -> KsResult<()> {
        info!("gateway listening on {}", listener.local_addr()?);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    match DeviceConn::new(stream) {
                        Ok(conn) => {
                            tokio::spawn(handle_connection(
                                self.config.clone(),
                                self.registry.clone(),
                                self.bus.clone(),
                                conn,
                            ));
                        }
                        Err(err) => warn!("dropping connection from {}: {}", peer, err),
                    }
                }
                Err(err) => warn!("accept error: {}", err),
            }
        }
    }
}
