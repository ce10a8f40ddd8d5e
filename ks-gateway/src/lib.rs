//! Gateway between KS concentrator terminals and the message bus
//!
//! Concentrators dial in over TCP, log in with their serial number, and
//! then heartbeat every minute. The gateway answers each heartbeat by
//! polling every line breaker the concentrator lists and publishing one
//! snapshot per line. Commands arrive from the bus, are pushed onto the
//! live connection between polls, and their outcome is published back on
//! a topic named after the request id.

pub mod bus;
pub mod dispatcher;
pub(crate) mod handler;
pub mod listener;
pub mod registry;
pub mod session;

pub use bus::{
    event_topic, fault_topic, property_topic, CommandResponse, DeviceEvent, Event,
    GetPropertyRequest, InvokeServiceRequest, MessageBus, SetPropertyRequest,
};
pub use dispatcher::Dispatcher;
pub use listener::{Gateway, GatewayConfig};
pub use registry::SessionRegistry;
pub use session::Session;
