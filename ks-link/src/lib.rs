//! Link layer for the KS terminal protocol
//!
//! This crate implements the variable-length delimited frame, the additive
//! checksum, and the parsers/builders for the link-level conversations:
//! login, heartbeat, fault notification and acknowledgement, telemetry
//! (digital status) and teleindication (analog quantities) polling, and the
//! parameter command templates used by the register layer.

pub mod checksum;
pub mod frame;
pub mod protocol;

pub use checksum::checksum;
pub use frame::{Frame, FRAME_END, FRAME_START, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, MIN_FRAME_LEN};
pub use protocol::{Fault, FaultPoint, Heartbeat};
