//! Core types and utilities for the KS terminal protocol
//!
//! This crate provides the error taxonomy, the 6-byte node identifier used
//! for concentrators and sub-node breakers, and the protocol time mark.

pub mod error;
pub mod node_id;
pub mod time_mark;

pub use error::{KsError, KsResult};
pub use node_id::NodeId;
pub use time_mark::TimeMark;
