//! TCP transport for terminal connections
//!
//! Concentrators dial in and hold one persistent connection each; the
//! server never dials out. [`DeviceConn`] owns the accepted socket and
//! moves whole frames across it.

pub mod conn;

pub use conn::DeviceConn;
