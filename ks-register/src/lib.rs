//! Field and register model
//!
//! Devices expose their data two ways: as packed binary blocks returned by
//! the polling conversations (decoded here through [`FieldSet`]), and as
//! individually addressable registers reached through the parameter and
//! telecontrol commands (modelled by [`Register`] and [`RegisterSet`]).
//! Decoded values travel as JSON maps so the bus layer can publish them
//! without another conversion.

pub mod field;
pub mod register;
pub mod table;

pub use field::{ByteOrder, Field, FieldKind, FieldSet, ParamMap};
pub use register::{Register, RegisterKind, RegisterSet};
pub use table::{
    find_register, ALARM_SETTINGS, LOGIN_BLOCK, REGISTERS, TELEINDICATION_BLOCK, TELEMETRY_BLOCK,
};
