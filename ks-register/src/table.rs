//! Static field and register tables for the breaker terminals

use crate::field::{ByteOrder, Field, FieldKind, FieldSet};
use crate::register::{Register, RegisterKind, RegisterSet};
use once_cell::sync::Lazy;

const U16: FieldKind = FieldKind::Uint16(ByteOrder::Little);

/// Login payload: the concentrator serial number, then a report sequence
pub static LOGIN_BLOCK: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new("Login", 8, vec![Field::new("SN", 0, FieldKind::Str(6))])
});

/// Telemetry (digital status) block
pub static TELEMETRY_BLOCK: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new(
        "Telemetering",
        26,
        vec![
            Field::new("Switch", 0, FieldKind::Byte),
            Field::new("LeakageProtect", 25, FieldKind::Byte),
        ],
    )
});

/// Teleindication (analog quantities) block
///
/// Offsets follow the point table: point n sits at `(n - 1) * 2`.
pub static TELEINDICATION_BLOCK: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new(
        "Teleindication",
        58,
        vec![
            Field::scaled("Ua", 6, U16, 0.1),
            Field::scaled("Ub", 8, U16, 0.1),
            Field::scaled("Uc", 10, U16, 0.1),
            Field::scaled("Ia", 14, U16, 0.01),
            Field::scaled("Ib", 16, U16, 0.01),
            Field::scaled("Ic", 18, U16, 0.01),
            Field::new("Leakage", 20, U16),
            Field::scaled("P", 22, U16, 0.01),
            Field::scaled("PF", 26, U16, 0.01),
            Field::scaled("Epi", 28, U16, 0.01),
            Field::new("Ta", 50, U16),
            Field::new("Tb", 52, U16),
            Field::new("Tc", 54, U16),
            Field::new("Tn", 56, U16),
        ],
    )
});

const ALARM_TAG: u8 = 0x2D;

fn action(name: &'static str, address: u16, offset: usize) -> Register {
    Register {
        name,
        address,
        kind: RegisterKind::Action {
            tag: ALARM_TAG,
            len: 2,
        },
        field: Field::new(name, offset, U16),
    }
}

/// Every individually addressable register
pub static REGISTERS: Lazy<Vec<Register>> = Lazy::new(|| {
    vec![
        Register {
            name: "Switch",
            address: 0x6001,
            kind: RegisterKind::Control,
            field: Field::new("Switch", 0, FieldKind::Byte),
        },
        Register {
            name: "LeakageProtect",
            address: 0x001A,
            kind: RegisterKind::ReadOnly,
            field: Field::new("LeakageProtect", 0, FieldKind::Byte),
        },
        action("OverCurrentValue", 0x822C, 0),
        action("OverCurrentDelay", 0x822D, 2),
        action("OverLoadValue", 0x8233, 4),
        action("OverLoadDelay", 0x8234, 6),
        action("LeakageValue", 0x8239, 8),
        action("LeakageDelay", 0x823A, 10),
        action("OverVoltageValue", 0x823F, 12),
        action("OverVoltageDelay", 0x8240, 14),
        action("UnderVoltageValue", 0x8245, 16),
        action("UnderVoltageDelay", 0x8246, 18),
        action("OverTemperatureValue", 0x8251, 20),
        action("OverTemperatureDelay", 0x8252, 22),
        action("ShortValue", 0x8225, 24),
        action("ShortDelay", 0x8226, 26),
    ]
});

/// The protection thresholds read as one block
pub static ALARM_SETTINGS: Lazy<RegisterSet> = Lazy::new(|| {
    RegisterSet::new(
        "AlarmSettings",
        REGISTERS
            .iter()
            .filter(|r| matches!(r.kind, RegisterKind::Action { .. }))
            .cloned()
            .collect(),
    )
});

/// Look a register up by name
pub fn find_register(name: &str) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.name == name)
}
