//! Addressable registers and the parameter/telecontrol command formats

use crate::field::{Field, ParamMap};
use bytes::BufMut;
use ks_core::{KsError, KsResult, NodeId};
use ks_link::frame::Frame;
use ks_link::protocol::{
    CTRL_DEVICE_FAULT, CTRL_DEVICE_REPORT, CTRL_SERVER_CMD, FN_PARAM_READ, FN_PARAM_WRITE,
    FN_TELECONTROL, PARAM_ACK_HEADER, PARAM_HEADER, TELECONTROL_ACK_HEADER, TELECONTROL_HEADER,
};
use serde_json::Value;

/// How a register is reached and what it permits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Reported through the polling blocks only
    ReadOnly,
    /// Written through the telecontrol command
    Control,
    /// Read and written through the parameter commands, carrying the
    /// tag and value length the device expects in the write body
    Action { tag: u8, len: u8 },
}

/// One addressable quantity on a line node
#[derive(Debug, Clone)]
pub struct Register {
    pub name: &'static str,
    pub address: u16,
    pub kind: RegisterKind,
    pub field: Field,
}

/// One `addr tag len value` group from a parameter read response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamGroup {
    pub address: u16,
    pub tag: u8,
    pub len: u8,
    pub value: u64,
}

/// Scan the groups out of a parameter read response payload
///
/// Layout: `count | ack header | 00 00 00`, then one 6-byte group per
/// register: address (LE), tag, length, value (LE).
pub(crate) fn parse_param_groups(payload: &[u8]) -> KsResult<Vec<ParamGroup>> {
    if payload.len() < 8 {
        return Err(KsError::FrameFormat(format!(
            "parameter response expects >= 8 bytes, got {}",
            payload.len()
        )));
    }
    if payload[1..5] != PARAM_ACK_HEADER {
        return Err(KsError::HeaderMismatch(format!(
            "parameter response header {:02X?}",
            &payload[1..5]
        )));
    }
    if payload[5..8] != [0x00, 0x00, 0x00] {
        return Err(KsError::HeaderMismatch(format!(
            "parameter response filler {:02X?}",
            &payload[5..8]
        )));
    }
    let mut groups = Vec::new();
    let mut i = 8;
    while i + 6 <= payload.len() {
        let len = payload[i + 3];
        let value = match len {
            1 => u64::from(payload[i + 4]),
            2 => u64::from(u16::from_le_bytes([payload[i + 4], payload[i + 5]])),
            other => {
                return Err(KsError::FrameFormat(format!(
                    "unsupported register value length {}",
                    other
                )));
            }
        };
        groups.push(ParamGroup {
            address: u16::from_le_bytes([payload[i], payload[i + 1]]),
            tag: payload[i + 2],
            len,
            value,
        });
        i += 6;
    }
    if groups.len() != usize::from(payload[0]) {
        return Err(KsError::FrameFormat(format!(
            "parameter response announces {} groups, carries {}",
            payload[0],
            groups.len()
        )));
    }
    Ok(groups)
}

impl Register {
    /// Build the read command for this register
    ///
    /// # Errors
    /// `KsError::Parameter` for kinds the parameter read cannot reach.
    pub fn read_frame(&self, node: NodeId) -> KsResult<Frame> {
        match self.kind {
            RegisterKind::Action { .. } => {}
            _ => {
                return Err(KsError::Lookup(format!(
                    "register {} is not individually readable",
                    self.name
                )));
            }
        }
        let mut payload = Vec::with_capacity(9);
        payload.put_u8(0x01);
        payload.put_slice(&PARAM_HEADER);
        payload.put_slice(&[0x00, 0x00]);
        payload.put_u16_le(self.address);
        Ok(Frame::new(CTRL_SERVER_CMD, node, FN_PARAM_READ, payload))
    }

    /// Build the write command, taking the value from `params` by the
    /// register's field name
    pub fn write_frame(&self, node: NodeId, params: &ParamMap) -> KsResult<Frame> {
        let value = params.get(self.field.name).ok_or_else(|| {
            KsError::Parameter(format!("missing parameter {}", self.field.name))
        })?;
        match self.kind {
            RegisterKind::ReadOnly => Err(KsError::Lookup(format!(
                "register {} is read-only",
                self.name
            ))),
            RegisterKind::Control => self.telecontrol_frame(node, value),
            RegisterKind::Action { tag, len } => self.param_write_frame(node, value, tag, len),
        }
    }

    fn telecontrol_frame(&self, node: NodeId, value: &Value) -> KsResult<Frame> {
        let bytes = self.field.encode(value)?;
        let mut payload = Vec::with_capacity(8);
        payload.put_slice(&TELECONTROL_HEADER);
        payload.put_u16_le(self.address);
        payload.put_slice(&bytes);
        Ok(Frame::new(CTRL_SERVER_CMD, node, FN_TELECONTROL, payload))
    }

    fn param_write_frame(&self, node: NodeId, value: &Value, tag: u8, len: u8) -> KsResult<Frame> {
        let bytes = self.field.encode(value)?;
        if bytes.len() != usize::from(len) {
            return Err(KsError::Parameter(format!(
                "register {} expects a {}-byte value",
                self.name, len
            )));
        }
        let mut payload = Vec::with_capacity(10 + bytes.len());
        payload.put_u8(0x01);
        payload.put_slice(&PARAM_HEADER);
        payload.put_slice(&[0x00, 0x00]);
        payload.put_u8(0x01);
        payload.put_u16_le(self.address);
        payload.put_u8(tag);
        payload.put_u8(len);
        payload.put_slice(&bytes);
        Ok(Frame::new(CTRL_SERVER_CMD, node, FN_PARAM_WRITE, payload))
    }

    /// Decode the response to [`Register::read_frame`]
    pub fn parse_read_response(&self, frame: &Frame) -> KsResult<ParamMap> {
        if frame.ctrl != CTRL_DEVICE_FAULT || frame.function != FN_PARAM_READ {
            return Err(KsError::HeaderMismatch(format!(
                "read response for {}: ctrl=0x{:02X} fn=0x{:02X}",
                self.name, frame.ctrl, frame.function
            )));
        }
        let groups = parse_param_groups(&frame.payload)?;
        let group = groups
            .iter()
            .find(|g| g.address == self.address)
            .ok_or_else(|| {
                KsError::FrameFormat(format!(
                    "read response does not carry register {}",
                    self.name
                ))
            })?;
        self.check_group(group)?;
        let mut out = ParamMap::new();
        out.insert(self.field.name.to_string(), self.field.decode_raw(group.value));
        Ok(out)
    }

    /// The device echoes the tag and length it stored the value under;
    /// a divergence means the response is for something else
    fn check_group(&self, group: &ParamGroup) -> KsResult<()> {
        if let RegisterKind::Action { tag, len } = self.kind {
            if group.tag != tag || group.len != len {
                return Err(KsError::HeaderMismatch(format!(
                    "response for {} echoes tag=0x{:02X} len={}, expected tag=0x{:02X} len={}",
                    self.name, group.tag, group.len, tag, len
                )));
            }
        }
        Ok(())
    }

    /// Check the acknowledgement to [`Register::write_frame`]
    ///
    /// # Errors
    /// `KsError::Parameter` when the device reports a non-zero result.
    pub fn parse_write_response(&self, frame: &Frame) -> KsResult<()> {
        match self.kind {
            RegisterKind::Control => self.parse_telecontrol_ack(frame),
            RegisterKind::Action { .. } => self.parse_param_write_ack(frame),
            RegisterKind::ReadOnly => Err(KsError::Lookup(format!(
                "register {} is read-only",
                self.name
            ))),
        }
    }

    fn parse_param_write_ack(&self, frame: &Frame) -> KsResult<()> {
        if frame.ctrl != CTRL_DEVICE_REPORT || frame.function != FN_PARAM_WRITE {
            return Err(KsError::HeaderMismatch(format!(
                "write ack for {}: ctrl=0x{:02X} fn=0x{:02X}",
                self.name, frame.ctrl, frame.function
            )));
        }
        let payload = &frame.payload;
        if payload.len() < 6 || payload[1..5] != PARAM_ACK_HEADER {
            return Err(KsError::HeaderMismatch(format!(
                "write ack payload {:02X?}",
                payload
            )));
        }
        match payload[5] {
            0x00 => Ok(()),
            code => Err(KsError::Parameter(format!(
                "device rejected write to {}: result 0x{:02X}",
                self.name, code
            ))),
        }
    }

    fn parse_telecontrol_ack(&self, frame: &Frame) -> KsResult<()> {
        if frame.ctrl != CTRL_DEVICE_REPORT || frame.function != FN_TELECONTROL {
            return Err(KsError::HeaderMismatch(format!(
                "telecontrol ack for {}: ctrl=0x{:02X} fn=0x{:02X}",
                self.name, frame.ctrl, frame.function
            )));
        }
        let payload = &frame.payload;
        if payload.len() < 8 || payload[..5] != TELECONTROL_ACK_HEADER {
            return Err(KsError::HeaderMismatch(format!(
                "telecontrol ack payload {:02X?}",
                payload
            )));
        }
        let address = u16::from_le_bytes([payload[5], payload[6]]);
        if address != self.address {
            return Err(KsError::HeaderMismatch(format!(
                "telecontrol ack for 0x{:04X}, expected 0x{:04X}",
                address, self.address
            )));
        }
        match payload[7] {
            0x00 => Ok(()),
            code => Err(KsError::Parameter(format!(
                "device rejected control of {}: result 0x{:02X}",
                self.name, code
            ))),
        }
    }
}

/// A group of registers read in one parameter command
#[derive(Debug, Clone)]
pub struct RegisterSet {
    pub name: &'static str,
    pub registers: Vec<Register>,
}

impl RegisterSet {
    pub fn new(name: &'static str, registers: Vec<Register>) -> Self {
        Self { name, registers }
    }

    /// Build the block read command: a count followed by every member
    /// address
    pub fn read_frame(&self, node: NodeId) -> Frame {
        let mut payload = Vec::with_capacity(7 + self.registers.len() * 2);
        payload.put_u8(self.registers.len() as u8);
        payload.put_slice(&PARAM_HEADER);
        payload.put_slice(&[0x00, 0x00]);
        for register in &self.registers {
            payload.put_u16_le(register.address);
        }
        Frame::new(CTRL_SERVER_CMD, node, FN_PARAM_READ, payload)
    }

    /// Decode a block read response into one value per member
    pub fn decode_response(&self, frame: &Frame) -> KsResult<ParamMap> {
        if frame.ctrl != CTRL_DEVICE_FAULT || frame.function != FN_PARAM_READ {
            return Err(KsError::HeaderMismatch(format!(
                "{} response: ctrl=0x{:02X} fn=0x{:02X}",
                self.name, frame.ctrl, frame.function
            )));
        }
        let groups = parse_param_groups(&frame.payload)?;
        let mut out = ParamMap::new();
        for register in &self.registers {
            let group = groups
                .iter()
                .find(|g| g.address == register.address)
                .ok_or_else(|| {
                    KsError::FrameFormat(format!(
                        "{} response is missing register {}",
                        self.name, register.name
                    ))
                })?;
            register.check_group(group)?;
            out.insert(
                register.field.name.to_string(),
                register.field.decode_raw(group.value),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{find_register, ALARM_SETTINGS};
    use serde_json::json;

    fn node() -> NodeId {
        "102106230001".parse().unwrap()
    }

    #[test]
    fn test_action_write_layout() {
        let register = find_register("OverCurrentValue").unwrap();
        let mut params = ParamMap::new();
        params.insert("OverCurrentValue".to_string(), json!(260));
        let frame = register.write_frame(node(), &params).unwrap();
        assert_eq!(frame.ctrl, CTRL_SERVER_CMD);
        assert_eq!(frame.function, FN_PARAM_WRITE);
        assert_eq!(
            frame.payload,
            vec![
                0x01, // register count
                0x00, 0x06, 0x00, 0x00, // command header
                0x00, 0x00, 0x01, // write marker
                0x2C, 0x82, // address LE
                0x2D, 0x02, // tag, length
                0x04, 0x01, // 260 LE
            ]
        );
    }

    #[test]
    fn test_action_read_round_trip() {
        let register = find_register("OverVoltageDelay").unwrap();
        let frame = register.read_frame(node()).unwrap();
        assert_eq!(frame.function, FN_PARAM_READ);
        assert_eq!(frame.payload[0], 0x01);
        assert_eq!(&frame.payload[7..9], &[0x40, 0x82]);

        let mut payload = vec![0x01];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        payload.extend_from_slice(&[0x40, 0x82, 0x2D, 0x02, 0x0A, 0x00]);
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        let out = register.parse_read_response(&response).unwrap();
        assert_eq!(out["OverVoltageDelay"], json!(10));
    }

    #[test]
    fn test_read_response_rejects_wrong_tag() {
        let register = find_register("OverVoltageDelay").unwrap();
        let mut payload = vec![0x01];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        payload.extend_from_slice(&[0x40, 0x82, 0x2E, 0x02, 0x0A, 0x00]);
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        assert!(matches!(
            register.parse_read_response(&response),
            Err(KsError::HeaderMismatch(_))
        ));
    }

    #[test]
    fn test_action_registers_encode_decode_inverse() {
        for register in &ALARM_SETTINGS.registers {
            let bytes = register.field.encode(&serde_json::json!(260)).unwrap();
            assert_eq!(bytes.len(), 2);
            let raw = u64::from(u16::from_le_bytes([bytes[0], bytes[1]]));
            assert_eq!(register.field.decode_raw(raw), serde_json::json!(260));
        }
    }

    #[test]
    fn test_write_frame_requires_parameter() {
        let register = find_register("OverCurrentValue").unwrap();
        let err = register.write_frame(node(), &ParamMap::new()).unwrap_err();
        assert!(matches!(err, KsError::Parameter(_)));
    }

    #[test]
    fn test_control_write_and_ack() {
        let register = find_register("Switch").unwrap();
        let mut params = ParamMap::new();
        params.insert("Switch".to_string(), json!(1));
        let frame = register.write_frame(node(), &params).unwrap();
        assert_eq!(frame.function, FN_TELECONTROL);
        assert_eq!(
            frame.payload,
            vec![0x81, 0x06, 0x00, 0x00, 0x00, 0x01, 0x60, 0x01]
        );

        let mut ack_payload = TELECONTROL_ACK_HEADER.to_vec();
        ack_payload.extend_from_slice(&[0x01, 0x60, 0x00]);
        let ack = Frame::new(CTRL_DEVICE_REPORT, node(), FN_TELECONTROL, ack_payload);
        register.parse_write_response(&ack).unwrap();

        let mut nak_payload = TELECONTROL_ACK_HEADER.to_vec();
        nak_payload.extend_from_slice(&[0x01, 0x60, 0x01]);
        let nak = Frame::new(CTRL_DEVICE_REPORT, node(), FN_TELECONTROL, nak_payload);
        assert!(matches!(
            register.parse_write_response(&nak),
            Err(KsError::Parameter(_))
        ));
    }

    #[test]
    fn test_read_only_register_rejects_writes() {
        let register = find_register("LeakageProtect").unwrap();
        let mut params = ParamMap::new();
        params.insert("LeakageProtect".to_string(), json!(1));
        assert!(matches!(
            register.write_frame(node(), &params),
            Err(KsError::Lookup(_))
        ));
        assert!(matches!(
            register.read_frame(node()),
            Err(KsError::Lookup(_))
        ));
    }

    #[test]
    fn test_register_set_read_and_decode() {
        let frame = ALARM_SETTINGS.read_frame(node());
        assert_eq!(frame.payload[0], ALARM_SETTINGS.registers.len() as u8);
        assert_eq!(
            frame.payload.len(),
            7 + ALARM_SETTINGS.registers.len() * 2
        );
        // first member address right after the header
        assert_eq!(&frame.payload[7..9], &[0x2C, 0x82]);

        let mut payload = vec![ALARM_SETTINGS.registers.len() as u8];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        for (i, register) in ALARM_SETTINGS.registers.iter().enumerate() {
            payload.extend_from_slice(&register.address.to_le_bytes());
            payload.push(0x2D);
            payload.push(0x02);
            payload.extend_from_slice(&(100 + i as u16).to_le_bytes());
        }
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        let out = ALARM_SETTINGS.decode_response(&response).unwrap();
        assert_eq!(out.len(), ALARM_SETTINGS.registers.len());
        assert_eq!(out["OverCurrentValue"], json!(100));
        assert_eq!(out["ShortDelay"], json!(113));
    }

    #[test]
    fn test_read_response_rejects_nonzero_filler() {
        let register = find_register("OverVoltageDelay").unwrap();
        let mut payload = vec![0x01];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x01, 0x00]);
        payload.extend_from_slice(&[0x40, 0x82, 0x2D, 0x02, 0x0A, 0x00]);
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        assert!(matches!(
            register.parse_read_response(&response),
            Err(KsError::HeaderMismatch(_))
        ));
    }

    #[test]
    fn test_read_response_rejects_count_mismatch() {
        let register = find_register("OverVoltageDelay").unwrap();
        // announces two groups, carries one
        let mut payload = vec![0x02];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        payload.extend_from_slice(&[0x40, 0x82, 0x2D, 0x02, 0x0A, 0x00]);
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        assert!(matches!(
            register.parse_read_response(&response),
            Err(KsError::FrameFormat(_))
        ));
    }

    #[test]
    fn test_register_set_missing_member() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(&PARAM_ACK_HEADER);
        payload.extend_from_slice(&[0x00, 0x00, 0x00]);
        payload.extend_from_slice(&[0x2C, 0x82, 0x2D, 0x02, 0x64, 0x00]);
        let response = Frame::new(CTRL_DEVICE_FAULT, node(), FN_PARAM_READ, payload);
        assert!(matches!(
            ALARM_SETTINGS.decode_response(&response),
            Err(KsError::FrameFormat(_))
        ));
    }
}
