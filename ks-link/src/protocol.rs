//! Control codes, function codes, and link-level messages
//!
//! The Ctrl byte identifies the direction and class of a frame; the
//! function code selects the conversation. Polls and commands carry fixed
//! header templates in front of their data, and the matching responses
//! mirror the template with the second byte bumped from 0x06 to 0x07.

use crate::frame::{Frame, MAX_PAYLOAD_LEN};
use ks_core::{KsError, KsResult, NodeId, TimeMark};

/// Device to server: login, heartbeat, power-down, write acks
pub const CTRL_DEVICE_REPORT: u8 = 0x80;
/// Device to server: fault notification and parameter read responses
pub const CTRL_DEVICE_FAULT: u8 = 0x83;
/// Device to server: telemetry and teleindication responses
pub const CTRL_DEVICE_TELE: u8 = 0x88;
/// Server to device: telemetry and teleindication polls
pub const CTRL_SERVER_POLL: u8 = 0x0A;
/// Server to device: fault ack, parameter commands, telecontrol
pub const CTRL_SERVER_CMD: u8 = 0x03;

pub const FN_FAULT: u8 = 0x2A;
pub const FN_TELECONTROL: u8 = 0x2D;
pub const FN_TELE: u8 = 0x64;
pub const FN_LOGIN: u8 = 0x8B;
pub const FN_POWER_DOWN: u8 = 0x8C;
pub const FN_HEARTBEAT: u8 = 0x8D;
pub const FN_BIND: u8 = 0x8F;
pub const FN_PARAM_READ: u8 = 0xCA;
pub const FN_PARAM_WRITE: u8 = 0xCB;

pub const FAULT_HEADER: [u8; 5] = [0x00, 0x03, 0x00, 0x00, 0x00];
pub const FAULT_ACK_HEADER: [u8; 5] = [0x00, 0x03, 0x01, 0x00, 0x00];

pub const TELEMETRY_HEADER: [u8; 8] = [0x80, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x20];
pub const TELEMETRY_ACK_HEADER: [u8; 8] = [0x80, 0x07, 0x00, 0x00, 0x00, 0x01, 0x00, 0x20];

pub const TELEINDICATION_HEADER: [u8; 8] = [0x80, 0x06, 0x00, 0x00, 0x00, 0x01, 0x40, 0x20];
// Deployed firmware answers with a trailing 0x00 where the protocol text
// says 0x20; match what the devices actually send.
pub const TELEINDICATION_ACK_HEADER: [u8; 8] = [0x80, 0x07, 0x00, 0x00, 0x00, 0x01, 0x40, 0x00];

pub const PARAM_HEADER: [u8; 4] = [0x00, 0x06, 0x00, 0x00];
pub const PARAM_ACK_HEADER: [u8; 4] = [0x00, 0x07, 0x00, 0x00];

pub const TELECONTROL_HEADER: [u8; 5] = [0x81, 0x06, 0x00, 0x00, 0x00];
pub const TELECONTROL_ACK_HEADER: [u8; 5] = [0x81, 0x07, 0x00, 0x00, 0x00];

/// Periodic keep-alive carrying the concentrator id and its line roster
///
/// Payload: concentrator id (6), then one 6-byte node id per connected
/// line, then a 2-byte report sequence the roster scan stops short of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub id: NodeId,
    pub nodes: Vec<NodeId>,
}

impl Heartbeat {
    pub fn from_frame(frame: &Frame) -> KsResult<Self> {
        let payload = &frame.payload;
        if payload.len() < 8 {
            return Err(KsError::FrameFormat(format!(
                "heartbeat payload expected >= 8 bytes, got {}",
                payload.len()
            )));
        }
        let id = NodeId::from_slice(&payload[..6])?;
        let mut nodes = Vec::new();
        let mut i = 6;
        while i + 6 <= payload.len() - 1 {
            nodes.push(NodeId::from_slice(&payload[i..i + 6])?);
            i += 6;
        }
        Ok(Self { id, nodes })
    }
}

/// One teleindication sample attached to a fault report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPoint {
    pub dit: u16,
    pub value: u16,
}

/// Unsolicited fault notification
///
/// The device interleaves one telemetry point (the breaker that tripped)
/// with a run of teleindication samples taken at the moment of the fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub telemetering_num: u8,
    pub telemetering_type: u8,
    pub dit: u16,
    pub value: u8,
    pub time: TimeMark,
    pub teleindication_num: u16,
    pub teleindication_type: u8,
    pub points: Vec<FaultPoint>,
}

impl Fault {
    pub fn from_frame(frame: &Frame) -> KsResult<Self> {
        if frame.ctrl != CTRL_DEVICE_FAULT {
            return Err(KsError::HeaderMismatch(format!(
                "fault notification ctrl=0x{:02X}",
                frame.ctrl
            )));
        }
        let payload = &frame.payload;
        if payload.len() < 21 {
            return Err(KsError::FrameFormat(format!(
                "fault payload expected >= 21 bytes, got {}",
                payload.len()
            )));
        }
        if payload[..5] != FAULT_HEADER {
            return Err(KsError::HeaderMismatch(format!(
                "fault header {:02X?}",
                &payload[..5]
            )));
        }

        let time = TimeMark::from_slice(&payload[10..17]).ok_or_else(|| {
            KsError::FrameFormat("fault time mark truncated".to_string())
        })?;

        let mut points = Vec::new();
        let mut i = 20;
        while i + 4 <= payload.len() - 1 {
            points.push(FaultPoint {
                dit: u16::from_le_bytes([payload[i], payload[i + 1]]),
                value: u16::from_le_bytes([payload[i + 2], payload[i + 3]]),
            });
            i += 4;
        }

        Ok(Self {
            telemetering_num: payload[5],
            telemetering_type: payload[6],
            dit: u16::from_le_bytes([payload[7], payload[8]]),
            value: payload[9],
            time,
            teleindication_num: u16::from_le_bytes([payload[17], payload[18]]),
            teleindication_type: payload[19],
            points,
        })
    }

    /// Acknowledgement the device expects before it stops repeating the
    /// notification: the ack header followed by the echoed telemetry
    /// point and time mark.
    pub fn ack_frame(&self, address: NodeId) -> Frame {
        let mut payload = Vec::with_capacity(17);
        payload.extend_from_slice(&FAULT_ACK_HEADER);
        payload.push(self.telemetering_num);
        payload.push(self.telemetering_type);
        payload.extend_from_slice(&self.dit.to_le_bytes());
        payload.push(self.value);
        payload.extend_from_slice(self.time.as_bytes());
        Frame::new(CTRL_SERVER_CMD, address, FN_FAULT, payload)
    }
}

/// Build a telemetry (digital status) poll for one line
pub fn telemetry_request(address: NodeId) -> Frame {
    Frame::new(
        CTRL_SERVER_POLL,
        address,
        FN_TELE,
        TELEMETRY_HEADER.to_vec(),
    )
}

/// Build a teleindication (analog quantities) poll for one line
pub fn teleindication_request(address: NodeId) -> Frame {
    Frame::new(
        CTRL_SERVER_POLL,
        address,
        FN_TELE,
        TELEINDICATION_HEADER.to_vec(),
    )
}

/// Validate a telemetry response and return its data region
pub fn telemetry_data(frame: &Frame) -> KsResult<&[u8]> {
    poll_response_data(frame, &TELEMETRY_ACK_HEADER, "telemetry")
}

/// Validate a teleindication response and return its data region
pub fn teleindication_data(frame: &Frame) -> KsResult<&[u8]> {
    poll_response_data(frame, &TELEINDICATION_ACK_HEADER, "teleindication")
}

fn poll_response_data<'a>(frame: &'a Frame, header: &[u8], what: &str) -> KsResult<&'a [u8]> {
    if frame.ctrl != CTRL_DEVICE_TELE || frame.function != FN_TELE {
        return Err(KsError::HeaderMismatch(format!(
            "{} response ctrl=0x{:02X} fn=0x{:02X}",
            what, frame.ctrl, frame.function
        )));
    }
    let payload = &frame.payload;
    if payload.len() < header.len() || &payload[..header.len()] != header {
        return Err(KsError::HeaderMismatch(format!(
            "{} response header {:02X?}",
            what,
            &payload[..payload.len().min(header.len())]
        )));
    }
    Ok(&payload[header.len()..])
}

/// Largest roster one bind command can carry: the count byte plus
/// 6 bytes per node must stay within [`MAX_PAYLOAD_LEN`]
pub const MAX_BIND_NODES: usize = (MAX_PAYLOAD_LEN - 1) / 6;

/// Build the roster command that tells a concentrator which line nodes it
/// owns: a count byte followed by the 6-byte address of each node.
///
/// # Errors
/// `KsError::Parameter` when the roster exceeds [`MAX_BIND_NODES`].
pub fn bind_nodes_request(concentrator: NodeId, nodes: &[NodeId]) -> KsResult<Frame> {
    if nodes.len() > MAX_BIND_NODES {
        return Err(KsError::Parameter(format!(
            "roster of {} nodes exceeds the {}-node maximum",
            nodes.len(),
            MAX_BIND_NODES
        )));
    }
    let mut payload = Vec::with_capacity(1 + nodes.len() * 6);
    payload.push(nodes.len() as u8);
    for node in nodes {
        payload.extend_from_slice(node.as_bytes());
    }
    Ok(Frame::new(CTRL_SERVER_CMD, concentrator, FN_BIND, payload))
}
