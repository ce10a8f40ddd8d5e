//! Typed views over packed payload bytes

use ks_core::{KsError, KsResult};
use serde_json::Value;

/// Decoded parameter values keyed by field name
pub type ParamMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Raw shape of a field inside a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single byte
    Byte,
    /// Two bytes in the given order
    Uint16(ByteOrder),
    /// Fixed-length byte run rendered as its uppercase hex digits
    Str(usize),
}

impl FieldKind {
    fn width(&self) -> usize {
        match self {
            FieldKind::Byte => 1,
            FieldKind::Uint16(_) => 2,
            FieldKind::Str(len) => *len,
        }
    }

    fn max_raw(&self) -> u64 {
        match self {
            FieldKind::Byte => u64::from(u8::MAX),
            FieldKind::Uint16(_) => u64::from(u16::MAX),
            FieldKind::Str(_) => 0,
        }
    }
}

/// One named quantity at a fixed offset inside a payload block
///
/// A coefficient scales the raw integer into its engineering unit on
/// decode, and divides it back out on encode. `0.1` on a voltage field
/// turns the wire value `2205` into `220.5` volts.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
    pub coefficient: Option<f64>,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self {
            name,
            offset,
            kind,
            coefficient: None,
        }
    }

    pub const fn scaled(name: &'static str, offset: usize, kind: FieldKind, k: f64) -> Self {
        Self {
            name,
            offset,
            kind,
            coefficient: Some(k),
        }
    }

    fn raw_from(&self, data: &[u8]) -> KsResult<u64> {
        let end = self.offset + self.kind.width();
        if data.len() < end {
            return Err(KsError::FrameFormat(format!(
                "field {} expects {} bytes at offset {}, payload has {}",
                self.name,
                self.kind.width(),
                self.offset,
                data.len()
            )));
        }
        let raw = match self.kind {
            FieldKind::Byte => u64::from(data[self.offset]),
            FieldKind::Uint16(ByteOrder::Little) => {
                u64::from(u16::from_le_bytes([data[self.offset], data[self.offset + 1]]))
            }
            FieldKind::Uint16(ByteOrder::Big) => {
                u64::from(u16::from_be_bytes([data[self.offset], data[self.offset + 1]]))
            }
            FieldKind::Str(_) => 0,
        };
        Ok(raw)
    }

    /// Decode this field out of `data` into `out`
    pub fn decode(&self, data: &[u8], out: &mut ParamMap) -> KsResult<()> {
        if let FieldKind::Str(len) = self.kind {
            let end = self.offset + len;
            if data.len() < end {
                return Err(KsError::FrameFormat(format!(
                    "field {} expects {} bytes at offset {}, payload has {}",
                    self.name,
                    len,
                    self.offset,
                    data.len()
                )));
            }
            let text: String = data[self.offset..end]
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect();
            out.insert(self.name.to_string(), Value::String(text));
            return Ok(());
        }

        let raw = self.raw_from(data)?;
        let value = match self.coefficient {
            Some(k) => Value::from(raw as f64 * k),
            None => Value::from(raw),
        };
        out.insert(self.name.to_string(), value);
        Ok(())
    }

    /// Decode a raw register value through this field's coefficient
    pub fn decode_raw(&self, raw: u64) -> Value {
        match self.coefficient {
            Some(k) => Value::from(raw as f64 * k),
            None => Value::from(raw),
        }
    }

    /// Encode a supplied value to its wire bytes
    ///
    /// # Errors
    /// `KsError::Parameter` when the value is not a number, does not land
    /// on an integral raw count after removing the coefficient, or falls
    /// outside the field's range.
    pub fn encode(&self, value: &Value) -> KsResult<Vec<u8>> {
        let number = value.as_f64().ok_or_else(|| {
            KsError::Parameter(format!("{} expects a number, got {}", self.name, value))
        })?;
        let raw = match self.coefficient {
            Some(k) => number / k,
            None => number,
        };
        if raw.fract() != 0.0 || raw < 0.0 {
            return Err(KsError::Parameter(format!(
                "{} value {} does not map to a whole register count",
                self.name, number
            )));
        }
        let raw = raw as u64;
        if raw > self.kind.max_raw() {
            return Err(KsError::Parameter(format!(
                "{} value {} exceeds the field range",
                self.name, number
            )));
        }
        let bytes = match self.kind {
            FieldKind::Byte => vec![raw as u8],
            FieldKind::Uint16(ByteOrder::Little) => (raw as u16).to_le_bytes().to_vec(),
            FieldKind::Uint16(ByteOrder::Big) => (raw as u16).to_be_bytes().to_vec(),
            FieldKind::Str(_) => {
                return Err(KsError::Parameter(format!(
                    "{} is not writable as a number",
                    self.name
                )));
            }
        };
        Ok(bytes)
    }

    /// Encode the named parameter out of `params` into `block` at the
    /// field offset
    pub fn encode_into(&self, params: &ParamMap, block: &mut [u8]) -> KsResult<()> {
        let value = params.get(self.name).ok_or_else(|| {
            KsError::Parameter(format!("missing parameter {}", self.name))
        })?;
        let bytes = self.encode(value)?;
        let end = self.offset + bytes.len();
        if block.len() < end {
            return Err(KsError::Parameter(format!(
                "{} does not fit at {}..{} of a {}-byte block",
                self.name,
                self.offset,
                end,
                block.len()
            )));
        }
        block[self.offset..end].copy_from_slice(&bytes);
        Ok(())
    }
}

/// A named group of fields sharing one payload block
#[derive(Debug, Clone)]
pub struct FieldSet {
    pub name: &'static str,
    pub min_len: usize,
    pub fields: Vec<Field>,
}

impl FieldSet {
    pub fn new(name: &'static str, min_len: usize, fields: Vec<Field>) -> Self {
        Self {
            name,
            min_len,
            fields,
        }
    }

    /// Decode every field of the block
    pub fn decode(&self, data: &[u8]) -> KsResult<ParamMap> {
        if data.len() < self.min_len {
            return Err(KsError::FrameFormat(format!(
                "{} block expects >= {} bytes, got {}",
                self.name,
                self.min_len,
                data.len()
            )));
        }
        let mut out = ParamMap::new();
        for field in &self.fields {
            field.decode(data, &mut out)?;
        }
        Ok(out)
    }

    /// Encode every field into one block, in offset order
    ///
    /// # Errors
    /// The first failing member aborts the encode; the error names the
    /// block and the field.
    pub fn encode(&self, params: &ParamMap) -> KsResult<Vec<u8>> {
        let mut block = vec![0u8; self.min_len];
        for field in &self.fields {
            field.encode_into(params, &mut block).map_err(|err| match err {
                KsError::Parameter(msg) => {
                    KsError::Parameter(format!("{}: {}", self.name, msg))
                }
                other => other,
            })?;
        }
        Ok(block)
    }
}
