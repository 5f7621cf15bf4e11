// src/util/io/records.rs
//! Outbound line protocol: `@PREFIX <compact JSON>`

use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Ack,
    Data,
    Info,
    Log,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::Ack => "@ACK",
            RecordKind::Data => "@DATA",
            RecordKind::Info => "@INFO",
            RecordKind::Log => "@LOG",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub body: Value,
}

impl Record {
    pub fn new(kind: RecordKind, body: Value) -> Self {
        Self { kind, body }
    }

    /// `@LOG {"tag":..,"event":..,<extra>}`; non-object `extra` is ignored
    pub fn log(tag: &str, event: &str, extra: Value) -> Self {
        let mut body = Map::new();
        body.insert("tag".to_string(), Value::from(tag));
        body.insert("event".to_string(), Value::from(event));
        if let Value::Object(fields) = extra {
            body.extend(fields);
        }
        Self::new(RecordKind::Log, Value::Object(body))
    }

    pub fn is_ack_for(&self, id: u32) -> bool {
        self.kind == RecordKind::Ack && self.body.get("id").and_then(Value::as_u64) == Some(id as u64)
    }

    pub fn is_log_event(&self, event: &str) -> bool {
        self.kind == RecordKind::Log && self.body.get("event").and_then(Value::as_str) == Some(event)
    }

    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.prefix(), self.body)
    }
}

pub type RecordSender = mpsc::UnboundedSender<Record>;
pub type RecordReceiver = mpsc::UnboundedReceiver<Record>;

pub fn record_channel() -> (RecordSender, RecordReceiver) {
    mpsc::unbounded_channel()
}

/// `0xHHHH`, the way node ids and PAN ids are shown on the wire
pub fn hex16(value: u16) -> String {
    format!("0x{:04X}", value)
}

/// `0xHH`, the way stack status codes are shown on the wire
pub fn hex8(value: u8) -> String {
    format!("0x{:02X}", value)
}
