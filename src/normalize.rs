use crate::snapshot::{CpuStats, InterfaceStat, MemoryStats, StorageStats};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Shape of a `data.result` payload, decided once before any field is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    Object(&'a Map<String, Value>),
    Unrecognized(&'static str),
}

impl<'a> Payload<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Payload::Object(map),
            Value::Null => Payload::Unrecognized("null"),
            Value::String(_) => Payload::Unrecognized("string"),
            Value::Bool(_) => Payload::Unrecognized("bool"),
            Value::Number(_) => Payload::Unrecognized("number"),
            Value::Array(_) => Payload::Unrecognized("array"),
        }
    }
}

pub fn normalize_memory(value: &Value) -> MemoryStats {
    let map = match Payload::classify(value) {
        Payload::Object(map) => map,
        Payload::Unrecognized(shape) => {
            warn!(shape, "неподдерживаемый формат данных памяти, используются нули");
            return MemoryStats::default();
        }
    };

    let total = bytes_to_mb(map.get("total"));
    let used = bytes_to_mb(map.get("used"));
    let free = bytes_to_mb(map.get("free"));
    let buffers = bytes_to_mb(map.get("buffers"));
    let cached = bytes_to_mb(map.get("cached"));

    MemoryStats {
        total,
        used,
        free,
        buffers,
        cached,
        actual_used: used as i64 - buffers as i64 - cached as i64,
    }
}

// The router does not report CPU, storage or interfaces in a usable form yet.
// These stay explicit zero/empty placeholders until it does.

pub fn normalize_cpu(value: &Value) -> CpuStats {
    log_ignored_payload("cpu", value);
    CpuStats::default()
}

pub fn normalize_storage(value: &Value) -> StorageStats {
    log_ignored_payload("storage", value);
    StorageStats::default()
}

pub fn normalize_interfaces(value: &Value) -> Vec<InterfaceStat> {
    log_ignored_payload("interfaces", value);
    Vec::new()
}

fn bytes_to_mb(value: Option<&Value>) -> u64 {
    let bytes = value.and_then(Value::as_f64).unwrap_or(0.0).max(0.0);
    (bytes / BYTES_PER_MB).round() as u64
}

fn log_ignored_payload(category: &str, value: &Value) {
    if !value.is_null() {
        debug!(category, "данные категории пока не разбираются, используются значения по умолчанию");
    }
}
