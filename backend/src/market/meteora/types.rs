use serde_json::Value;
use tracing::warn;

use crate::market::meteora::errors::MeteoraError;
use crate::market::types::PairRecord;

/// 0-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
}

/// One decoded listing page.
#[derive(Debug, Clone, Default)]
pub struct PairPage {
    pub records: Vec<PairRecord>,
    /// Total pool count when the endpoint reports it.
    pub total: Option<u64>,
}

impl PairPage {
    /// Accepts both `{"pairs": [...], "total": n}` and a bare array.
    /// Elements that are not objects are dropped with a warning.
    pub fn from_value(body: Value) -> Result<Self, MeteoraError> {
        let (items, total) = match body {
            Value::Array(items) => (items, None),
            Value::Object(mut map) => {
                let total = map.get("total").and_then(Value::as_u64);
                match map.remove("pairs") {
                    Some(Value::Array(items)) => (items, total),
                    _ => {
                        return Err(MeteoraError::InvalidResponse(
                            "object body without a `pairs` array".into(),
                        ));
                    }
                }
            }
            other => {
                return Err(MeteoraError::InvalidResponse(format!(
                    "expected array or object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let received = items.len();
        let records: Vec<PairRecord> = items
            .into_iter()
            .filter_map(PairRecord::from_value)
            .collect();

        if records.len() < received {
            warn!(
                dropped = received - records.len(),
                "dropping non-object elements from listing page"
            );
        }

        Ok(Self { records, total })
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
