//! Pool records as served by the Meteora DLMM listing endpoint.
//!
//! The feed is treated as untyped: numbers arrive either as JSON numbers or
//! as decimal strings depending on the field, and fields come and go between
//! API revisions. Every field is therefore optional and decoded leniently;
//! anything missing or malformed becomes `None`, never zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Short-window figures nested under `volume` and `fees`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WindowFigures {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_30: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour_1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour_2: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour_4: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour_12: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour_24: Option<f64>,
}

/// One pool as seen in a single listing page.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PairRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mint_x: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mint_y: Option<String>,

    #[serde(default, deserialize_with = "lenient_u32")]
    pub bin_step: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub base_fee_percentage: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub liquidity: Option<f64>,

    /// Lifetime fee counter. Deltas are derived from it, it is never summed.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cumulative_fee_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cumulative_trade_volume: Option<f64>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub hide: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_blacklisted: Option<bool>,

    #[serde(default, deserialize_with = "lenient_windows")]
    pub volume: Option<WindowFigures>,
    #[serde(default, deserialize_with = "lenient_windows")]
    pub fees: Option<WindowFigures>,
}

impl PairRecord {
    /// Decodes one element of a listing page. Returns `None` only when the
    /// element is not a JSON object at all.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// True when the pool reports exactly zero volume in its most granular
    /// window. With the listing sorted by volume this marks the inactive tail.
    pub fn is_idle(&self) -> bool {
        self.volume
            .as_ref()
            .and_then(|v| v.min_30)
            .is_some_and(|v| v == 0.0)
    }
}

/// Records of one collection run, all sharing a single capture timestamp.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<PairRecord>,
    pub captured_at: DateTime<Utc>,
}

fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_to_f64))
}

fn lenient_u32<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_to_f64).and_then(|f| {
        if f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f) {
            Some(f as u32)
        } else {
            None
        }
    }))
}

fn lenient_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_windows<'de, D>(d: D) -> Result<Option<WindowFigures>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.filter(Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok()))
}

fn value_to_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}
