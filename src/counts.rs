//! Defect categories, count normalization and model reply parsing

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{AsRefStr, Display, EnumCount, EnumIter, EnumString};
use tracing::warn;

/// Largest count a single abacus row can hold
pub const MAX_COUNT: u8 = 10;

/// One abacus row, in board order (row 1 at the top)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, EnumString, EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum DefectCategory {
    Aerosaculite,
    Celulite,
    Contusao,
    Hematomas,
    Hepatite,
    Micoplasmose,
    Pericardite,
    Peritonite,
    Salmonelose,
    Tuberculose,
}

impl DefectCategory {
    /// 1-based abacus row this category is read from
    pub fn row(self) -> u32 {
        self as u32 + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Aerosaculite => "aerosaculite",
            Self::Celulite => "celulite",
            Self::Contusao => "contusao",
            Self::Hematomas => "hematomas",
            Self::Hepatite => "hepatite",
            Self::Micoplasmose => "micoplasmose",
            Self::Pericardite => "pericardite",
            Self::Peritonite => "peritonite",
            Self::Salmonelose => "salmonelose",
            Self::Tuberculose => "tuberculose",
        }
    }
}

/// Count per defect category, always complete and always within `0..=10`
///
/// Serializes as a JSON object keyed by label, in row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountsMap([u8; DefectCategory::COUNT]);

impl CountsMap {
    /// Read every label from `contagem`, coerce it to an integer and clamp it.
    /// Anything that is not a JSON object yields all zeros.
    pub fn normalize(contagem: &Value) -> Self {
        let mut counts = Self::default();
        let object = contagem.as_object();

        for category in DefectCategory::iter() {
            let value = object
                .and_then(|map| map.get(category.label()))
                .map(coerce_count)
                .unwrap_or(0);
            counts.0[category as usize] = clamp_count(value);
        }

        counts
    }

    pub fn get(&self, category: DefectCategory) -> u8 {
        self.0[category as usize]
    }

    pub fn set(&mut self, category: DefectCategory, value: i64) {
        self.0[category as usize] = clamp_count(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefectCategory, u8)> + '_ {
        DefectCategory::iter().map(move |category| (category, self.get(category)))
    }

    pub fn total(&self) -> u32 {
        self.0.iter().map(|&v| v as u32).sum()
    }
}

impl Serialize for CountsMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, value) in self.iter() {
            map.serialize_entry(category.label(), &value)?;
        }
        map.end()
    }
}

fn clamp_count(value: i64) -> u8 {
    value.clamp(0, MAX_COUNT as i64) as u8
}

/// Integer value of a JSON count: integers as-is, floats truncated toward
/// zero, integer strings parsed, booleans as 0/1, everything else 0
fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u.min(i64::MAX as u64) as i64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

/// What came back from the model, after best-effort JSON recovery
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The reply held a JSON object
    Structured(Map<String, Value>),
    /// No JSON object could be recovered; the cleaned text is kept for debugging
    Degraded { raw: String },
}

impl ModelReply {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// The `contagem` member, or an empty object when absent
    pub fn contagem(&self) -> Value {
        match self {
            Self::Structured(map) => map
                .get("contagem")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            Self::Degraded { .. } => Value::Object(Map::new()),
        }
    }

    pub fn counts(&self) -> CountsMap {
        CountsMap::normalize(&self.contagem())
    }

    /// Parsed object, or `{"_raw": text}` when degraded
    pub fn raw_debug(&self) -> Value {
        match self {
            Self::Structured(map) => Value::Object(map.clone()),
            Self::Degraded { raw } => {
                let mut map = Map::new();
                map.insert("_raw".to_string(), Value::String(raw.clone()));
                Value::Object(map)
            }
        }
    }
}

fn json_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[\s\S]*\}").ok()).as_ref()
}

/// Recover a JSON object from free-form model output
///
/// Markdown code fences are dropped, then the whole text is parsed. If that
/// fails, the span from the first `{` to the last `}` is tried.
pub fn parse_reply(text: &str) -> ModelReply {
    let stripped = text.trim();
    let cleaned = stripped
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    let parsed = serde_json::from_str::<Value>(&cleaned).ok().or_else(|| {
        json_object_pattern()
            .and_then(|re| re.find(&cleaned))
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
    });

    match parsed {
        Some(Value::Object(map)) => ModelReply::Structured(map),
        Some(other) => {
            warn!("Model reply is JSON but not an object ({})", json_kind(&other));
            ModelReply::Degraded {
                raw: stripped.to_string(),
            }
        }
        None => {
            warn!("Model reply holds no parseable JSON object");
            ModelReply::Degraded {
                raw: stripped.to_string(),
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
