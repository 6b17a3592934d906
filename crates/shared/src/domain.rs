use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_START_DATE: &str = "20241201";
pub const DEFAULT_END_DATE: &str = "20241231";
pub const DEFAULT_PAGE: &str = "1";
pub const DEFAULT_ROWS: &str = "20";
/// KOPIS region code for Seoul.
pub const DEFAULT_REGION: &str = "11";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceId(pub String);

impl std::fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `<db>` record as KOPIS sent it. Fields are kept verbatim and in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceRecord(pub Map<String, Value>);

impl PerformanceRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameters of a listing request after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub api_key: String,
    pub stdate: String,
    pub eddate: String,
    pub cpage: String,
    pub rows: String,
    pub sharea: String,
    pub genre: Option<String>,
}

impl ListingQuery {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            stdate: DEFAULT_START_DATE.into(),
            eddate: DEFAULT_END_DATE.into(),
            cpage: DEFAULT_PAGE.into(),
            rows: DEFAULT_ROWS.into(),
            sharea: DEFAULT_REGION.into(),
            genre: None,
        }
    }
}
