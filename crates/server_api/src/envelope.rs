//! The `<dbs>` envelope KOPIS wraps every response in.
//!
//! KOPIS emits a bare `<db>` object when exactly one record matches and a
//! list otherwise. [`Records`] captures both shapes and is resolved into a
//! plain list here, before anything reaches the response body.

use serde_json::Value;
use shared::domain::PerformanceRecord;
use thiserror::Error;
use tracing::warn;

use crate::xml::{self, XmlError, XmlValue};

pub const ENVELOPE_TAG: &str = "dbs";
pub const RECORD_TAG: &str = "db";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("response has no <dbs> envelope (root element was <{0}>)")]
    MissingEnvelope(String),
    #[error("response envelope holds no performance record")]
    MissingRecord,
    #[error("performance record holds bare text instead of fields")]
    BareRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    Single(PerformanceRecord),
    Many(Vec<PerformanceRecord>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Single(_) => 1,
            Records::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<PerformanceRecord> {
        match self {
            Records::Single(record) => vec![record],
            Records::Many(records) => records,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    records: Option<Records>,
}

impl Envelope {
    pub fn parse(body: &str) -> Result<Self, EnvelopeError> {
        let document = xml::parse(body)?;
        if document.root_name != ENVELOPE_TAG {
            return Err(EnvelopeError::MissingEnvelope(document.root_name));
        }

        let records = match document.root.into_field(RECORD_TAG) {
            None => None,
            Some(XmlValue::Repeated(items)) => Some(Records::Many(
                items
                    .into_iter()
                    .map(into_record)
                    .collect::<Result<_, _>>()?,
            )),
            Some(value) => Some(Records::Single(into_record(value)?)),
        };
        Ok(Self { records })
    }

    pub fn records(&self) -> Option<&Records> {
        self.records.as_ref()
    }

    pub fn into_performances(self) -> Vec<PerformanceRecord> {
        self.records.map(Records::into_vec).unwrap_or_default()
    }

    /// The one record of a detail response.
    pub fn into_single(self) -> Result<PerformanceRecord, EnvelopeError> {
        match self.records {
            Some(Records::Single(record)) => Ok(record),
            Some(Records::Many(records)) => {
                warn!(
                    count = records.len(),
                    "detail response carried several records; using the first"
                );
                records
                    .into_iter()
                    .next()
                    .ok_or(EnvelopeError::MissingRecord)
            }
            None => Err(EnvelopeError::MissingRecord),
        }
    }
}

fn into_record(value: XmlValue) -> Result<PerformanceRecord, EnvelopeError> {
    match value.into_json() {
        Value::Object(fields) => Ok(PerformanceRecord(fields)),
        Value::String(text) if text.trim().is_empty() => Ok(PerformanceRecord::default()),
        _ => Err(EnvelopeError::BareRecord),
    }
}

#[cfg(test)]
#[path = "tests/envelope_tests.rs"]
mod tests;
