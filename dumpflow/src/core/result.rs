//! Versioned result schema stored with successful tasks.

use crate::context::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the [`StageResult`] schema.
pub const STAGE_RESULT_SCHEMA_VERSION: u32 = 1;

/// Reasons a stored payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultSchemaError {
    /// The payload does not have the expected structure.
    #[error("malformed stage result: {0}")]
    Malformed(String),

    /// The payload was written by an incompatible schema version.
    #[error("unsupported stage result schema version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the payload.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
}

/// The payload a successful stage leaves in the task store.
///
/// The payload is plain data. It is parsed against this schema and never
/// evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageResult {
    /// Schema version.
    pub schema_version: u32,
    /// Stage name.
    pub stage: String,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// The context the stage returned.
    pub context: Context,
}

impl StageResult {
    /// Creates a result for a stage that just completed.
    #[must_use]
    pub fn completed(stage: impl Into<String>, started_at: DateTime<Utc>, context: Context) -> Self {
        Self {
            schema_version: STAGE_RESULT_SCHEMA_VERSION,
            stage: stage.into(),
            started_at,
            ended_at: Utc::now(),
            context,
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Serializes the result for the task store.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be represented as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Parses and validates a stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is not the current one or the payload
    /// does not match the schema.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ResultSchemaError> {
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ResultSchemaError::Malformed("missing schema_version".to_string()))?;

        if found != u64::from(STAGE_RESULT_SCHEMA_VERSION) {
            return Err(ResultSchemaError::UnsupportedVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: STAGE_RESULT_SCHEMA_VERSION,
            });
        }

        Self::deserialize(value).map_err(|e| ResultSchemaError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_roundtrip_through_store_value() {
        let ctx = Context::backup("erp");
        let result = StageResult::completed("create-workdir", Utc::now(), ctx.clone());

        let value = result.to_value().unwrap();
        let parsed = StageResult::from_value(&value).unwrap();

        assert_eq!(parsed.stage, "create-workdir");
        assert_eq!(parsed.context, ctx);
    }

    #[test]
    fn test_rejects_other_versions() {
        let value = json!({"schema_version": 99, "stage": "x"});
        assert_eq!(
            StageResult::from_value(&value),
            Err(ResultSchemaError::UnsupportedVersion {
                found: 99,
                expected: STAGE_RESULT_SCHEMA_VERSION
            })
        );
    }

    #[test]
    fn test_rejects_text_payloads() {
        let value = json!("{'download': __import__('os').getcwd()}");
        assert!(matches!(
            StageResult::from_value(&value),
            Err(ResultSchemaError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let mut value = StageResult::completed("s", Utc::now(), Context::backup("erp"))
            .to_value()
            .unwrap();
        value["extra"] = json!(true);
        assert!(matches!(
            StageResult::from_value(&value),
            Err(ResultSchemaError::Malformed(_))
        ));
    }
}
