use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Append-only audit record of one edit to a leave request. Never updated
/// or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditHistoryEntry {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1)]
    pub leave_request_id: u64,
    #[schema(example = 1000)]
    pub edited_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub edited_at: DateTime<Utc>,
    #[schema(example = "dates shifted by one week", nullable = true)]
    pub edit_reason: Option<String>,
    /// Tracked-field snapshot before the edit.
    #[schema(value_type = Object)]
    pub old_values: serde_json::Value,
    /// Tracked-field snapshot after the edit.
    #[schema(value_type = Object)]
    pub new_values: serde_json::Value,
    #[schema(example = json!(["start_date", "end_date", "total_days"]))]
    pub changed_fields: Vec<String>,
}
