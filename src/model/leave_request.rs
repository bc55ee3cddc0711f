use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// Rejected and cancelled requests are kept for audit but accept no
    /// further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeaveStatus::Rejected | LeaveStatus::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HalfDaySegment {
    Morning,
    Afternoon,
}

/// One leave application. Per-level approval outcomes live in the
/// normalized `ApprovalStep` rows; the timestamps/notes here are the
/// denormalized audit mirror kept on the request itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "LR-2024-000001")]
    pub request_number: String,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2024-01-10", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(example = "2024-01-12", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = 3.0, value_type = f64)]
    pub total_days: Decimal,
    pub is_half_day: bool,
    #[schema(nullable = true)]
    pub half_day_segment: Option<HalfDaySegment>,
    #[schema(example = "family trip", nullable = true)]
    pub reason: Option<String>,
    /// Manager recorded as the MANAGER-level approver.
    #[schema(example = 42, nullable = true)]
    pub approver_id: Option<u64>,
    #[schema(example = 7, nullable = true)]
    pub hr_approver_id: Option<u64>,
    pub requires_hr_approval: bool,
    #[schema(example = "pending")]
    pub status: LeaveStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub manager_notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub hr_approved_at: Option<DateTime<Utc>>,
    pub hr_notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub is_edited: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub edited_at: Option<DateTime<Utc>>,
    pub edited_by: Option<u64>,
    pub edit_reason: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<u64>,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Calendar year whose balance row this request draws from.
    pub fn balance_year(&self) -> i32 {
        use chrono::Datelike;
        self.start_date.year()
    }
}
