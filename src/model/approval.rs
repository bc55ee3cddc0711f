use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalLevel {
    Manager,
    HrManager,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// One required sign-off level for one leave request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalStep {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1)]
    pub leave_request_id: u64,
    #[schema(example = "manager")]
    pub level: ApprovalLevel,
    #[schema(example = 42, nullable = true)]
    pub approver_id: Option<u64>,
    #[schema(example = "pending")]
    pub status: ApprovalStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub acted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl ApprovalStep {
    pub fn pending(level: ApprovalLevel, approver_id: Option<u64>, now: DateTime<Utc>) -> Self {
        ApprovalStep {
            id: 0,
            leave_request_id: 0,
            level,
            approver_id,
            status: ApprovalStatus::Pending,
            acted_at: None,
            notes: None,
            rejection_reason: None,
            created_at: now,
        }
    }

    pub fn approve(&mut self, now: DateTime<Utc>, notes: Option<String>) {
        self.status = ApprovalStatus::Approved;
        self.acted_at = Some(now);
        self.notes = notes;
    }

    pub fn reject(&mut self, now: DateTime<Utc>, reason: String, notes: Option<String>) {
        self.status = ApprovalStatus::Rejected;
        self.acted_at = Some(now);
        self.rejection_reason = Some(reason);
        self.notes = notes;
    }
}
