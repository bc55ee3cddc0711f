//! Edit-history capture.
//!
//! A pure diff over two snapshots of a request's tracked fields plus the
//! construction of the append-only audit entry. No state of its own.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::edit_history::EditHistoryEntry;
use crate::model::leave_request::{HalfDaySegment, LeaveRequest};

/// The fields of a request whose edits are audited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: Decimal,
    pub is_half_day: bool,
    pub half_day_segment: Option<HalfDaySegment>,
    pub reason: Option<String>,
}

impl FieldSnapshot {
    pub fn capture(request: &LeaveRequest) -> Self {
        FieldSnapshot {
            leave_type_id: request.leave_type_id,
            start_date: request.start_date,
            end_date: request.end_date,
            total_days: request.total_days,
            is_half_day: request.is_half_day,
            half_day_segment: request.half_day_segment,
            reason: request.reason.clone(),
        }
    }

    /// Names of the fields whose values differ between `self` and `after`.
    pub fn changed_fields(&self, after: &FieldSnapshot) -> Vec<String> {
        let mut changed = Vec::new();
        if self.leave_type_id != after.leave_type_id {
            changed.push("leave_type_id".to_string());
        }
        if self.start_date != after.start_date {
            changed.push("start_date".to_string());
        }
        if self.end_date != after.end_date {
            changed.push("end_date".to_string());
        }
        if self.total_days != after.total_days {
            changed.push("total_days".to_string());
        }
        if self.is_half_day != after.is_half_day {
            changed.push("is_half_day".to_string());
        }
        if self.half_day_segment != after.half_day_segment {
            changed.push("half_day_segment".to_string());
        }
        if self.reason != after.reason {
            changed.push("reason".to_string());
        }
        changed
    }
}

pub struct EditHistoryRecorder;

impl EditHistoryRecorder {
    /// Build the audit entry for one edit, or `None` when nothing tracked
    /// actually changed.
    pub fn record(
        leave_request_id: u64,
        before: &FieldSnapshot,
        after: &FieldSnapshot,
        edited_by: u64,
        edit_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<EditHistoryEntry> {
        let changed_fields = before.changed_fields(after);
        if changed_fields.is_empty() {
            return None;
        }
        Some(EditHistoryEntry {
            id: 0,
            leave_request_id,
            edited_by,
            edited_at: now,
            edit_reason,
            old_values: snapshot_json(before),
            new_values: snapshot_json(after),
            changed_fields,
        })
    }
}

/// A `FieldSnapshot` always serializes; should that ever stop holding,
/// the audit entry records `null` and the failure is logged, not lost.
fn snapshot_json(snapshot: &FieldSnapshot) -> serde_json::Value {
    match serde_json::to_value(snapshot) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "edit snapshot failed to serialize");
            serde_json::Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> FieldSnapshot {
        FieldSnapshot {
            leave_type_id: 1,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            total_days: dec!(3),
            is_half_day: false,
            half_day_segment: None,
            reason: Some("family trip".into()),
        }
    }

    #[test]
    fn identical_snapshots_produce_no_entry() {
        let snap = snapshot();
        assert!(EditHistoryRecorder::record(1, &snap, &snap, 1000, None, Utc::now()).is_none());
    }

    #[test]
    fn diff_names_every_changed_field() {
        let before = snapshot();
        let mut after = snapshot();
        after.end_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        after.total_days = dec!(6);
        after.reason = None;

        let changed = before.changed_fields(&after);
        assert_eq!(changed, vec!["end_date", "total_days", "reason"]);
    }

    #[test]
    fn snapshots_record_as_json_objects() {
        let before = snapshot();
        let mut after = snapshot();
        after.leave_type_id = 2;

        let entry = EditHistoryRecorder::record(1, &before, &after, 1000, None, Utc::now())
            .unwrap();
        assert!(entry.old_values.is_object());
        assert!(entry.new_values.is_object());
        assert_eq!(entry.new_values["leave_type_id"], serde_json::json!(2));
    }

    #[test]
    fn entry_carries_both_snapshots_and_the_actor() {
        let before = snapshot();
        let mut after = snapshot();
        after.is_half_day = true;
        after.half_day_segment = Some(HalfDaySegment::Morning);
        after.end_date = before.start_date;
        after.total_days = dec!(0.5);

        let entry = EditHistoryRecorder::record(
            9,
            &before,
            &after,
            1000,
            Some("switched to half day".into()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(entry.leave_request_id, 9);
        assert_eq!(entry.edited_by, 1000);
        assert_eq!(entry.edit_reason.as_deref(), Some("switched to half day"));
        assert_eq!(entry.old_values["total_days"], serde_json::json!(3.0));
        assert_eq!(entry.new_values["is_half_day"], serde_json::json!(true));
        assert!(entry.changed_fields.contains(&"half_day_segment".into()));
    }
}
