//! MySQL-backed `LeaveStore`.
//!
//! Every `insert_unit`/`update_unit` runs inside one transaction, so a
//! request write and its paired ledger write land together or not at all.
//! Balance writes are version-guarded; a row that moved since it was read
//! rolls the transaction back with `StoreError::StaleBalance`. Enum fields
//! round-trip as strings; corrupt values surface as `StoreError::Corrupt`
//! instead of panicking.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::leave::numbering;
use crate::model::approval::ApprovalStep;
use crate::model::edit_history::EditHistoryEntry;
use crate::model::employee::EmployeeRef;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_request::LeaveRequest;

use super::{LeaveStore, LeaveUnit};

pub struct MySqlLeaveStore {
    pool: MySqlPool,
}

impl MySqlLeaveStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlLeaveStore { pool }
    }
}

const SELECT_REQUEST: &str = r#"
SELECT id, request_number, employee_id, leave_type_id, start_date, end_date,
       total_days, is_half_day, half_day_segment, reason, approver_id,
       hr_approver_id, requires_hr_approval, status, manager_approved_at,
       manager_notes, hr_approved_at, hr_notes, rejected_at, rejection_reason,
       is_edited, edited_at, edited_by, edit_reason, cancelled_at,
       cancelled_by, cancellation_reason, notes, created_by, created_at,
       updated_at
FROM leave_requests
"#;

const INSERT_REQUEST: &str = r#"
INSERT INTO leave_requests
    (request_number, employee_id, leave_type_id, start_date, end_date,
     total_days, is_half_day, half_day_segment, reason, approver_id,
     hr_approver_id, requires_hr_approval, status, notes, created_by,
     created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_REQUEST: &str = r#"
UPDATE leave_requests
SET leave_type_id = ?, start_date = ?, end_date = ?, total_days = ?,
    is_half_day = ?, half_day_segment = ?, reason = ?, status = ?,
    manager_approved_at = ?, manager_notes = ?, hr_approved_at = ?,
    hr_notes = ?, rejected_at = ?, rejection_reason = ?, is_edited = ?,
    edited_at = ?, edited_by = ?, edit_reason = ?, cancelled_at = ?,
    cancelled_by = ?, cancellation_reason = ?, notes = ?, updated_at = ?
WHERE id = ?
"#;

const INSERT_STEP: &str = r#"
INSERT INTO leave_approval_steps
    (leave_request_id, level, approver_id, status, acted_at, notes,
     rejection_reason, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_STEP: &str = r#"
UPDATE leave_approval_steps
SET status = ?, acted_at = ?, notes = ?, rejection_reason = ?
WHERE id = ?
"#;

const INSERT_BALANCE: &str = r#"
INSERT INTO leave_balances
    (employee_id, leave_type_id, year, entitlement_days, used_days,
     remaining_days, carry_over_days, expired_days, pending_days,
     last_calculated_at, version)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
"#;

const UPDATE_BALANCE: &str = r#"
UPDATE leave_balances
SET entitlement_days = ?, used_days = ?, remaining_days = ?,
    carry_over_days = ?, expired_days = ?, pending_days = ?,
    last_calculated_at = ?, version = version + 1
WHERE employee_id = ? AND leave_type_id = ? AND year = ? AND version = ?
"#;

const INSERT_HISTORY: &str = r#"
INSERT INTO leave_edit_history
    (leave_request_id, edited_by, edited_at, edit_reason, old_values,
     new_values, changed_fields)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[derive(sqlx::FromRow)]
struct EmployeeRow {
    id: u64,
    is_active: bool,
    manager_id: Option<u64>,
}

#[derive(sqlx::FromRow)]
struct LeaveRequestRow {
    id: u64,
    request_number: String,
    employee_id: u64,
    leave_type_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_days: Decimal,
    is_half_day: bool,
    half_day_segment: Option<String>,
    reason: Option<String>,
    approver_id: Option<u64>,
    hr_approver_id: Option<u64>,
    requires_hr_approval: bool,
    status: String,
    manager_approved_at: Option<DateTime<Utc>>,
    manager_notes: Option<String>,
    hr_approved_at: Option<DateTime<Utc>>,
    hr_notes: Option<String>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    edited_by: Option<u64>,
    edit_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<u64>,
    cancellation_reason: Option<String>,
    notes: Option<String>,
    created_by: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LeaveRequestRow {
    fn into_request(self) -> Result<LeaveRequest, StoreError> {
        Ok(LeaveRequest {
            id: self.id,
            request_number: self.request_number,
            employee_id: self.employee_id,
            leave_type_id: self.leave_type_id,
            start_date: self.start_date,
            end_date: self.end_date,
            total_days: self.total_days,
            is_half_day: self.is_half_day,
            half_day_segment: self
                .half_day_segment
                .as_deref()
                .map(parse_enum("half_day_segment"))
                .transpose()?,
            reason: self.reason,
            approver_id: self.approver_id,
            hr_approver_id: self.hr_approver_id,
            requires_hr_approval: self.requires_hr_approval,
            status: parse_enum("status")(&self.status)?,
            manager_approved_at: self.manager_approved_at,
            manager_notes: self.manager_notes,
            hr_approved_at: self.hr_approved_at,
            hr_notes: self.hr_notes,
            rejected_at: self.rejected_at,
            rejection_reason: self.rejection_reason,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            edited_by: self.edited_by,
            edit_reason: self.edit_reason,
            cancelled_at: self.cancelled_at,
            cancelled_by: self.cancelled_by,
            cancellation_reason: self.cancellation_reason,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalStepRow {
    id: u64,
    leave_request_id: u64,
    level: String,
    approver_id: Option<u64>,
    status: String,
    acted_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl ApprovalStepRow {
    fn into_step(self) -> Result<ApprovalStep, StoreError> {
        Ok(ApprovalStep {
            id: self.id,
            leave_request_id: self.leave_request_id,
            level: parse_enum("level")(&self.level)?,
            approver_id: self.approver_id,
            status: parse_enum("status")(&self.status)?,
            acted_at: self.acted_at,
            notes: self.notes,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EditHistoryRow {
    id: u64,
    leave_request_id: u64,
    edited_by: u64,
    edited_at: DateTime<Utc>,
    edit_reason: Option<String>,
    old_values: String,
    new_values: String,
    changed_fields: String,
}

impl EditHistoryRow {
    fn into_entry(self) -> Result<EditHistoryEntry, StoreError> {
        Ok(EditHistoryEntry {
            id: self.id,
            leave_request_id: self.leave_request_id,
            edited_by: self.edited_by,
            edited_at: self.edited_at,
            edit_reason: self.edit_reason,
            old_values: parse_json("old_values", &self.old_values)?,
            new_values: parse_json("new_values", &self.new_values)?,
            changed_fields: serde_json::from_str(&self.changed_fields)
                .map_err(|e| StoreError::Corrupt(format!("changed_fields: {e}")))?,
        })
    }
}

fn parse_enum<T: std::str::FromStr>(field: &'static str) -> impl Fn(&str) -> Result<T, StoreError> {
    move |value| {
        value
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("unknown {field} value '{value}'")))
    }
}

fn parse_json(field: &'static str, raw: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{field}: {e}")))
}

/// MySQL reports unique-key violations as SQLSTATE 23000.
fn is_duplicate_key(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23000"))
}

impl MySqlLeaveStore {
    /// Guarded write of one balance row. The version the row was read at
    /// must still match; otherwise another transaction got there first and
    /// the caller re-reads and retries.
    async fn write_balance<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::MySql>,
        balance: &LeaveBalance,
    ) -> Result<(), StoreError> {
        let stale = || StoreError::StaleBalance {
            employee_id: balance.employee_id,
            leave_type_id: balance.leave_type_id,
            year: balance.year,
        };
        if balance.id == 0 {
            // First write for the triple. The unique key on it catches a
            // concurrent lazy creation.
            let result = sqlx::query(INSERT_BALANCE)
                .bind(balance.employee_id)
                .bind(balance.leave_type_id)
                .bind(balance.year)
                .bind(balance.entitlement_days)
                .bind(balance.used_days)
                .bind(balance.remaining_days)
                .bind(balance.carry_over_days)
                .bind(balance.expired_days)
                .bind(balance.pending_days)
                .bind(balance.last_calculated_at)
                .execute(&mut **tx)
                .await;
            return match result {
                Ok(_) => Ok(()),
                Err(e) if is_duplicate_key(&e) => Err(stale()),
                Err(e) => Err(e.into()),
            };
        }
        let result = sqlx::query(UPDATE_BALANCE)
            .bind(balance.entitlement_days)
            .bind(balance.used_days)
            .bind(balance.remaining_days)
            .bind(balance.carry_over_days)
            .bind(balance.expired_days)
            .bind(balance.pending_days)
            .bind(balance.last_calculated_at)
            .bind(balance.employee_id)
            .bind(balance.leave_type_id)
            .bind(balance.year)
            .bind(balance.version)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(stale());
        }
        Ok(())
    }
}

impl LeaveStore for MySqlLeaveStore {
    async fn employee_ref(&self, id: u64) -> Result<Option<EmployeeRef>, StoreError> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, is_active, manager_id FROM employees WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| EmployeeRef {
            id: r.id,
            is_active: r.is_active,
            manager_id: r.manager_id,
        }))
    }

    async fn request_by_id(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        let row =
            sqlx::query_as::<_, LeaveRequestRow>(&format!("{SELECT_REQUEST} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(LeaveRequestRow::into_request).transpose()
    }

    async fn requests_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&format!(
            "{SELECT_REQUEST} WHERE employee_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(LeaveRequestRow::into_request)
            .collect()
    }

    async fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, StoreError> {
        let rows = sqlx::query_as::<_, ApprovalStepRow>(
            r#"
            SELECT id, leave_request_id, level, approver_id, status, acted_at,
                   notes, rejection_reason, created_at
            FROM leave_approval_steps
            WHERE leave_request_id = ?
            ORDER BY id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ApprovalStepRow::into_step).collect()
    }

    async fn history_for_request(
        &self,
        request_id: u64,
    ) -> Result<Vec<EditHistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, EditHistoryRow>(
            r#"
            SELECT id, leave_request_id, edited_by, edited_at, edit_reason,
                   old_values, new_values, changed_fields
            FROM leave_edit_history
            WHERE leave_request_id = ?
            ORDER BY id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EditHistoryRow::into_entry).collect()
    }

    async fn balance_row(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        let row = sqlx::query_as::<_, LeaveBalance>(
            r#"
            SELECT id, employee_id, leave_type_id, year, entitlement_days,
                   used_days, remaining_days, carry_over_days, expired_days,
                   pending_days, last_calculated_at, version
            FROM leave_balances
            WHERE employee_id = ? AND leave_type_id = ? AND year = ?
            "#,
        )
        .bind(employee_id)
        .bind(leave_type_id)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn max_sequence(&self, year: i32) -> Result<u32, StoreError> {
        // Numbers are fixed width, so MAX() under the year prefix is the
        // numerically highest one.
        let max: Option<String> = sqlx::query_scalar(
            "SELECT MAX(request_number) FROM leave_requests WHERE request_number LIKE ?",
        )
        .bind(format!("{}%", numbering::year_prefix(year)))
        .fetch_one(&self.pool)
        .await?;
        Ok(max
            .as_deref()
            .and_then(|n| numbering::sequence_of(n, year))
            .unwrap_or(0))
    }

    async fn insert_unit(&self, unit: LeaveUnit) -> Result<LeaveRequest, StoreError> {
        let mut request = unit.request;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(INSERT_REQUEST)
            .bind(&request.request_number)
            .bind(request.employee_id)
            .bind(request.leave_type_id)
            .bind(request.start_date)
            .bind(request.end_date)
            .bind(request.total_days)
            .bind(request.is_half_day)
            .bind(request.half_day_segment.map(|s| s.to_string()))
            .bind(request.reason.as_deref())
            .bind(request.approver_id)
            .bind(request.hr_approver_id)
            .bind(request.requires_hr_approval)
            .bind(request.status.to_string())
            .bind(request.notes.as_deref())
            .bind(request.created_by)
            .bind(request.created_at)
            .bind(request.updated_at)
            .execute(&mut *tx)
            .await;
        let result = match result {
            Ok(r) => r,
            Err(e) if is_duplicate_key(&e) => {
                return Err(StoreError::DuplicateRequestNumber(request.request_number));
            }
            Err(e) => return Err(e.into()),
        };
        request.id = result.last_insert_id();

        for step in &unit.steps {
            sqlx::query(INSERT_STEP)
                .bind(request.id)
                .bind(step.level.to_string())
                .bind(step.approver_id)
                .bind(step.status.to_string())
                .bind(step.acted_at)
                .bind(step.notes.as_deref())
                .bind(step.rejection_reason.as_deref())
                .bind(step.created_at)
                .execute(&mut *tx)
                .await?;
        }

        for balance in &unit.balances {
            Self::write_balance(&mut tx, balance).await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    async fn update_unit(&self, unit: LeaveUnit) -> Result<(), StoreError> {
        let request = &unit.request;
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPDATE_REQUEST)
            .bind(request.leave_type_id)
            .bind(request.start_date)
            .bind(request.end_date)
            .bind(request.total_days)
            .bind(request.is_half_day)
            .bind(request.half_day_segment.map(|s| s.to_string()))
            .bind(request.reason.as_deref())
            .bind(request.status.to_string())
            .bind(request.manager_approved_at)
            .bind(request.manager_notes.as_deref())
            .bind(request.hr_approved_at)
            .bind(request.hr_notes.as_deref())
            .bind(request.rejected_at)
            .bind(request.rejection_reason.as_deref())
            .bind(request.is_edited)
            .bind(request.edited_at)
            .bind(request.edited_by)
            .bind(request.edit_reason.as_deref())
            .bind(request.cancelled_at)
            .bind(request.cancelled_by)
            .bind(request.cancellation_reason.as_deref())
            .bind(request.notes.as_deref())
            .bind(request.updated_at)
            .bind(request.id)
            .execute(&mut *tx)
            .await?;

        for step in &unit.steps {
            sqlx::query(UPDATE_STEP)
                .bind(step.status.to_string())
                .bind(step.acted_at)
                .bind(step.notes.as_deref())
                .bind(step.rejection_reason.as_deref())
                .bind(step.id)
                .execute(&mut *tx)
                .await?;
        }

        for balance in &unit.balances {
            Self::write_balance(&mut tx, balance).await?;
        }

        if let Some(entry) = &unit.history {
            sqlx::query(INSERT_HISTORY)
                .bind(entry.leave_request_id)
                .bind(entry.edited_by)
                .bind(entry.edited_at)
                .bind(entry.edit_reason.as_deref())
                .bind(entry.old_values.to_string())
                .bind(entry.new_values.to_string())
                .bind(
                    serde_json::to_string(&entry.changed_fields)
                        .unwrap_or_else(|_| "[]".to_string()),
                )
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
