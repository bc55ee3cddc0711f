//! Leave-request lifecycle.
//!
//! The orchestrator behind the endpoints: validates, drives the status
//! state machine, and coordinates the ledger, the approval chain and the
//! edit history. All validation happens before anything is written; the
//! changed records then go to the store as one unit of work.
//!
//! Operations on the same balance triple are serialized optimistically:
//! the store refuses a unit whose balance version moved since the read,
//! and the operation re-reads and retries up to `WRITE_ATTEMPTS` times.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{LeaveError, StoreError};
use crate::leave::chain::ApprovalChain;
use crate::leave::history::{EditHistoryRecorder, FieldSnapshot};
use crate::leave::ledger::BalanceLedger;
use crate::leave::numbering;
use crate::model::approval::{ApprovalLevel, ApprovalStatus, ApprovalStep};
use crate::model::edit_history::EditHistoryEntry;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_request::{HalfDaySegment, LeaveRequest, LeaveStatus};
use crate::store::{LeaveStore, LeaveUnit};

/// Attempts at a contended write before giving up. A request number taken
/// by a concurrent create, or a balance row that moved under an operation,
/// gets a re-read and another try.
const WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_half_day: bool,
    pub half_day_segment: Option<HalfDaySegment>,
    pub reason: Option<String>,
    pub requires_hr_approval: bool,
    /// Resolved by the caller; required when `requires_hr_approval`.
    pub hr_approver_id: Option<u64>,
    pub notes: Option<String>,
}

/// Fields an edit may change. Absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct LeavePatch {
    pub leave_type_id: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_half_day: Option<bool>,
    pub half_day_segment: Option<HalfDaySegment>,
    pub reason: Option<String>,
    pub edit_reason: Option<String>,
}

pub struct LeaveService<S> {
    store: S,
}

impl<S: LeaveStore> LeaveService<S> {
    pub fn new(store: S) -> Self {
        LeaveService { store }
    }

    pub async fn create(
        &self,
        input: NewLeaveRequest,
        actor_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let employee = self
            .store
            .employee_ref(input.employee_id)
            .await?
            .ok_or_else(|| {
                LeaveError::NotFound(format!("employee {} not found", input.employee_id))
            })?;
        if !employee.is_active {
            return Err(LeaveError::InvalidState(format!(
                "employee {} is not active",
                employee.id
            )));
        }

        let total_days =
            compute_total_days(input.start_date, input.end_date, input.is_half_day)?;
        if input.is_half_day && input.half_day_segment.is_none() {
            return Err(LeaveError::InvalidInput(
                "a half-day request must name its segment (morning or afternoon)".into(),
            ));
        }
        if input.requires_hr_approval && input.hr_approver_id.is_none() {
            return Err(LeaveError::InvalidInput(
                "an HR approver must be assigned when HR approval is required".into(),
            ));
        }

        let year = input.start_date.year();
        let now = Utc::now();

        // The balance and the sequence are re-read on every attempt, so a
        // retry works from what the losing write actually left behind.
        let mut conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            let stored = self
                .store
                .balance_row(input.employee_id, input.leave_type_id, year)
                .await?;
            ensure_available(stored.as_ref(), total_days)?;
            let mut balance = stored.unwrap_or_else(|| {
                LeaveBalance::open(input.employee_id, input.leave_type_id, year)
            });
            BalanceLedger::reserve(&mut balance, total_days, now);

            let sequence = self.store.max_sequence(year).await? + 1;
            let request = build_request(&input, &employee, total_days, sequence, actor_id, now);
            let steps = ApprovalChain::build(&request, now);
            let unit = LeaveUnit {
                request,
                balances: vec![balance],
                steps,
                history: None,
            };
            match self.store.insert_unit(unit).await {
                Ok(stored) => {
                    tracing::info!(
                        request_number = %stored.request_number,
                        employee_id = stored.employee_id,
                        total_days = %stored.total_days,
                        "leave request created"
                    );
                    return Ok(stored);
                }
                Err(
                    e @ (StoreError::DuplicateRequestNumber(_) | StoreError::StaleBalance { .. }),
                ) => {
                    tracing::warn!(error = %e, "contended create, retrying");
                    conflict = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(retries_exhausted(conflict))
    }

    pub async fn update(
        &self,
        id: u64,
        patch: LeavePatch,
        actor_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            match self.try_update(id, patch.clone(), actor_id).await {
                Err(LeaveError::Storage(e @ StoreError::StaleBalance { .. })) => {
                    tracing::warn!(error = %e, "balance row moved during edit, retrying");
                    conflict = Some(e);
                }
                outcome => return outcome,
            }
        }
        Err(retries_exhausted(conflict))
    }

    async fn try_update(
        &self,
        id: u64,
        patch: LeavePatch,
        actor_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut request = self.require_request(id).await?;
        if !matches!(request.status, LeaveStatus::Pending | LeaveStatus::Approved) {
            return Err(LeaveError::InvalidState(format!(
                "cannot update a {} request",
                request.status
            )));
        }

        let before = FieldSnapshot::capture(&request);
        let old_total = request.total_days;
        let old_type = request.leave_type_id;
        let old_year = request.balance_year();

        if let Some(leave_type_id) = patch.leave_type_id {
            request.leave_type_id = leave_type_id;
        }
        if let Some(start_date) = patch.start_date {
            request.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            request.end_date = end_date;
        }
        if let Some(is_half_day) = patch.is_half_day {
            request.is_half_day = is_half_day;
        }
        if let Some(segment) = patch.half_day_segment {
            request.half_day_segment = Some(segment);
        }
        if !request.is_half_day {
            request.half_day_segment = None;
        }
        if let Some(reason) = patch.reason {
            request.reason = Some(reason);
        }

        request.total_days =
            compute_total_days(request.start_date, request.end_date, request.is_half_day)?;
        if request.is_half_day && request.half_day_segment.is_none() {
            return Err(LeaveError::InvalidInput(
                "a half-day request must name its segment (morning or afternoon)".into(),
            ));
        }

        let after = FieldSnapshot::capture(&request);
        if before.changed_fields(&after).is_empty() {
            return Ok(request);
        }

        let now = Utc::now();
        let from_used = request.status == LeaveStatus::Approved;
        let balances = self
            .rebook(&request, old_type, old_year, old_total, from_used, now)
            .await?;

        request.is_edited = true;
        request.edited_at = Some(now);
        request.edited_by = Some(actor_id);
        request.edit_reason = patch.edit_reason.clone();
        request.updated_at = now;

        let history = EditHistoryRecorder::record(
            request.id,
            &before,
            &after,
            actor_id,
            patch.edit_reason,
            now,
        );
        self.persist_change(&request, balances, Vec::new(), history)
            .await?;

        tracing::info!(
            request_number = %request.request_number,
            edited_by = actor_id,
            "leave request edited"
        );
        Ok(request)
    }

    pub async fn approve(
        &self,
        id: u64,
        level: ApprovalLevel,
        approver_id: u64,
        notes: Option<String>,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            match self.try_approve(id, level, approver_id, notes.clone()).await {
                Err(LeaveError::Storage(e @ StoreError::StaleBalance { .. })) => {
                    tracing::warn!(error = %e, "balance row moved during approval, retrying");
                    conflict = Some(e);
                }
                outcome => return outcome,
            }
        }
        Err(retries_exhausted(conflict))
    }

    async fn try_approve(
        &self,
        id: u64,
        level: ApprovalLevel,
        approver_id: u64,
        notes: Option<String>,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut request = self.require_request(id).await?;
        let mut chain = self.actionable_chain(&request, level, approver_id).await?;

        let now = Utc::now();
        let step = chain
            .step_mut(level)
            .ok_or_else(|| LeaveError::NotFound(format!("no {level} approval step for request {id}")))?;
        ensure_step_pending(step)?;
        step.approve(now, notes.clone());
        let step_row = step.clone();

        match level {
            ApprovalLevel::Manager => {
                request.manager_approved_at = Some(now);
                request.manager_notes = notes;
            }
            ApprovalLevel::HrManager => {
                request.hr_approved_at = Some(now);
                request.hr_notes = notes;
            }
        }

        let mut balances = Vec::new();
        if chain.is_complete() {
            request.status = LeaveStatus::Approved;
            if let Some(mut balance) = self.request_balance(&request).await? {
                BalanceLedger::commit(&mut balance, request.total_days, now);
                balances.push(balance);
            }
        }
        request.updated_at = now;

        self.persist_change(&request, balances, vec![step_row], None)
            .await?;

        tracing::info!(
            request_number = %request.request_number,
            %level,
            approver_id,
            status = %request.status,
            "leave request approval recorded"
        );
        Ok(request)
    }

    pub async fn reject(
        &self,
        id: u64,
        level: ApprovalLevel,
        rejector_id: u64,
        reason: String,
        notes: Option<String>,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            match self
                .try_reject(id, level, rejector_id, reason.clone(), notes.clone())
                .await
            {
                Err(LeaveError::Storage(e @ StoreError::StaleBalance { .. })) => {
                    tracing::warn!(error = %e, "balance row moved during rejection, retrying");
                    conflict = Some(e);
                }
                outcome => return outcome,
            }
        }
        Err(retries_exhausted(conflict))
    }

    async fn try_reject(
        &self,
        id: u64,
        level: ApprovalLevel,
        rejector_id: u64,
        reason: String,
        notes: Option<String>,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut request = self.require_request(id).await?;
        let mut chain = self.actionable_chain(&request, level, rejector_id).await?;

        let now = Utc::now();
        let step = chain
            .step_mut(level)
            .ok_or_else(|| LeaveError::NotFound(format!("no {level} approval step for request {id}")))?;
        ensure_step_pending(step)?;
        step.reject(now, reason.clone(), notes);
        let step_row = step.clone();

        request.status = LeaveStatus::Rejected;
        request.rejected_at = Some(now);
        request.rejection_reason = Some(reason);
        request.updated_at = now;

        let mut balances = Vec::new();
        if let Some(mut balance) = self.request_balance(&request).await? {
            BalanceLedger::release(&mut balance, request.total_days, false, now);
            balances.push(balance);
        }

        self.persist_change(&request, balances, vec![step_row], None)
            .await?;

        tracing::info!(
            request_number = %request.request_number,
            %level,
            rejector_id,
            "leave request rejected"
        );
        Ok(request)
    }

    /// A cancel that loses a race against an approve retries and sees the
    /// approved request, so the release correctly comes out of `used_days`.
    pub async fn cancel(
        &self,
        id: u64,
        reason: String,
        actor_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut conflict = None;
        for _ in 0..WRITE_ATTEMPTS {
            match self.try_cancel(id, reason.clone(), actor_id).await {
                Err(LeaveError::Storage(e @ StoreError::StaleBalance { .. })) => {
                    tracing::warn!(error = %e, "balance row moved during cancellation, retrying");
                    conflict = Some(e);
                }
                outcome => return outcome,
            }
        }
        Err(retries_exhausted(conflict))
    }

    async fn try_cancel(
        &self,
        id: u64,
        reason: String,
        actor_id: u64,
    ) -> Result<LeaveRequest, LeaveError> {
        let mut request = self.require_request(id).await?;
        if !matches!(request.status, LeaveStatus::Pending | LeaveStatus::Approved) {
            return Err(LeaveError::InvalidState(format!(
                "cannot cancel a {} request",
                request.status
            )));
        }

        let now = Utc::now();
        let from_used = request.status == LeaveStatus::Approved;
        request.status = LeaveStatus::Cancelled;
        request.cancelled_at = Some(now);
        request.cancelled_by = Some(actor_id);
        request.cancellation_reason = Some(reason);
        request.updated_at = now;

        let mut balances = Vec::new();
        if let Some(mut balance) = self.request_balance(&request).await? {
            BalanceLedger::release(&mut balance, request.total_days, from_used, now);
            balances.push(balance);
        }

        self.persist_change(&request, balances, Vec::new(), None)
            .await?;

        tracing::info!(
            request_number = %request.request_number,
            cancelled_by = actor_id,
            "leave request cancelled"
        );
        Ok(request)
    }

    pub async fn get_by_id(&self, id: u64) -> Result<LeaveRequest, LeaveError> {
        self.require_request(id).await
    }

    pub async fn find_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, LeaveError> {
        Ok(self.store.requests_by_employee(employee_id).await?)
    }

    pub async fn get_balance(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, LeaveError> {
        Ok(self
            .store
            .balance_row(employee_id, leave_type_id, year)
            .await?)
    }

    pub async fn steps_of(&self, id: u64) -> Result<Vec<ApprovalStep>, LeaveError> {
        self.require_request(id).await?;
        Ok(self.store.steps_for_request(id).await?)
    }

    pub async fn history_of(&self, id: u64) -> Result<Vec<EditHistoryEntry>, LeaveError> {
        self.require_request(id).await?;
        Ok(self.store.history_for_request(id).await?)
    }

    async fn require_request(&self, id: u64) -> Result<LeaveRequest, LeaveError> {
        self.store
            .request_by_id(id)
            .await?
            .ok_or_else(|| LeaveError::NotFound(format!("leave request {id} not found")))
    }

    /// Shared precondition of approve/reject: the request is still
    /// pending and the actor is the recorded approver for the level.
    async fn actionable_chain(
        &self,
        request: &LeaveRequest,
        level: ApprovalLevel,
        actor_id: u64,
    ) -> Result<ApprovalChain, LeaveError> {
        if request.status != LeaveStatus::Pending {
            return Err(LeaveError::InvalidState(format!(
                "cannot act on a {} request",
                request.status
            )));
        }
        let recorded = match level {
            ApprovalLevel::Manager => request.approver_id,
            ApprovalLevel::HrManager => request.hr_approver_id,
        };
        if recorded != Some(actor_id) {
            return Err(LeaveError::Forbidden(format!(
                "employee {actor_id} is not the recorded {level} approver"
            )));
        }
        let steps = self.store.steps_for_request(request.id).await?;
        Ok(ApprovalChain::new(steps))
    }

    async fn request_balance(
        &self,
        request: &LeaveRequest,
    ) -> Result<Option<LeaveBalance>, LeaveError> {
        Ok(self
            .store
            .balance_row(
                request.employee_id,
                request.leave_type_id,
                request.balance_year(),
            )
            .await?)
    }

    /// Ledger side of an edit: release the old amount from the old triple
    /// and re-reserve the new amount on the (possibly different) new one.
    async fn rebook(
        &self,
        request: &LeaveRequest,
        old_type: u64,
        old_year: i32,
        old_total: Decimal,
        from_used: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaveBalance>, LeaveError> {
        let new_type = request.leave_type_id;
        let new_year = request.balance_year();
        let new_total = request.total_days;
        let old_row = self
            .store
            .balance_row(request.employee_id, old_type, old_year)
            .await?;

        let mut balances = Vec::new();
        if (old_type, old_year) == (new_type, new_year) {
            match old_row {
                Some(mut balance) => {
                    BalanceLedger::release(&mut balance, old_total, from_used, now);
                    ensure_available(Some(&balance), new_total)?;
                    BalanceLedger::reserve(&mut balance, new_total, now);
                    balances.push(balance);
                }
                None => {
                    let mut balance =
                        LeaveBalance::open(request.employee_id, new_type, new_year);
                    BalanceLedger::reserve(&mut balance, new_total, now);
                    balances.push(balance);
                }
            }
        } else {
            let new_row = self
                .store
                .balance_row(request.employee_id, new_type, new_year)
                .await?;
            ensure_available(new_row.as_ref(), new_total)?;
            if let Some(mut balance) = old_row {
                BalanceLedger::release(&mut balance, old_total, from_used, now);
                balances.push(balance);
            }
            let mut balance = new_row
                .unwrap_or_else(|| LeaveBalance::open(request.employee_id, new_type, new_year));
            BalanceLedger::reserve(&mut balance, new_total, now);
            balances.push(balance);
        }
        Ok(balances)
    }

    async fn persist_change(
        &self,
        request: &LeaveRequest,
        balances: Vec<LeaveBalance>,
        steps: Vec<ApprovalStep>,
        history: Option<EditHistoryEntry>,
    ) -> Result<(), LeaveError> {
        self.store
            .update_unit(LeaveUnit {
                request: request.clone(),
                balances,
                steps,
                history,
            })
            .await?;
        Ok(())
    }
}

/// Half-day requests count 0.5 and must start and end on the same day;
/// full-day requests count both endpoints inclusively.
fn compute_total_days(
    start_date: NaiveDate,
    end_date: NaiveDate,
    is_half_day: bool,
) -> Result<Decimal, LeaveError> {
    if end_date < start_date {
        return Err(LeaveError::InvalidInput(
            "end_date cannot be before start_date".into(),
        ));
    }
    if is_half_day {
        if start_date != end_date {
            return Err(LeaveError::InvalidInput(
                "a half-day request must start and end on the same day".into(),
            ));
        }
        return Ok(dec!(0.5));
    }
    Ok(Decimal::from((end_date - start_date).num_days() + 1))
}

fn ensure_available(balance: Option<&LeaveBalance>, needed: Decimal) -> Result<(), LeaveError> {
    match BalanceLedger::available_days(balance) {
        Some(available) if available < needed => Err(LeaveError::InvalidState(format!(
            "insufficient leave balance: {available} available, {needed} requested"
        ))),
        _ => Ok(()),
    }
}

fn retries_exhausted(conflict: Option<StoreError>) -> LeaveError {
    LeaveError::Storage(conflict.unwrap_or_else(|| {
        StoreError::Corrupt("contended write retries exhausted".into())
    }))
}

fn ensure_step_pending(step: &ApprovalStep) -> Result<(), LeaveError> {
    if step.status != ApprovalStatus::Pending {
        return Err(LeaveError::InvalidState(format!(
            "{} step is already {}",
            step.level, step.status
        )));
    }
    Ok(())
}

fn build_request(
    input: &NewLeaveRequest,
    employee: &crate::model::employee::EmployeeRef,
    total_days: Decimal,
    sequence: u32,
    actor_id: u64,
    now: DateTime<Utc>,
) -> LeaveRequest {
    LeaveRequest {
        id: 0,
        request_number: numbering::format_request_number(input.start_date.year(), sequence),
        employee_id: input.employee_id,
        leave_type_id: input.leave_type_id,
        start_date: input.start_date,
        end_date: input.end_date,
        total_days,
        is_half_day: input.is_half_day,
        half_day_segment: input.half_day_segment,
        reason: input.reason.clone(),
        approver_id: employee.manager_id,
        hr_approver_id: input.hr_approver_id,
        requires_hr_approval: input.requires_hr_approval,
        status: LeaveStatus::Pending,
        manager_approved_at: None,
        manager_notes: None,
        hr_approved_at: None,
        hr_notes: None,
        rejected_at: None,
        rejection_reason: None,
        is_edited: false,
        edited_at: None,
        edited_by: None,
        edit_reason: None,
        cancelled_at: None,
        cancelled_by: None,
        cancellation_reason: None,
        notes: input.notes.clone(),
        created_by: actor_id,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn full_day_count_includes_both_endpoints() {
        let total = compute_total_days(date(2024, 1, 10), date(2024, 1, 12), false).unwrap();
        assert_eq!(total, dec!(3));
    }

    #[test]
    fn single_day_counts_one() {
        let total = compute_total_days(date(2024, 1, 10), date(2024, 1, 10), false).unwrap();
        assert_eq!(total, dec!(1));
    }

    #[test]
    fn half_day_counts_half() {
        let total = compute_total_days(date(2024, 2, 1), date(2024, 2, 1), true).unwrap();
        assert_eq!(total, dec!(0.5));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = compute_total_days(date(2024, 1, 12), date(2024, 1, 10), false).unwrap_err();
        assert!(matches!(err, LeaveError::InvalidInput(_)));
    }

    #[test]
    fn half_day_spanning_days_is_rejected() {
        let err = compute_total_days(date(2024, 2, 1), date(2024, 2, 2), true).unwrap_err();
        assert!(matches!(err, LeaveError::InvalidInput(_)));
    }
}
