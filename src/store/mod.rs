//! Storage boundary of the leave core.
//!
//! The service never talks to a database directly; it loads records,
//! decides, and hands the whole set of changed records back as one
//! `LeaveUnit`. Persisting a unit is the atomic boundary: a backend
//! either writes everything in it or nothing.

pub mod memory;
pub mod mysql;

use crate::error::StoreError;
use crate::model::approval::ApprovalStep;
use crate::model::edit_history::EditHistoryEntry;
use crate::model::employee::EmployeeRef;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_request::LeaveRequest;

/// Everything one lifecycle operation changed. A request edit that moves
/// days across balance triples carries both rows in `balances`.
///
/// Each balance row keeps the `version` it was read at. A backend refuses
/// the unit with `StoreError::StaleBalance` when the stored version has
/// moved since, so a concurrent write on the same triple is never lost;
/// the service re-reads and retries.
pub struct LeaveUnit {
    pub request: LeaveRequest,
    pub balances: Vec<LeaveBalance>,
    pub steps: Vec<ApprovalStep>,
    pub history: Option<EditHistoryEntry>,
}

#[allow(async_fn_in_trait)]
pub trait LeaveStore {
    async fn employee_ref(&self, id: u64) -> Result<Option<EmployeeRef>, StoreError>;

    async fn request_by_id(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError>;

    /// All requests of one employee, newest first.
    async fn requests_by_employee(&self, employee_id: u64)
    -> Result<Vec<LeaveRequest>, StoreError>;

    async fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, StoreError>;

    async fn history_for_request(
        &self,
        request_id: u64,
    ) -> Result<Vec<EditHistoryEntry>, StoreError>;

    async fn balance_row(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, StoreError>;

    /// Highest request-number sequence already allocated for `year`,
    /// zero when none.
    async fn max_sequence(&self, year: i32) -> Result<u32, StoreError>;

    /// Persist a brand-new request together with its steps and balance
    /// reservation. Returns the stored request with its assigned id.
    /// Fails with `DuplicateRequestNumber` when the number is taken and
    /// `StaleBalance` when a balance version no longer matches.
    async fn insert_unit(&self, unit: LeaveUnit) -> Result<LeaveRequest, StoreError>;

    /// Persist the changes of one lifecycle operation on an existing
    /// request as a single transaction. Fails with `StaleBalance` when a
    /// balance version no longer matches; nothing is applied then.
    async fn update_unit(&self, unit: LeaveUnit) -> Result<(), StoreError>;
}
