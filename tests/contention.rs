//! Contended writes against the in-memory store: operations racing on one
//! balance row, and request-number allocation losing to a concurrent
//! create. Store doubles delegate to `MemoryStore` and open a window
//! between read and write where the other side can slip in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use leavedesk::error::{LeaveError, StoreError};
use leavedesk::leave::ledger::BalanceLedger;
use leavedesk::leave::numbering;
use leavedesk::leave::service::{LeaveService, NewLeaveRequest};
use leavedesk::model::approval::{ApprovalLevel, ApprovalStep};
use leavedesk::model::edit_history::EditHistoryEntry;
use leavedesk::model::employee::EmployeeRef;
use leavedesk::model::leave_balance::LeaveBalance;
use leavedesk::model::leave_request::{LeaveRequest, LeaveStatus};
use leavedesk::store::memory::MemoryStore;
use leavedesk::store::{LeaveStore, LeaveUnit};

const EMPLOYEE: u64 = 1000;
const MANAGER: u64 = 42;
const ANNUAL: u64 = 1;
const YEAR: i32 = 2024;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seeded_store(entitlement: Decimal) -> MemoryStore {
    let store = MemoryStore::new();
    store.seed_employee(EmployeeRef {
        id: EMPLOYEE,
        is_active: true,
        manager_id: Some(MANAGER),
    });
    let mut balance = LeaveBalance::open(EMPLOYEE, ANNUAL, YEAR);
    balance.entitlement_days = entitlement;
    balance.recompute();
    store.seed_balance(balance);
    store
}

fn three_day_request() -> NewLeaveRequest {
    NewLeaveRequest {
        employee_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        start_date: date(2024, 1, 10),
        end_date: date(2024, 1, 12),
        is_half_day: false,
        half_day_segment: None,
        reason: Some("family trip".into()),
        requires_hr_approval: false,
        hr_approver_id: None,
        notes: None,
    }
}

fn pending_request(number: &str) -> LeaveRequest {
    let now = Utc::now();
    LeaveRequest {
        id: 0,
        request_number: number.into(),
        employee_id: EMPLOYEE,
        leave_type_id: ANNUAL,
        start_date: date(2024, 1, 10),
        end_date: date(2024, 1, 12),
        total_days: dec!(3),
        is_half_day: false,
        half_day_segment: None,
        reason: None,
        approver_id: Some(MANAGER),
        hr_approver_id: None,
        requires_hr_approval: false,
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
        notes: None,
        created_by: EMPLOYEE,
        created_at: now,
        updated_at: now,
    }
}

/// Yields to the runtime after every balance read, so a second task can
/// interleave its own read-modify-write on the same row.
struct YieldingStore {
    inner: MemoryStore,
}

impl LeaveStore for YieldingStore {
    async fn employee_ref(&self, id: u64) -> Result<Option<EmployeeRef>, StoreError> {
        self.inner.employee_ref(id).await
    }

    async fn request_by_id(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        self.inner.request_by_id(id).await
    }

    async fn requests_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        self.inner.requests_by_employee(employee_id).await
    }

    async fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, StoreError> {
        self.inner.steps_for_request(request_id).await
    }

    async fn history_for_request(
        &self,
        request_id: u64,
    ) -> Result<Vec<EditHistoryEntry>, StoreError> {
        self.inner.history_for_request(request_id).await
    }

    async fn balance_row(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        let row = self.inner.balance_row(employee_id, leave_type_id, year).await;
        actix_web::rt::task::yield_now().await;
        row
    }

    async fn max_sequence(&self, year: i32) -> Result<u32, StoreError> {
        self.inner.max_sequence(year).await
    }

    async fn insert_unit(&self, unit: LeaveUnit) -> Result<LeaveRequest, StoreError> {
        self.inner.insert_unit(unit).await
    }

    async fn update_unit(&self, unit: LeaveUnit) -> Result<(), StoreError> {
        self.inner.update_unit(unit).await
    }
}

/// Plays the part of another service instance that already claimed
/// `taken`: the first `stale_reads` sequence reads miss it, the way a max
/// read misses a row committed right after it.
struct ContendedNumberStore {
    inner: MemoryStore,
    taken: String,
    stale_reads: AtomicU32,
    insert_attempts: Arc<AtomicU32>,
}

impl LeaveStore for ContendedNumberStore {
    async fn employee_ref(&self, id: u64) -> Result<Option<EmployeeRef>, StoreError> {
        self.inner.employee_ref(id).await
    }

    async fn request_by_id(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        self.inner.request_by_id(id).await
    }

    async fn requests_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        self.inner.requests_by_employee(employee_id).await
    }

    async fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, StoreError> {
        self.inner.steps_for_request(request_id).await
    }

    async fn history_for_request(
        &self,
        request_id: u64,
    ) -> Result<Vec<EditHistoryEntry>, StoreError> {
        self.inner.history_for_request(request_id).await
    }

    async fn balance_row(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        self.inner.balance_row(employee_id, leave_type_id, year).await
    }

    async fn max_sequence(&self, year: i32) -> Result<u32, StoreError> {
        let base = self.inner.max_sequence(year).await?;
        if self.stale_reads.load(Ordering::SeqCst) > 0 {
            self.stale_reads.fetch_sub(1, Ordering::SeqCst);
            return Ok(base);
        }
        Ok(base.max(numbering::sequence_of(&self.taken, year).unwrap_or(0)))
    }

    async fn insert_unit(&self, unit: LeaveUnit) -> Result<LeaveRequest, StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if unit.request.request_number == self.taken {
            return Err(StoreError::DuplicateRequestNumber(
                unit.request.request_number,
            ));
        }
        self.inner.insert_unit(unit).await
    }

    async fn update_unit(&self, unit: LeaveUnit) -> Result<(), StoreError> {
        self.inner.update_unit(unit).await
    }
}

#[actix_web::test]
async fn a_write_from_a_stale_read_is_refused() {
    let store = seeded_store(dec!(12));
    let request = store
        .insert_unit(LeaveUnit {
            request: pending_request("LR-2024-000001"),
            balances: Vec::new(),
            steps: Vec::new(),
            history: None,
        })
        .await
        .unwrap();

    let first = store
        .balance_row(EMPLOYEE, ANNUAL, YEAR)
        .await
        .unwrap()
        .unwrap();
    let second = first.clone();

    let mut winner = first;
    BalanceLedger::reserve(&mut winner, dec!(3), Utc::now());
    store
        .update_unit(LeaveUnit {
            request: request.clone(),
            balances: vec![winner],
            steps: Vec::new(),
            history: None,
        })
        .await
        .unwrap();

    // derived from the same read, so the row has moved underneath it
    let mut loser = second;
    BalanceLedger::reserve(&mut loser, dec!(2), Utc::now());
    let err = store
        .update_unit(LeaveUnit {
            request,
            balances: vec![loser],
            steps: Vec::new(),
            history: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleBalance { .. }));

    // the refused unit left nothing behind
    let stored = store
        .balance_row(EMPLOYEE, ANNUAL, YEAR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.pending_days, dec!(3));
}

#[actix_web::test]
async fn concurrent_creates_on_one_balance_both_reserve() {
    let service = LeaveService::new(YieldingStore {
        inner: seeded_store(dec!(12)),
    });

    let (first, second) = futures::join!(
        service.create(three_day_request(), EMPLOYEE),
        service.create(three_day_request(), EMPLOYEE),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.request_number, second.request_number);

    let balance = service
        .get_balance(EMPLOYEE, ANNUAL, YEAR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.pending_days, dec!(6));
    assert_eq!(balance.remaining_days, dec!(6));
}

#[actix_web::test]
async fn a_cancel_racing_an_approve_still_releases_the_days() {
    let service = LeaveService::new(YieldingStore {
        inner: seeded_store(dec!(12)),
    });
    let request = service.create(three_day_request(), EMPLOYEE).await.unwrap();

    let (approved, cancelled) = futures::join!(
        service.approve(request.id, ApprovalLevel::Manager, MANAGER, None),
        service.cancel(request.id, "plans changed".into(), EMPLOYEE),
    );
    approved.unwrap();
    let cancelled = cancelled.unwrap();
    assert_eq!(cancelled.status, LeaveStatus::Cancelled);

    // the cancel saw the approval land first and released from used_days
    let balance = service
        .get_balance(EMPLOYEE, ANNUAL, YEAR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.used_days, Decimal::ZERO);
    assert_eq!(balance.pending_days, Decimal::ZERO);
    assert_eq!(balance.remaining_days, dec!(12));
}

#[actix_web::test]
async fn a_taken_number_is_retried_with_the_next_sequence() {
    let attempts = Arc::new(AtomicU32::new(0));
    let service = LeaveService::new(ContendedNumberStore {
        inner: seeded_store(dec!(12)),
        taken: "LR-2024-000001".into(),
        stale_reads: AtomicU32::new(1),
        insert_attempts: attempts.clone(),
    });

    let request = service.create(three_day_request(), EMPLOYEE).await.unwrap();

    assert_eq!(request.request_number, "LR-2024-000002");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn number_allocation_gives_up_after_bounded_attempts() {
    let attempts = Arc::new(AtomicU32::new(0));
    let service = LeaveService::new(ContendedNumberStore {
        inner: seeded_store(dec!(12)),
        taken: "LR-2024-000001".into(),
        // every sequence read stays stale, so every attempt collides
        stale_reads: AtomicU32::new(u32::MAX),
        insert_attempts: attempts.clone(),
    });

    let err = service
        .create(three_day_request(), EMPLOYEE)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LeaveError::Storage(StoreError::DuplicateRequestNumber(_))
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // nothing was reserved by the failed attempts
    let balance = service
        .get_balance(EMPLOYEE, ANNUAL, YEAR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.pending_days, Decimal::ZERO);
}
