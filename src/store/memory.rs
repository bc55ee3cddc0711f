//! In-memory `LeaveStore`, used by the test suite and for running the
//! service without a database. A single mutex serializes every unit of
//! work, which is exactly the atomicity the trait asks for.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::leave::numbering;
use crate::model::approval::ApprovalStep;
use crate::model::edit_history::EditHistoryEntry;
use crate::model::employee::EmployeeRef;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_request::LeaveRequest;

use super::{LeaveStore, LeaveUnit};

#[derive(Default)]
struct Inner {
    employees: HashMap<u64, EmployeeRef>,
    requests: HashMap<u64, LeaveRequest>,
    steps: Vec<ApprovalStep>,
    balances: HashMap<(u64, u64, i32), LeaveBalance>,
    history: Vec<EditHistoryEntry>,
    next_request_id: u64,
    next_step_id: u64,
    next_balance_id: u64,
    next_history_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_employee(&self, employee: EmployeeRef) {
        let mut inner = self.inner.lock().unwrap();
        inner.employees.insert(employee.id, employee);
    }

    pub fn seed_balance(&self, mut balance: LeaveBalance) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_balance_id += 1;
        balance.id = inner.next_balance_id;
        inner.balances.insert(
            (balance.employee_id, balance.leave_type_id, balance.year),
            balance,
        );
    }

    /// Versions are validated for every row before anything is written, so
    /// a conflict leaves the whole unit unapplied.
    fn store_balances(inner: &mut Inner, balances: Vec<LeaveBalance>) -> Result<(), StoreError> {
        for balance in &balances {
            let key = (balance.employee_id, balance.leave_type_id, balance.year);
            let current = inner.balances.get(&key).map(|b| b.version).unwrap_or(0);
            if balance.version != current {
                return Err(StoreError::StaleBalance {
                    employee_id: balance.employee_id,
                    leave_type_id: balance.leave_type_id,
                    year: balance.year,
                });
            }
        }
        for mut balance in balances {
            let key = (balance.employee_id, balance.leave_type_id, balance.year);
            if balance.id == 0 {
                inner.next_balance_id += 1;
                balance.id = inner.next_balance_id;
            }
            balance.version += 1;
            inner.balances.insert(key, balance);
        }
        Ok(())
    }
}

impl LeaveStore for MemoryStore {
    async fn employee_ref(&self, id: u64) -> Result<Option<EmployeeRef>, StoreError> {
        Ok(self.inner.lock().unwrap().employees.get(&id).cloned())
    }

    async fn request_by_id(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.inner.lock().unwrap().requests.get(&id).cloned())
    }

    async fn requests_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut requests: Vec<_> = inner
            .requests
            .values()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn steps_for_request(&self, request_id: u64) -> Result<Vec<ApprovalStep>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .steps
            .iter()
            .filter(|s| s.leave_request_id == request_id)
            .cloned()
            .collect())
    }

    async fn history_for_request(
        &self,
        request_id: u64,
    ) -> Result<Vec<EditHistoryEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .history
            .iter()
            .filter(|h| h.leave_request_id == request_id)
            .cloned()
            .collect())
    }

    async fn balance_row(
        &self,
        employee_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .balances
            .get(&(employee_id, leave_type_id, year))
            .cloned())
    }

    async fn max_sequence(&self, year: i32) -> Result<u32, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .requests
            .values()
            .filter_map(|r| numbering::sequence_of(&r.request_number, year))
            .max()
            .unwrap_or(0))
    }

    async fn insert_unit(&self, unit: LeaveUnit) -> Result<LeaveRequest, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if inner
            .requests
            .values()
            .any(|r| r.request_number == unit.request.request_number)
        {
            return Err(StoreError::DuplicateRequestNumber(
                unit.request.request_number,
            ));
        }

        Self::store_balances(&mut inner, unit.balances)?;

        let mut request = unit.request;
        inner.next_request_id += 1;
        request.id = inner.next_request_id;

        for mut step in unit.steps {
            inner.next_step_id += 1;
            step.id = inner.next_step_id;
            step.leave_request_id = request.id;
            inner.steps.push(step);
        }

        inner.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update_unit(&self, unit: LeaveUnit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        Self::store_balances(&mut inner, unit.balances)?;

        for step in unit.steps {
            match inner.steps.iter_mut().find(|s| s.id == step.id) {
                Some(existing) => *existing = step,
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "approval step {} does not exist",
                        step.id
                    )));
                }
            }
        }

        if let Some(mut entry) = unit.history {
            inner.next_history_id += 1;
            entry.id = inner.next_history_id;
            inner.history.push(entry);
        }

        inner.requests.insert(unit.request.id, unit.request);
        Ok(())
    }
}
