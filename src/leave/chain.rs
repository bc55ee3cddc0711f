//! Approval chain bookkeeping for one leave request.
//!
//! A request carries one MANAGER step when a manager approver is assigned
//! and one HR_MANAGER step when it requires HR approval. The chain is
//! complete once every step is approved, and failed as soon as any step
//! is rejected.

use chrono::{DateTime, Utc};

use crate::model::approval::{ApprovalLevel, ApprovalStatus, ApprovalStep};
use crate::model::leave_request::LeaveRequest;

pub struct ApprovalChain {
    steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    pub fn new(steps: Vec<ApprovalStep>) -> Self {
        ApprovalChain { steps }
    }

    /// The initial pending steps a new request needs.
    pub fn build(request: &LeaveRequest, now: DateTime<Utc>) -> Vec<ApprovalStep> {
        let mut steps = Vec::new();
        if let Some(manager) = request.approver_id {
            steps.push(ApprovalStep::pending(
                ApprovalLevel::Manager,
                Some(manager),
                now,
            ));
        }
        if request.requires_hr_approval {
            steps.push(ApprovalStep::pending(
                ApprovalLevel::HrManager,
                request.hr_approver_id,
                now,
            ));
        }
        steps
    }

    pub fn step_mut(&mut self, level: ApprovalLevel) -> Option<&mut ApprovalStep> {
        self.steps.iter_mut().find(|s| s.level == level)
    }

    /// Every required step has been approved.
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.status == ApprovalStatus::Approved)
    }

    /// Any single rejection fails the whole chain, regardless of the
    /// other steps' state.
    pub fn is_failed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.status == ApprovalStatus::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn request(manager: Option<u64>, requires_hr: bool) -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: 1,
            request_number: "LR-2024-000001".into(),
            employee_id: 1000,
            leave_type_id: 1,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
            total_days: dec!(3),
            is_half_day: false,
            half_day_segment: None,
            reason: None,
            approver_id: manager,
            hr_approver_id: requires_hr.then_some(7),
            requires_hr_approval: requires_hr,
            status: crate::model::leave_request::LeaveStatus::Pending,
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
            created_by: 1000,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn manager_only_request_gets_one_step() {
        let steps = ApprovalChain::build(&request(Some(42), false), Utc::now());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].level, ApprovalLevel::Manager);
        assert_eq!(steps[0].approver_id, Some(42));
    }

    #[test]
    fn hr_request_gets_two_steps() {
        let steps = ApprovalChain::build(&request(Some(42), true), Utc::now());
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].level, ApprovalLevel::HrManager);
    }

    #[test]
    fn no_manager_means_no_manager_step() {
        let steps = ApprovalChain::build(&request(None, true), Utc::now());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].level, ApprovalLevel::HrManager);
    }

    #[test]
    fn chain_completes_only_when_all_steps_approved() {
        let now = Utc::now();
        let mut chain = ApprovalChain::new(ApprovalChain::build(&request(Some(42), true), now));
        assert!(!chain.is_complete());

        chain
            .step_mut(ApprovalLevel::Manager)
            .unwrap()
            .approve(now, None);
        assert!(!chain.is_complete());

        chain
            .step_mut(ApprovalLevel::HrManager)
            .unwrap()
            .approve(now, None);
        assert!(chain.is_complete());
        assert!(!chain.is_failed());
    }

    #[test]
    fn single_rejection_fails_the_chain() {
        let now = Utc::now();
        let mut chain = ApprovalChain::new(ApprovalChain::build(&request(Some(42), true), now));
        chain
            .step_mut(ApprovalLevel::Manager)
            .unwrap()
            .approve(now, None);
        chain
            .step_mut(ApprovalLevel::HrManager)
            .unwrap()
            .reject(now, "understaffed".into(), None);
        assert!(chain.is_failed());
        assert!(!chain.is_complete());
    }
}
