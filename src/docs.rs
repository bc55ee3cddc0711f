use crate::api::leave::{
    ApproveLeave, BalanceQuery, CancelLeave, CreateLeave, LeaveFilter, RejectLeave, UpdateLeave,
};
use crate::model::approval::{ApprovalLevel, ApprovalStatus, ApprovalStep};
use crate::model::edit_history::EditHistoryEntry;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_request::{HalfDaySegment, LeaveRequest, LeaveStatus};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leave Management API",
        version = "1.0.0",
        description = r#"
## Leave-request lifecycle service

Manages leave applications through a two-level approval chain while a
per-employee, per-leave-type, per-year balance ledger is kept in lockstep.

### Key features
- **Leave requests**: create, edit, approve, reject, cancel
- **Two-level approval**: manager sign-off, optional HR sign-off
- **Balance ledger**: entitlement, pending reservations, usage, carry-over
- **Audit**: approval steps and an append-only edit history per request

The upstream gateway authenticates callers and forwards the acting
employee id in the `X-Employee-Id` header.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::leave::create_leave,
        crate::api::leave::update_leave,
        crate::api::leave::approve_leave,
        crate::api::leave::reject_leave,
        crate::api::leave::cancel_leave,
        crate::api::leave::get_leave,
        crate::api::leave::leave_list,
        crate::api::leave::leave_steps,
        crate::api::leave::leave_history,
        crate::api::leave::get_balance
    ),
    components(
        schemas(
            CreateLeave,
            UpdateLeave,
            ApproveLeave,
            RejectLeave,
            CancelLeave,
            LeaveFilter,
            BalanceQuery,
            LeaveRequest,
            LeaveStatus,
            HalfDaySegment,
            ApprovalStep,
            ApprovalLevel,
            ApprovalStatus,
            LeaveBalance,
            EditHistoryEntry
        )
    ),
    tags(
        (name = "Leave", description = "Leave request lifecycle APIs"),
        (name = "Balance", description = "Leave balance ledger APIs"),
    )
)]
pub struct ApiDoc;
