use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::api::actor::Actor;
use crate::error::LeaveError;
use crate::leave::service::{LeavePatch, LeaveService, NewLeaveRequest};
use crate::model::approval::ApprovalLevel;
use crate::model::leave_request::HalfDaySegment;
use crate::store::mysql::MySqlLeaveStore;

/// Service handed to the handlers by `main`.
pub type AppService = LeaveService<MySqlLeaveStore>;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2024-01-10", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2024-01-12", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_half_day: bool,
    #[schema(example = "morning", nullable = true)]
    pub half_day_segment: Option<HalfDaySegment>,
    #[schema(example = "family trip", nullable = true)]
    pub reason: Option<String>,
    #[serde(default)]
    pub requires_hr_approval: bool,
    /// Required when `requires_hr_approval` is set.
    #[schema(example = 7, nullable = true)]
    pub hr_approver_id: Option<u64>,
    #[schema(nullable = true)]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateLeave {
    #[schema(example = 1, nullable = true)]
    pub leave_type_id: Option<u64>,
    #[schema(example = "2024-01-11", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2024-01-13", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    pub is_half_day: Option<bool>,
    #[schema(example = "afternoon", nullable = true)]
    pub half_day_segment: Option<HalfDaySegment>,
    #[schema(nullable = true)]
    pub reason: Option<String>,
    #[schema(example = "dates shifted by one day", nullable = true)]
    pub edit_reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ApproveLeave {
    #[schema(example = "manager")]
    pub level: ApprovalLevel,
    #[schema(nullable = true)]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectLeave {
    #[schema(example = "manager")]
    pub level: ApprovalLevel,
    #[schema(example = "team is understaffed that week")]
    pub reason: String,
    #[schema(nullable = true)]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CancelLeave {
    #[schema(example = "plans changed")]
    pub reason: String,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Employee whose requests to list
    #[schema(example = 1000)]
    pub employee_id: u64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BalanceQuery {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = 2024)]
    pub year: i32,
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave request created", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Invalid dates, segment, or insufficient balance"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    actor: Actor,
    service: web::Data<AppService>,
    payload: web::Json<CreateLeave>,
) -> Result<impl Responder, LeaveError> {
    let payload = payload.into_inner();
    let input = NewLeaveRequest {
        employee_id: payload.employee_id,
        leave_type_id: payload.leave_type_id,
        start_date: payload.start_date,
        end_date: payload.end_date,
        is_half_day: payload.is_half_day,
        half_day_segment: payload.half_day_segment,
        reason: payload.reason,
        requires_hr_approval: payload.requires_hr_approval,
        hr_approver_id: payload.hr_approver_id,
        notes: payload.notes,
    };
    let request = service.create(input, actor.employee_id).await?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Edit leave request
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{id}",
    params(("id" = u64, Path, description = "Leave request id")),
    request_body = UpdateLeave,
    responses(
        (status = 200, description = "Leave request updated", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Invalid patch or request not editable"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave"
)]
pub async fn update_leave(
    actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeave>,
) -> Result<impl Responder, LeaveError> {
    let payload = payload.into_inner();
    let patch = LeavePatch {
        leave_type_id: payload.leave_type_id,
        start_date: payload.start_date,
        end_date: payload.end_date,
        is_half_day: payload.is_half_day,
        half_day_segment: payload.half_day_segment,
        reason: payload.reason,
        edit_reason: payload.edit_reason,
    };
    let request = service
        .update(path.into_inner(), patch, actor.employee_id)
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Approve one level
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{id}/approve",
    params(("id" = u64, Path, description = "Leave request id")),
    request_body = ApproveLeave,
    responses(
        (status = 200, description = "Approval recorded", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Request is not pending"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Actor is not the recorded approver"),
        (status = 404, description = "Request or approval step not found")
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
    payload: web::Json<ApproveLeave>,
) -> Result<impl Responder, LeaveError> {
    let payload = payload.into_inner();
    let request = service
        .approve(
            path.into_inner(),
            payload.level,
            actor.employee_id,
            payload.notes,
        )
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Reject one level
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{id}/reject",
    params(("id" = u64, Path, description = "Leave request id")),
    request_body = RejectLeave,
    responses(
        (status = 200, description = "Rejection recorded", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Request is not pending"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Actor is not the recorded approver"),
        (status = 404, description = "Request or approval step not found")
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
    payload: web::Json<RejectLeave>,
) -> Result<impl Responder, LeaveError> {
    let payload = payload.into_inner();
    let request = service
        .reject(
            path.into_inner(),
            payload.level,
            actor.employee_id,
            payload.reason,
            payload.notes,
        )
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/* =========================
Cancel leave request
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{id}/cancel",
    params(("id" = u64, Path, description = "Leave request id")),
    request_body = CancelLeave,
    responses(
        (status = 200, description = "Leave request cancelled", body = crate::model::leave_request::LeaveRequest),
        (status = 400, description = "Request already terminal"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
    payload: web::Json<CancelLeave>,
) -> Result<impl Responder, LeaveError> {
    let request = service
        .cancel(
            path.into_inner(),
            payload.into_inner().reason,
            actor.employee_id,
        )
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/v1/leave/{id}",
    params(("id" = u64, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave request found", body = crate::model::leave_request::LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    _actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
) -> Result<impl Responder, LeaveError> {
    let request = service.get_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

/// for listing one employee's leave applications
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Requests of the employee, newest first",
         body = Vec<crate::model::leave_request::LeaveRequest>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    _actor: Actor,
    service: web::Data<AppService>,
    query: web::Query<LeaveFilter>,
) -> Result<impl Responder, LeaveError> {
    let requests = service.find_by_employee(query.employee_id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

/// approval steps of one request, the audit view of the chain
#[utoipa::path(
    get,
    path = "/api/v1/leave/{id}/steps",
    params(("id" = u64, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Approval steps", body = Vec<crate::model::approval::ApprovalStep>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave"
)]
pub async fn leave_steps(
    _actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
) -> Result<impl Responder, LeaveError> {
    let steps = service.steps_of(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(steps))
}

/// append-only edit history of one request
#[utoipa::path(
    get,
    path = "/api/v1/leave/{id}/history",
    params(("id" = u64, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Edit history entries", body = Vec<crate::model::edit_history::EditHistoryEntry>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave"
)]
pub async fn leave_history(
    _actor: Actor,
    service: web::Data<AppService>,
    path: web::Path<u64>,
) -> Result<impl Responder, LeaveError> {
    let history = service.history_of(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// stored balance row for one (employee, leave type, year) triple
#[utoipa::path(
    get,
    path = "/api/v1/leave/balance",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Balance row", body = crate::model::leave_balance::LeaveBalance),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No balance row for the triple yet")
    ),
    tag = "Balance"
)]
pub async fn get_balance(
    _actor: Actor,
    service: web::Data<AppService>,
    query: web::Query<BalanceQuery>,
) -> Result<impl Responder, LeaveError> {
    let balance = service
        .get_balance(query.employee_id, query.leave_type_id, query.year)
        .await?
        .ok_or_else(|| {
            LeaveError::NotFound(format!(
                "no balance for employee {} leave type {} in {}",
                query.employee_id, query.leave_type_id, query.year
            ))
        })?;
    Ok(HttpResponse::Ok().json(balance))
}
