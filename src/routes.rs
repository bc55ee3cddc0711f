use crate::api::leave;
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str) {
    cfg.service(
        web::scope(api_prefix).service(
            web::scope("/leave")
                // /leave/balance — before /{id} so it is not read as an id
                .service(web::resource("/balance").route(web::get().to(leave::get_balance)))
                // /leave
                .service(
                    web::resource("")
                        .route(web::get().to(leave::leave_list))
                        .route(web::post().to(leave::create_leave)),
                )
                // /leave/{id}
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(leave::get_leave))
                        .route(web::put().to(leave::update_leave)),
                )
                // /leave/{id}/approve
                .service(
                    web::resource("/{id}/approve").route(web::put().to(leave::approve_leave)),
                )
                // /leave/{id}/reject
                .service(web::resource("/{id}/reject").route(web::put().to(leave::reject_leave)))
                // /leave/{id}/cancel
                .service(web::resource("/{id}/cancel").route(web::put().to(leave::cancel_leave)))
                // /leave/{id}/steps
                .service(web::resource("/{id}/steps").route(web::get().to(leave::leave_steps)))
                // /leave/{id}/history
                .service(
                    web::resource("/{id}/history").route(web::get().to(leave::leave_history)),
                ),
        ),
    );
}
