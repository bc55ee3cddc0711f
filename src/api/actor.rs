use actix_web::{FromRequest, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

/// The employee acting on a request. Authentication lives upstream; the
/// gateway resolves the caller's identity and forwards the employee id in
/// this header.
pub const ACTOR_HEADER: &str = "X-Employee-Id";

pub struct Actor {
    pub employee_id: u64,
}

impl FromRequest for Actor {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let employee_id = req
            .headers()
            .get(ACTOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.parse().ok());

        match employee_id {
            Some(id) => ready(Ok(Actor { employee_id: id })),
            None => ready(Err(ErrorUnauthorized("Missing or invalid X-Employee-Id"))),
        }
    }
}
