pub mod approval;
pub mod edit_history;
pub mod employee;
pub mod leave_balance;
pub mod leave_request;
