use serde::{Deserialize, Serialize};

/// The slice of the employee directory this service needs: whether the
/// employee may file requests and who signs off on them. The directory
/// itself is owned elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub id: u64,
    pub is_active: bool,
    pub manager_id: Option<u64>,
}
