use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One ledger row per (employee, leave-type, year); that triple is unique
/// in storage. All mutation goes through `BalanceLedger`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveBalance {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = 2024)]
    pub year: i32,
    #[schema(example = 12.0, value_type = f64)]
    pub entitlement_days: Decimal,
    #[schema(example = 0.0, value_type = f64)]
    pub used_days: Decimal,
    #[schema(example = 12.0, value_type = f64)]
    pub remaining_days: Decimal,
    #[schema(example = 0.0, value_type = f64)]
    pub carry_over_days: Decimal,
    #[schema(example = 0.0, value_type = f64)]
    pub expired_days: Decimal,
    #[schema(example = 0.0, value_type = f64)]
    pub pending_days: Decimal,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_calculated_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every write; a write whose version no longer
    /// matches the stored row is refused, so concurrent operations on the
    /// same triple cannot overwrite each other.
    #[schema(example = 1)]
    pub version: u64,
}

impl LeaveBalance {
    /// A zeroed row for a triple that has no entitlement granted yet.
    /// Created lazily by the first reservation against the triple.
    pub fn open(employee_id: u64, leave_type_id: u64, year: i32) -> Self {
        LeaveBalance {
            id: 0,
            employee_id,
            leave_type_id,
            year,
            entitlement_days: Decimal::ZERO,
            used_days: Decimal::ZERO,
            remaining_days: Decimal::ZERO,
            carry_over_days: Decimal::ZERO,
            expired_days: Decimal::ZERO,
            pending_days: Decimal::ZERO,
            last_calculated_at: None,
            version: 0,
        }
    }

    /// The single place the ledger invariant is computed:
    /// `remaining = entitlement + carry_over - used - pending - expired`.
    pub fn recompute(&mut self) {
        self.remaining_days = self.entitlement_days + self.carry_over_days
            - self.used_days
            - self.pending_days
            - self.expired_days;
    }

    /// Days still open for new reservations on the stored row.
    pub fn available_days(&self) -> Decimal {
        self.remaining_days - self.pending_days
    }
}
