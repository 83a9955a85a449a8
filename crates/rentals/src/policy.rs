//! Loan policy: how long a customer may keep a movie.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use videostore_core::DomainError;

/// Default loan period, in days.
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 7;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPolicy {
    loan_period_days: u32,
}

impl LoanPolicy {
    pub fn new(loan_period_days: u32) -> Result<Self, DomainError> {
        if loan_period_days == 0 {
            return Err(DomainError::validation("loan period must be at least one day"));
        }
        Ok(Self { loan_period_days })
    }

    pub fn loan_period_days(&self) -> u32 {
        self.loan_period_days
    }

    /// Due date for a checkout made on `checkout_date`.
    pub fn due_date(&self, checkout_date: NaiveDate) -> Result<NaiveDate, DomainError> {
        checkout_date
            .checked_add_days(Days::new(u64::from(self.loan_period_days)))
            .ok_or_else(|| DomainError::validation("due date is out of the calendar range"))
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_one_week() {
        let policy = LoanPolicy::default();
        let checkout = NaiveDate::from_ymd_opt(2019, 11, 5).unwrap();
        assert_eq!(
            policy.due_date(checkout).unwrap(),
            NaiveDate::from_ymd_opt(2019, 11, 12).unwrap()
        );
    }

    #[test]
    fn due_date_crosses_month_and_year_boundaries() {
        let policy = LoanPolicy::new(3).unwrap();
        let checkout = NaiveDate::from_ymd_opt(2019, 12, 30).unwrap();
        assert_eq!(
            policy.due_date(checkout).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
        );
    }

    #[test]
    fn zero_day_policy_is_rejected() {
        assert!(matches!(LoanPolicy::new(0), Err(DomainError::Validation(_))));
    }
}
