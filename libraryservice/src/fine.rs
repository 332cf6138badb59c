use chrono::{DateTime, Duration, Utc};

use crate::api::Money;

/// Charged for every started hour past the due date
pub const FINE_PER_HOUR: Money = Money::from_cents(10);

/// Overdue fine for a book returned at `returned_at`.
/// Zero up to and including the due date, afterwards every started hour counts as a full one.
pub fn calculate_fine(due_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> Money {
    if returned_at <= due_date {
        return Money::ZERO;
    }

    let late_by = returned_at - due_date;
    let full_hours = late_by.num_hours();
    let late_hours = if late_by > Duration::hours(full_hours) {
        full_hours + 1
    } else {
        full_hours
    };

    FINE_PER_HOUR * late_hours
}
