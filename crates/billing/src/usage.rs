//! Generation usage metering (read side)
//!
//! The generation pipeline writes one `user_usage` row per user per day;
//! this module only aggregates. Quota windows are 30-day billing cycles
//! anchored at the user's `paid_at` timestamp — renewals reset the anchor —
//! with a calendar-month fallback for users who never paid.

use sqlx::PgPool;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::BillingResult;

/// Aggregated usage for the current billing cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleUsage {
    pub usage: i64,
    pub cycle_start: Date,
    pub cycle_end: Date,
}

/// Compute the current billing-cycle window.
///
/// With a `paid_at` anchor, the cycle starts at the anchor date plus as
/// many whole 30-day periods as have elapsed. Without one, the calendar
/// month start is used. The end is always start + 30 days, exclusive.
pub fn current_cycle(paid_at: Option<OffsetDateTime>, today: Date) -> (Date, Date) {
    let start = match paid_at {
        Some(paid) => {
            let anchor = paid.date();
            let days_since = (today - anchor).whole_days();
            // A future anchor (clock skew between us and the provider)
            // clamps to the anchor itself.
            let cycles = if days_since > 0 { days_since / 30 } else { 0 };
            anchor + Duration::days(cycles * 30)
        }
        None => today.replace_day(1).unwrap_or(today),
    };
    (start, start + Duration::days(30))
}

/// Reads per-cycle usage totals from `user_usage`
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Sum of generations in the user's current billing cycle.
    pub async fn cycle_usage(
        &self,
        user_id: Uuid,
        paid_at: Option<OffsetDateTime>,
    ) -> BillingResult<CycleUsage> {
        let today = OffsetDateTime::now_utc().date();
        let (cycle_start, cycle_end) = current_cycle(paid_at, today);

        let (usage,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(generation_count), 0)::BIGINT
            FROM user_usage
            WHERE user_id = $1 AND date >= $2 AND date < $3
            "#,
        )
        .bind(user_id)
        .bind(cycle_start)
        .bind(cycle_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(CycleUsage {
            usage,
            cycle_start,
            cycle_end,
        })
    }
}
