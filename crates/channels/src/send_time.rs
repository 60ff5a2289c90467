//! Send-time strategy — decides when a computed-due step actually goes
//! out.
//!
//! "Optimal send time" intelligence lives behind this trait so the core
//! stays deterministic: the default strategy never shifts a due time, and
//! the fixed-hour strategy is a deterministic stand-in for engagement
//! models.

use chrono::{DateTime, NaiveTime, Utc};

/// Chooses the actual send time for a step that became due at `earliest`.
/// Implementations must never return a time before `earliest`.
pub trait SendTimeStrategy: Send + Sync {
    fn send_at(&self, lead_id: &str, earliest: DateTime<Utc>) -> DateTime<Utc>;
}

/// Default: send exactly when due.
pub struct ExactSchedule;

impl SendTimeStrategy for ExactSchedule {
    fn send_at(&self, _lead_id: &str, earliest: DateTime<Utc>) -> DateTime<Utc> {
        earliest
    }
}

/// Deterministic stand-in for engagement-based optimization: holds sends
/// until a fixed hour of day (UTC), rolling to the next day when the due
/// time already passed that hour.
pub struct FixedHourStrategy {
    pub hour_utc: u32,
}

impl SendTimeStrategy for FixedHourStrategy {
    fn send_at(&self, _lead_id: &str, earliest: DateTime<Utc>) -> DateTime<Utc> {
        let target_time = NaiveTime::from_hms_opt(self.hour_utc, 0, 0).unwrap_or_default();
        let same_day = DateTime::<Utc>::from_naive_utc_and_offset(
            earliest.date_naive().and_time(target_time),
            Utc,
        );
        if same_day >= earliest {
            same_day
        } else {
            same_day + chrono::Duration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_exact_schedule_is_identity() {
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(ExactSchedule.send_at("lead-1", due), due);
    }

    #[test]
    fn test_fixed_hour_holds_until_hour() {
        let strategy = FixedHourStrategy { hour_utc: 9 };

        let before = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let held = strategy.send_at("lead-1", before);
        assert_eq!(held, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

        let after = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rolled = strategy.send_at("lead-1", after);
        assert_eq!(rolled, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_never_before_earliest() {
        let strategy = FixedHourStrategy { hour_utc: 9 };
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 1).unwrap();
        assert!(strategy.send_at("lead-1", due) >= due);
    }
}
