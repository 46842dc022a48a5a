//! Automatic welcome discount for new visitors.

use chrono::{DateTime, Duration, Utc};
use shopbot_store::{DiscountDescriptor, UserRecord};

pub const STANDARD_DISCOUNT_PERCENT: u32 = 10;
pub const AUTO_DISCOUNT_DELAY_HOURS: i64 = 2;

pub fn standard_discount() -> DiscountDescriptor {
    DiscountDescriptor::Percent {
        value: STANDARD_DISCOUNT_PERCENT,
    }
}

/// Returns the descriptor to issue when `record` qualifies at `now`: more than
/// two hours since first session start and nothing issued yet.
pub fn evaluate_auto_discount(
    record: &UserRecord,
    now: DateTime<Utc>,
) -> Option<DiscountDescriptor> {
    if record.banned || record.discount_sent || record.discount.is_some() {
        return None;
    }
    let elapsed = now.signed_duration_since(record.first_seen);
    if elapsed <= Duration::hours(AUTO_DISCOUNT_DELAY_HOURS) {
        return None;
    }
    Some(standard_discount())
}

/// Issues the automatic discount in place. Idempotent: a second call on the
/// same record returns `None`.
pub fn issue_auto_discount(
    record: &mut UserRecord,
    now: DateTime<Utc>,
) -> Option<DiscountDescriptor> {
    let descriptor = evaluate_auto_discount(record, now)?;
    record.discount = Some(descriptor.clone());
    record.discount_sent = true;
    Some(descriptor)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use shopbot_store::{DiscountDescriptor, UserRecord};

    use super::{evaluate_auto_discount, issue_auto_discount, standard_discount};

    fn record_started_at(hours_ago: i64) -> (UserRecord, chrono::DateTime<Utc>) {
        let now = Utc
            .with_ymd_and_hms(2026, 4, 2, 18, 0, 0)
            .single()
            .expect("timestamp");
        (UserRecord::new(now - Duration::hours(hours_ago)), now)
    }

    #[test]
    fn unit_not_eligible_within_two_hours() {
        let (record, now) = record_started_at(2);
        assert_eq!(evaluate_auto_discount(&record, now), None);
    }

    #[test]
    fn functional_eligible_after_two_hours_and_issued_once() {
        let (mut record, now) = record_started_at(3);
        assert_eq!(
            evaluate_auto_discount(&record, now),
            Some(standard_discount())
        );
        assert_eq!(
            issue_auto_discount(&mut record, now),
            Some(standard_discount())
        );
        assert!(record.discount_sent);
        assert_eq!(issue_auto_discount(&mut record, now), None);
    }

    #[test]
    fn regression_operator_assigned_discount_is_not_overwritten() {
        let (mut record, now) = record_started_at(5);
        record.discount = Some(DiscountDescriptor::Percent { value: 40 });
        assert_eq!(issue_auto_discount(&mut record, now), None);
        assert_eq!(
            record.discount,
            Some(DiscountDescriptor::Percent { value: 40 })
        );
        assert!(!record.discount_sent);
    }

    #[test]
    fn regression_deleted_discount_is_not_reissued() {
        let (mut record, now) = record_started_at(5);
        record.discount_sent = true;
        assert_eq!(issue_auto_discount(&mut record, now), None);
        assert_eq!(record.discount, None);
    }
}
