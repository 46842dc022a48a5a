//! Preview click limit.

use shopbot_store::{Segment, UserRecord};

pub const PREVIEW_CLICK_LIMIT: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewDecision {
    Allowed { clicks: u32 },
    LimitReached,
}

/// Counts one preview click and marks the segment as viewed, unless the user
/// already used up the limit.
pub fn register_preview_click(record: &mut UserRecord, segment: Segment) -> PreviewDecision {
    if record.preview_click_count >= PREVIEW_CLICK_LIMIT {
        return PreviewDecision::LimitReached;
    }
    record.preview_click_count = record.preview_click_count.saturating_add(1);
    record.viewed_segments.insert(segment);
    PreviewDecision::Allowed {
        clicks: record.preview_click_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Operator adjustment of a user's preview counter.
pub enum PreviewLimitAction {
    /// Counter back to zero; previews open again.
    Reset,
    /// Counter raised to the limit; previews closed.
    Exhaust,
}

impl PreviewLimitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Exhaust => "exhaust",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reset" => Some(Self::Reset),
            "exhaust" => Some(Self::Exhaust),
            _ => None,
        }
    }
}

/// Returns the new counter value.
pub fn apply_preview_limit_action(record: &mut UserRecord, action: PreviewLimitAction) -> u32 {
    record.preview_click_count = match action {
        PreviewLimitAction::Reset => 0,
        PreviewLimitAction::Exhaust => record.preview_click_count.max(PREVIEW_CLICK_LIMIT),
    };
    record.preview_click_count
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shopbot_store::{Segment, UserRecord};

    use super::*;

    #[test]
    fn functional_preview_clicks_stop_at_limit() {
        let mut record = UserRecord::new(Utc::now());
        for expected in 1..=PREVIEW_CLICK_LIMIT {
            assert_eq!(
                register_preview_click(&mut record, Segment::Small),
                PreviewDecision::Allowed { clicks: expected }
            );
        }
        assert_eq!(
            register_preview_click(&mut record, Segment::Large),
            PreviewDecision::LimitReached
        );
        assert_eq!(record.preview_click_count, PREVIEW_CLICK_LIMIT);
        assert!(!record.viewed_segments.contains(&Segment::Large));
    }

    #[test]
    fn unit_operator_reset_and_exhaust() {
        let mut record = UserRecord::new(Utc::now());
        record.preview_click_count = 7;
        assert_eq!(
            apply_preview_limit_action(&mut record, PreviewLimitAction::Exhaust),
            PREVIEW_CLICK_LIMIT
        );
        assert_eq!(
            register_preview_click(&mut record, Segment::Small),
            PreviewDecision::LimitReached
        );
        assert_eq!(
            apply_preview_limit_action(&mut record, PreviewLimitAction::Reset),
            0
        );
        assert_eq!(
            register_preview_click(&mut record, Segment::Small),
            PreviewDecision::Allowed { clicks: 1 }
        );
    }
}
