//! Visit classification and event counting.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use shopbot_promo::{attach_referrer, issue_auto_discount};
use shopbot_store::{Aggregate, DiscountDescriptor, EventName, UserRecord};
use tracing::debug;

use crate::admin_log::refresh_dashboard;
use crate::shop_runtime::RuntimeContext;

pub const RETURNING_AFTER_HOURS: i64 = 24;
const REFERRAL_PREFIX: &str = "ref_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    New,
    Returning,
    Active,
    /// The operator is never tracked.
    Operator,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Returning => "returning",
            Self::Active => "active",
            Self::Operator => "operator",
        }
    }

    pub fn should_notify(self) -> bool {
        matches!(self, Self::New | Self::Returning)
    }
}

/// Classifies a session start for `user_id` and updates its record.
///
/// Creates the record on first sight. `last_seen` only moves forward.
pub fn classify_session(aggregate: &mut Aggregate, user_id: &str, now: DateTime<Utc>) -> SessionKind {
    let Some(record) = aggregate.users.get_mut(user_id) else {
        aggregate
            .users
            .insert(user_id.to_string(), UserRecord::new(now));
        return SessionKind::New;
    };
    let idle = now.signed_duration_since(record.last_seen);
    if now > record.last_seen {
        record.last_seen = now;
    }
    if idle > Duration::hours(RETURNING_AFTER_HOURS) {
        SessionKind::Returning
    } else {
        SessionKind::Active
    }
}

/// Referrer id from a `/start ref_<id>` payload.
pub fn parse_referral_code(arg: &str) -> Option<String> {
    let id = arg.trim().strip_prefix(REFERRAL_PREFIX)?;
    if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    Some(id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub kind: SessionKind,
    /// Automatic discount issued during this session start.
    pub auto_discount: Option<DiscountDescriptor>,
    pub referrer_id: Option<String>,
}

impl SessionOutcome {
    fn operator() -> Self {
        Self {
            kind: SessionKind::Operator,
            auto_discount: None,
            referrer_id: None,
        }
    }

    pub fn should_notify(&self) -> bool {
        self.kind.should_notify()
    }
}

/// Runs the whole session-start evaluation in one store mutation:
/// classification, display-name refresh, referral link for new users, and the
/// lazy automatic-discount check.
pub async fn begin_session(
    ctx: &RuntimeContext,
    user_id: i64,
    first_name: &str,
    start_arg: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SessionOutcome> {
    if ctx.config.is_operator(user_id) {
        return Ok(SessionOutcome::operator());
    }
    let key = user_id.to_string();
    let referral = start_arg.and_then(parse_referral_code);
    let outcome = ctx
        .store
        .mutate(|aggregate| {
            let kind = classify_session(aggregate, &key, now);
            let mut referrer_id = None;
            if kind == SessionKind::New {
                if let Some(referrer) = referral.as_deref() {
                    if attach_referrer(aggregate, &key, referrer) {
                        referrer_id = Some(referrer.to_string());
                    }
                }
            }
            let auto_discount = aggregate.users.get_mut(&key).and_then(|record| {
                if !first_name.trim().is_empty() {
                    record.display_name = Some(first_name.trim().to_string());
                }
                issue_auto_discount(record, now)
            });
            SessionOutcome {
                kind,
                auto_discount,
                referrer_id,
            }
        })
        .await?;
    debug!(
        "session classified: user_id={} kind={} auto_discount={}",
        user_id,
        outcome.kind.as_str(),
        outcome.auto_discount.is_some()
    );
    Ok(outcome)
}

/// Counts one event and refreshes the dashboard. Operator activity is not
/// counted and yields `None`.
pub async fn record_event(
    ctx: &RuntimeContext,
    user_id: i64,
    event: EventName,
    now: DateTime<Utc>,
) -> Result<Option<u64>> {
    if ctx.config.is_operator(user_id) {
        return Ok(None);
    }
    let count = ctx
        .store
        .mutate(|aggregate| aggregate.increment_event(event))
        .await?;
    refresh_dashboard(ctx, now).await?;
    Ok(Some(count))
}
