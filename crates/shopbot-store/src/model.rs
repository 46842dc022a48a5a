//! Persisted aggregate and user-record types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalogue::{PackageKey, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Fixed vocabulary of tracked event counters.
pub enum EventName {
    StartCommand,
    PaymentPaypal,
    PaymentCrypto,
    PaymentVoucher,
    PreviewSmall,
    PreviewLarge,
    PricesSmall,
    PricesLarge,
    NextPreview,
    PackageSelected,
}

impl EventName {
    pub const ALL: [EventName; 10] = [
        EventName::StartCommand,
        EventName::PaymentPaypal,
        EventName::PaymentCrypto,
        EventName::PaymentVoucher,
        EventName::PreviewSmall,
        EventName::PreviewLarge,
        EventName::PricesSmall,
        EventName::PricesLarge,
        EventName::NextPreview,
        EventName::PackageSelected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartCommand => "start_command",
            Self::PaymentPaypal => "payment_paypal",
            Self::PaymentCrypto => "payment_crypto",
            Self::PaymentVoucher => "payment_voucher",
            Self::PreviewSmall => "preview_ks",
            Self::PreviewLarge => "preview_gs",
            Self::PricesSmall => "prices_ks",
            Self::PricesLarge => "prices_gs",
            Self::NextPreview => "next_preview",
            Self::PackageSelected => "package_selected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == raw)
    }

    pub fn preview(segment: Segment) -> Self {
        match segment {
            Segment::Small => Self::PreviewSmall,
            Segment::Large => Self::PreviewLarge,
        }
    }

    pub fn prices(segment: Segment) -> Self {
        match segment {
            Segment::Small => Self::PricesSmall,
            Segment::Large => Self::PricesLarge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscountKind {
    Percent,
    Euro,
    PercentPackages,
}

impl DiscountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Euro => "euro",
            Self::PercentPackages => "percent_packages",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "percent" => Some(Self::Percent),
            "euro" => Some(Self::Euro),
            "percent_packages" => Some(Self::PercentPackages),
            _ => None,
        }
    }

    /// Whether the descriptor needs an explicit package selection.
    pub fn requires_packages(self) -> bool {
        !matches!(self, Self::Percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Promotional rule attached to a user record.
pub enum DiscountDescriptor {
    /// Uniform percentage off any package.
    Percent { value: u32 },
    /// Fixed currency amount subtracted per package.
    Euro {
        packages: BTreeMap<PackageKey, u32>,
    },
    /// Percentage off, chosen per package.
    PercentPackages {
        packages: BTreeMap<PackageKey, u32>,
    },
}

impl DiscountDescriptor {
    pub fn kind(&self) -> DiscountKind {
        match self {
            Self::Percent { .. } => DiscountKind::Percent,
            Self::Euro { .. } => DiscountKind::Euro,
            Self::PercentPackages { .. } => DiscountKind::PercentPackages,
        }
    }

    /// One-line description used in user notifications and operator replies.
    pub fn describe(&self) -> String {
        match self {
            Self::Percent { value } => format!("{value}% auf alle Pakete"),
            Self::Euro { packages } => packages
                .iter()
                .map(|(key, amount)| format!("{}: -{amount}€", key.label()))
                .collect::<Vec<_>>()
                .join(", "),
            Self::PercentPackages { packages } => packages
                .iter()
                .map(|(key, value)| format!("{}: -{value}%", key.label()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, with = "timestamp_serde")]
    pub first_seen: DateTime<Utc>,
    #[serde(default, alias = "last_start", with = "timestamp_serde")]
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub preview_click_count: u32,
    #[serde(default)]
    pub viewed_segments: BTreeSet<Segment>,
    #[serde(default)]
    pub payment_attempts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<String>,
    #[serde(default)]
    pub referrals: Vec<String>,
    #[serde(default)]
    pub successful_referrals: u32,
    #[serde(default)]
    pub reward_triggered_for_referrer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<DiscountDescriptor>,
    #[serde(default)]
    pub discount_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            banned: false,
            preview_click_count: 0,
            viewed_segments: BTreeSet::new(),
            payment_attempts: Vec::new(),
            referrer_id: None,
            referrals: Vec::new(),
            successful_referrals: 0,
            reward_triggered_for_referrer: false,
            discount: None,
            discount_sent: false,
            display_name: None,
        }
    }

    /// Stand-in record created during recovery catch-up. Carries epoch
    /// timestamps and no identity.
    pub fn placeholder() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Appends a payment attempt line unless the exact line is already present.
    pub fn record_payment_attempt(&mut self, line: impl Into<String>) -> bool {
        let line = line.into();
        if self.payment_attempts.contains(&line) {
            return false;
        }
        self.payment_attempts.push(line);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Index entry for one user's activity record in the notification chat.
pub struct AdminLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Root object persisted to `stats.json`.
pub struct Aggregate {
    #[serde(default)]
    pub pinned_message_id: Option<i64>,
    #[serde(default)]
    pub discount_message_id: Option<i64>,
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub admin_logs: BTreeMap<String, AdminLogEntry>,
    #[serde(default)]
    pub events: BTreeMap<String, u64>,
}

impl Aggregate {
    pub fn event_count(&self, event: EventName) -> u64 {
        self.events.get(event.as_str()).copied().unwrap_or_default()
    }

    pub fn increment_event(&mut self, event: EventName) -> u64 {
        let counter = self.events.entry(event.as_str().to_string()).or_default();
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Zeroes every existing counter. Keys are kept.
    pub fn reset_event_counters(&mut self) {
        for value in self.events.values_mut() {
            *value = 0;
        }
    }

    /// Drops every user record and activity-log entry and zeroes the counters.
    /// Remote message ids survive so the dashboard and mirror keep their slots.
    pub fn full_reset(&mut self) {
        self.users.clear();
        self.admin_logs.clear();
        self.reset_event_counters();
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn active_users_since(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.users
            .values()
            .filter(|record| now.signed_duration_since(record.last_seen) <= window)
            .count()
    }

    /// Every descriptor currently assigned, keyed by user id.
    pub fn discount_map(&self) -> BTreeMap<String, DiscountDescriptor> {
        self.users
            .iter()
            .filter_map(|(user_id, record)| {
                record
                    .discount
                    .clone()
                    .map(|descriptor| (user_id.clone(), descriptor))
            })
            .collect()
    }

    pub fn is_banned(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .map(|record| record.banned)
            .unwrap_or(false)
    }
}

/// RFC 3339 on write; also accepts naive ISO timestamps (read as UTC) so
/// stats files written without an offset still load.
mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw.trim()) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
