//! Remote mirrors of the local store and cold-start recovery.
//!
//! The dashboard (summary mirror) and the discount mirror both carry a JSON
//! payload inside a `<tg-spoiler>` block. Recovery reads that payload; the
//! bold labels around it are presentation only, except for dashboards written
//! before the payload existed, which are still scraped label by label.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopbot_store::{Aggregate, DiscountDescriptor, EventName, UserRecord};
use shopbot_telegram::{escape_html, OutboundMessage, MESSAGE_TEXT_LIMIT};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::admin_log::{refresh_dashboard, upsert_message, UpsertOutcome};
use crate::shop_runtime::RuntimeContext;

pub const SUMMARY_HEADER: &str = "Bot-Statistik Dashboard";
pub const DISCOUNT_MIRROR_HEADER: &str = "🏷️ Rabatt-Backup";
pub const MIRROR_SCHEMA_VERSION: u32 = 1;
/// Discount mirror layout with descriptors grouped by holder. Version 1 was a
/// flat `{user_id: descriptor}` map and still decodes.
pub const DISCOUNT_MIRROR_SCHEMA_VERSION: u32 = 2;
/// Version reported for dashboards recovered from their labels.
pub const LEGACY_SCHEMA_VERSION: u32 = 0;
pub const PLACEHOLDER_PREFIX: &str = "restored_user_";

const USER_COUNT_LABEL: &str = "Nutzer Gesamt:";
const ACTIVE_WINDOW_HOURS: i64 = 24;

const SUMMARY_LABELS: [(EventName, &str); 10] = [
    (EventName::StartCommand, "Starts insgesamt:"),
    (EventName::PaymentPaypal, "PayPal Klicks:"),
    (EventName::PaymentCrypto, "Krypto Klicks:"),
    (EventName::PaymentVoucher, "Gutschein Klicks:"),
    (EventName::PreviewSmall, "Vorschau (KS):"),
    (EventName::PreviewLarge, "Vorschau (GS):"),
    (EventName::PricesSmall, "Preise (KS):"),
    (EventName::PricesLarge, "Preise (GS):"),
    (EventName::NextPreview, "'Nächstes Bild' Klicks:"),
    (EventName::PackageSelected, "Paketauswahl:"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorDecodeError {
    #[error("mirror header '{0}' not found")]
    MissingHeader(&'static str),
    #[error("mirror payload not found")]
    MissingPayload,
    #[error("mirror payload is not valid json: {0}")]
    InvalidPayload(String),
    #[error("mirror schema version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("discount mirror outgrew one message and carries no entries")]
    Overflowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Structured content of the dashboard.
pub struct SummaryPayload {
    pub schema_version: u32,
    pub user_count: usize,
    #[serde(default)]
    pub events: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_message_id: Option<i64>,
}

impl SummaryPayload {
    pub fn from_aggregate(aggregate: &Aggregate) -> Self {
        Self {
            schema_version: MIRROR_SCHEMA_VERSION,
            user_count: aggregate.user_count(),
            events: EventName::ALL
                .into_iter()
                .map(|event| (event.as_str().to_string(), aggregate.event_count(event)))
                .collect(),
            discount_message_id: aggregate.discount_message_id,
        }
    }

    pub fn event_count(&self, event: EventName) -> u64 {
        self.events.get(event.as_str()).copied().unwrap_or_default()
    }
}

fn spoiler(payload: &str) -> String {
    format!("<tg-spoiler>{}</tg-spoiler>", escape_html(payload))
}

pub fn render_summary(aggregate: &Aggregate, now: DateTime<Utc>) -> Result<OutboundMessage> {
    let payload = SummaryPayload::from_aggregate(aggregate);
    let encoded =
        serde_json::to_string(&payload).context("failed to encode dashboard payload")?;
    let count = |event: EventName| aggregate.event_count(event);
    let active = aggregate.active_users_since(now, Duration::hours(ACTIVE_WINDOW_HOURS));
    let mut text = format!(
        "📊 <b>{SUMMARY_HEADER}</b>\n<i>(Letztes Update: {} UTC)</i>\n\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    text.push_str(&format!(
        "👤 <b>{USER_COUNT_LABEL}</b> {}\n🟢 <b>Aktive Nutzer (24h):</b> {active}\n🚀 <b>{}</b> {}\n\n",
        payload.user_count,
        SUMMARY_LABELS[0].1,
        count(EventName::StartCommand)
    ));
    text.push_str("--- <b>Bezahl-Interesse</b> ---\n");
    for (icon, (event, label)) in ["💰", "🪙", "🎟️"].iter().zip(&SUMMARY_LABELS[1..4]) {
        text.push_str(&format!("{icon} <b>{label}</b> {}\n", count(*event)));
    }
    text.push_str("\n--- <b>Klick-Verhalten</b> ---\n");
    for (event, label) in &SUMMARY_LABELS[4..] {
        text.push_str(&format!("▪️ {} {}\n", escape_html(label), count(*event)));
    }
    text.push('\n');
    text.push_str(&spoiler(&encoded));
    Ok(OutboundMessage::html(text))
}

/// Last line that looks like a JSON object. Reads visible text, where the
/// spoiler markup is already gone.
fn payload_line(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{') && line.ends_with('}'))
}

fn scrape_label(text: &str, label: &str) -> u64 {
    let pattern = format!(r"{}\s*(\d+)", regex::escape(label));
    Regex::new(&pattern)
        .ok()
        .and_then(|regex| regex.captures(text))
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse::<u64>().ok())
        .unwrap_or_default()
}

fn scrape_summary_labels(text: &str) -> SummaryPayload {
    SummaryPayload {
        schema_version: LEGACY_SCHEMA_VERSION,
        user_count: usize::try_from(scrape_label(text, USER_COUNT_LABEL)).unwrap_or_default(),
        events: SUMMARY_LABELS
            .iter()
            .map(|(event, label)| (event.as_str().to_string(), scrape_label(text, label)))
            .collect(),
        discount_message_id: None,
    }
}

/// Decodes the visible text of a pinned dashboard.
pub fn decode_summary(text: &str) -> Result<SummaryPayload, MirrorDecodeError> {
    if !text.contains(SUMMARY_HEADER) {
        return Err(MirrorDecodeError::MissingHeader(SUMMARY_HEADER));
    }
    let Some(line) = payload_line(text) else {
        return Ok(scrape_summary_labels(text));
    };
    let payload = serde_json::from_str::<SummaryPayload>(line)
        .map_err(|error| MirrorDecodeError::InvalidPayload(error.to_string()))?;
    if payload.schema_version != MIRROR_SCHEMA_VERSION {
        return Err(MirrorDecodeError::UnsupportedVersion(payload.schema_version));
    }
    Ok(payload)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DiscountGroup {
    discount: Value,
    /// Comma-separated user ids sharing `discount`.
    #[serde(default)]
    ids: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DiscountMirrorPayload {
    schema_version: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    overflow: bool,
    #[serde(default)]
    groups: Vec<DiscountGroup>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

fn discount_mirror_message(
    payload: &DiscountMirrorPayload,
    note: Option<&str>,
) -> Result<OutboundMessage> {
    let encoded = serde_json::to_string(payload).context("failed to encode discount mirror")?;
    let note = note.map(|note| format!("{note}\n")).unwrap_or_default();
    Ok(OutboundMessage::html(format!(
        "<b>{DISCOUNT_MIRROR_HEADER}</b>\n{note}{}",
        spoiler(&encoded)
    )))
}

/// Renders the discount mirror. Users holding the same descriptor share one
/// group, so the common automatic discount costs one id per holder.
pub fn render_discount_mirror(
    discounts: &BTreeMap<String, DiscountDescriptor>,
) -> Result<OutboundMessage> {
    let mut grouped: Vec<(&DiscountDescriptor, Vec<&str>)> = Vec::new();
    for (user_id, descriptor) in discounts {
        match grouped.iter_mut().find(|(known, _)| *known == descriptor) {
            Some((_, ids)) => ids.push(user_id.as_str()),
            None => grouped.push((descriptor, vec![user_id.as_str()])),
        }
    }
    let groups = grouped
        .into_iter()
        .map(|(descriptor, ids)| {
            Ok(DiscountGroup {
                discount: serde_json::to_value(descriptor)
                    .context("failed to encode discount descriptor")?,
                ids: ids.join(","),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    discount_mirror_message(
        &DiscountMirrorPayload {
            schema_version: DISCOUNT_MIRROR_SCHEMA_VERSION,
            overflow: false,
            groups,
        },
        None,
    )
}

/// Mirror written when the real one no longer fits. Recovery refuses it, so a
/// stale backup is never restored.
pub fn render_overflowed_discount_mirror(discount_count: usize) -> Result<OutboundMessage> {
    discount_mirror_message(
        &DiscountMirrorPayload {
            schema_version: DISCOUNT_MIRROR_SCHEMA_VERSION,
            overflow: true,
            groups: Vec::new(),
        },
        Some(&format!(
            "⚠️ {discount_count} Rabatte passen nicht in eine Nachricht, Sicherung ausgesetzt."
        )),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountMirror {
    pub entries: BTreeMap<String, DiscountDescriptor>,
    /// Ids whose descriptor had an unknown tag or foreign package key.
    pub skipped: Vec<String>,
}

impl DiscountMirror {
    fn accept(&mut self, user_id: String, value: Value) {
        match serde_json::from_value::<DiscountDescriptor>(value) {
            Ok(descriptor) => {
                self.entries.insert(user_id, descriptor);
            }
            Err(error) => {
                warn!("discount mirror entry skipped: user_id={user_id} error={error}");
                self.skipped.push(user_id);
            }
        }
    }
}

/// Decodes the visible text of a discount mirror message.
pub fn decode_discount_mirror(text: &str) -> Result<DiscountMirror, MirrorDecodeError> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix(DISCOUNT_MIRROR_HEADER) else {
        return Err(MirrorDecodeError::MissingHeader(DISCOUNT_MIRROR_HEADER));
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(MirrorDecodeError::MissingPayload);
    }
    let payload = payload_line(rest).unwrap_or(rest);
    let raw = serde_json::from_str::<serde_json::Map<String, Value>>(payload)
        .map_err(|error| MirrorDecodeError::InvalidPayload(error.to_string()))?;
    let mut mirror = DiscountMirror::default();
    if !raw.contains_key("schema_version") {
        for (user_id, value) in raw {
            mirror.accept(user_id, value);
        }
        return Ok(mirror);
    }
    let grouped = serde_json::from_value::<DiscountMirrorPayload>(Value::Object(raw))
        .map_err(|error| MirrorDecodeError::InvalidPayload(error.to_string()))?;
    if grouped.schema_version != DISCOUNT_MIRROR_SCHEMA_VERSION {
        return Err(MirrorDecodeError::UnsupportedVersion(grouped.schema_version));
    }
    if grouped.overflow {
        return Err(MirrorDecodeError::Overflowed);
    }
    for group in grouped.groups {
        for user_id in group.ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            mirror.accept(user_id.to_string(), group.discount.clone());
        }
    }
    mirror.skipped.sort();
    mirror.skipped.dedup();
    let entries = &mirror.entries;
    mirror.skipped.retain(|user_id| !entries.contains_key(user_id));
    Ok(mirror)
}

/// Rewrites the discount mirror from the current store. Remote failures are
/// logged and leave local state alone.
pub async fn push_discount_mirror(ctx: &RuntimeContext, now: DateTime<Utc>) -> Result<()> {
    let Some(chat_id) = ctx.config.notification_chat_id else {
        return Ok(());
    };
    let aggregate = ctx.store.snapshot().await;
    let discounts = aggregate.discount_map();
    let mut message = render_discount_mirror(&discounts)?;
    if !message.fits_text_limit() {
        error!(
            "discount mirror exceeds message limit, remote discount backup suspended: discounts={} visible_len={} limit={}",
            discounts.len(),
            message.visible_len(),
            MESSAGE_TEXT_LIMIT
        );
        message = render_overflowed_discount_mirror(discounts.len())?;
    }
    let outcome = match upsert_message(
        ctx.transport.as_ref(),
        chat_id,
        aggregate.discount_message_id,
        &message,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(error) => {
            error!(
                "discount mirror update failed: reason_code={} detail={}",
                error.reason_code, error.detail
            );
            return Ok(());
        }
    };
    if let UpsertOutcome::Created(message_id) = outcome {
        ctx.store
            .mutate(|aggregate| aggregate.discount_message_id = Some(message_id))
            .await?;
        info!("discount mirror created: message_id={message_id}");
        // The dashboard payload carries the mirror id.
        refresh_dashboard(ctx, now).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub summary_restored: bool,
    pub legacy_summary: bool,
    pub placeholders_added: usize,
    pub discounts_restored: usize,
    pub discounts_skipped: usize,
    pub warnings: Vec<String>,
}

impl RecoveryReport {
    fn warn(&mut self, message: String) {
        warn!("recovery: {message}");
        self.warnings.push(message);
    }
}

fn apply_summary(
    aggregate: &mut Aggregate,
    payload: &SummaryPayload,
    pinned_message_id: i64,
    restore_placeholders: bool,
) -> usize {
    for event in EventName::ALL {
        aggregate
            .events
            .insert(event.as_str().to_string(), payload.event_count(event));
    }
    let mut added = 0;
    if restore_placeholders {
        let mut index = 0usize;
        while aggregate.user_count() < payload.user_count {
            let key = format!("{PLACEHOLDER_PREFIX}{index}");
            index += 1;
            if aggregate.users.contains_key(&key) {
                continue;
            }
            aggregate.users.insert(key, UserRecord::placeholder());
            added += 1;
        }
    }
    aggregate.pinned_message_id = Some(pinned_message_id);
    if aggregate.discount_message_id.is_none() {
        aggregate.discount_message_id = payload.discount_message_id;
    }
    added
}

async fn restore_summary(ctx: &RuntimeContext, chat_id: i64, report: &mut RecoveryReport) {
    let pinned = match ctx.transport.pinned_message(chat_id).await {
        Ok(Some(pinned)) => pinned,
        Ok(None) => {
            report.warn("no pinned dashboard, counters start empty".to_string());
            return;
        }
        Err(error) => {
            report.warn(format!("pinned dashboard unreadable: {error}"));
            return;
        }
    };
    let payload = match decode_summary(&pinned.text) {
        Ok(payload) => payload,
        Err(error) => {
            report.warn(format!(
                "pinned message {} skipped: {error}",
                pinned.message_id
            ));
            return;
        }
    };
    let restore_placeholders = ctx.config.restore_placeholders;
    match ctx
        .store
        .mutate(|aggregate| {
            apply_summary(aggregate, &payload, pinned.message_id, restore_placeholders)
        })
        .await
    {
        Ok(added) => {
            report.summary_restored = true;
            report.legacy_summary = payload.schema_version == LEGACY_SCHEMA_VERSION;
            report.placeholders_added = added;
        }
        Err(error) => report.warn(format!("restored counters not saved: {error:#}")),
    }
}

async fn restore_discounts(ctx: &RuntimeContext, chat_id: i64, report: &mut RecoveryReport) {
    let Some(message_id) = ctx.store.snapshot().await.discount_message_id else {
        report.warn("no discount mirror id known".to_string());
        return;
    };
    let text = match ctx.transport.fetch_message_text(chat_id, message_id).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            report.warn(format!("discount mirror {message_id} has no text"));
            return;
        }
        Err(error) => {
            report.warn(format!("discount mirror {message_id} unreadable: {error}"));
            return;
        }
    };
    let mirror = match decode_discount_mirror(&text) {
        Ok(mirror) => mirror,
        Err(error) => {
            report.warn(format!("discount mirror {message_id} skipped: {error}"));
            return;
        }
    };
    report.discounts_skipped = mirror.skipped.len();
    match ctx
        .store
        .mutate(|aggregate| {
            let mut restored = 0;
            for (user_id, descriptor) in &mirror.entries {
                if let Some(record) = aggregate.users.get_mut(user_id) {
                    record.discount = Some(descriptor.clone());
                    restored += 1;
                }
            }
            restored
        })
        .await
    {
        Ok(restored) => report.discounts_restored = restored,
        Err(error) => report.warn(format!("restored discounts not saved: {error:#}")),
    }
}

/// Cold-start recovery. Each path aborts on its own; nothing here fails the
/// caller.
pub async fn recover_from_remote(ctx: &RuntimeContext) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    let Some(chat_id) = ctx.config.notification_chat_id else {
        report.warn("no notification chat configured, recovery skipped".to_string());
        return report;
    };
    restore_summary(ctx, chat_id, &mut report).await;
    restore_discounts(ctx, chat_id, &mut report).await;
    info!(
        "recovery finished: summary_restored={} legacy={} placeholders={} discounts_restored={} discounts_skipped={} warnings={}",
        report.summary_restored,
        report.legacy_summary,
        report.placeholders_added,
        report.discounts_restored,
        report.discounts_skipped,
        report.warnings.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use shopbot_store::{Aggregate, DiscountDescriptor, EventName, PackageKey, UserRecord};
    use shopbot_telegram::{visible_text, MessengerTransport, OutboundMessage};

    use super::*;
    use crate::shop_runtime::{test_harness, TEST_NOTIFICATION_CHAT};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0)
            .single()
            .expect("timestamp")
    }

    fn sample_discounts() -> BTreeMap<String, DiscountDescriptor> {
        let key = |raw: &str| raw.parse::<PackageKey>().expect("package");
        BTreeMap::from([
            ("11".to_string(), DiscountDescriptor::Percent { value: 20 }),
            (
                "12".to_string(),
                DiscountDescriptor::Euro {
                    packages: BTreeMap::from([(key("bilder_10"), 3), (key("videos_35"), 5)]),
                },
            ),
            (
                "13".to_string(),
                DiscountDescriptor::PercentPackages {
                    packages: BTreeMap::from([(key("videos_25"), 15)]),
                },
            ),
        ])
    }

    fn shown(message: &OutboundMessage) -> String {
        visible_text(&message.text, message.parse_mode)
    }

    #[test]
    fn unit_discount_mirror_round_trip_through_visible_text() {
        let discounts = sample_discounts();
        let message = render_discount_mirror(&discounts).expect("render");
        assert!(shown(&message).starts_with(DISCOUNT_MIRROR_HEADER));
        let decoded = decode_discount_mirror(&shown(&message)).expect("decode");
        assert_eq!(decoded.entries, discounts);
        assert!(decoded.skipped.is_empty());
    }

    #[test]
    fn regression_discount_mirror_skips_unknown_tags() {
        let text = format!(
            "{DISCOUNT_MIRROR_HEADER}\n{{\"1\":{{\"type\":\"bogo\"}},\"2\":{{\"type\":\"percent\",\"value\":5}}}}"
        );
        let decoded = decode_discount_mirror(&text).expect("decode");
        assert_eq!(decoded.skipped, vec!["1".to_string()]);
        assert_eq!(
            decoded.entries.get("2"),
            Some(&DiscountDescriptor::Percent { value: 5 })
        );
    }

    fn auto_discount_holders(count: u64) -> BTreeMap<String, DiscountDescriptor> {
        (0..count)
            .map(|offset| {
                (
                    (5_000_000_000 + offset).to_string(),
                    DiscountDescriptor::Percent { value: 10 },
                )
            })
            .collect()
    }

    #[test]
    fn regression_hundred_auto_discount_holders_fit_one_mirror() {
        let discounts = auto_discount_holders(100);
        let message = render_discount_mirror(&discounts).expect("render");
        assert!(
            message.fits_text_limit(),
            "visible_len={}",
            message.visible_len()
        );
        let decoded = decode_discount_mirror(&shown(&message)).expect("decode");
        assert_eq!(decoded.entries, discounts);
    }

    #[test]
    fn unit_grouped_mirror_skips_unknown_tags_per_group() {
        let text = format!(
            "{DISCOUNT_MIRROR_HEADER}\n{{\"schema_version\":2,\"groups\":[\
             {{\"discount\":{{\"type\":\"bogo\"}},\"ids\":\"1,2\"}},\
             {{\"discount\":{{\"type\":\"percent\",\"value\":5}},\"ids\":\"2, 3\"}}]}}"
        );
        let decoded = decode_discount_mirror(&text).expect("decode");
        assert_eq!(decoded.skipped, vec!["1".to_string()]);
        assert_eq!(
            decoded.entries.keys().cloned().collect::<Vec<_>>(),
            vec!["2".to_string(), "3".to_string()]
        );
        let future = format!("{DISCOUNT_MIRROR_HEADER}\n{{\"schema_version\":3,\"groups\":[]}}");
        assert_eq!(
            decode_discount_mirror(&future),
            Err(MirrorDecodeError::UnsupportedVersion(3))
        );
    }

    #[test]
    fn unit_discount_mirror_rejects_missing_header_and_payload() {
        assert_eq!(
            decode_discount_mirror("{}"),
            Err(MirrorDecodeError::MissingHeader(DISCOUNT_MIRROR_HEADER))
        );
        assert_eq!(
            decode_discount_mirror(DISCOUNT_MIRROR_HEADER),
            Err(MirrorDecodeError::MissingPayload)
        );
        assert!(matches!(
            decode_discount_mirror(&format!("{DISCOUNT_MIRROR_HEADER}\nnot json")),
            Err(MirrorDecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn functional_summary_payload_survives_rendering() {
        let mut aggregate = Aggregate::default();
        aggregate
            .users
            .insert("1".to_string(), UserRecord::new(now()));
        aggregate.increment_event(EventName::PaymentPaypal);
        aggregate.increment_event(EventName::PaymentPaypal);
        aggregate.discount_message_id = Some(77);
        let message = render_summary(&aggregate, now()).expect("render");
        let text = shown(&message);
        assert!(text.contains("PayPal Klicks: 2"));
        assert!(text.contains("'Nächstes Bild' Klicks: 0"));
        let payload = decode_summary(&text).expect("decode");
        assert_eq!(payload.schema_version, MIRROR_SCHEMA_VERSION);
        assert_eq!(payload.user_count, 1);
        assert_eq!(payload.event_count(EventName::PaymentPaypal), 2);
        assert_eq!(payload.discount_message_id, Some(77));
    }

    #[test]
    fn regression_legacy_dashboard_labels_are_scraped() {
        let text = "📊 Bot-Statistik Dashboard\n(Letztes Update: 2025-01-01 10:00:00)\n\n\
                    👤 Nutzer Gesamt: 4\n🚀 Starts insgesamt: 9\n💰 PayPal Klicks: 3\n\
                    ▪️ Vorschau (GS): 6\n▪️ 'Nächstes Bild' Klicks: 2";
        let payload = decode_summary(text).expect("legacy decode");
        assert_eq!(payload.schema_version, LEGACY_SCHEMA_VERSION);
        assert_eq!(payload.user_count, 4);
        assert_eq!(payload.event_count(EventName::StartCommand), 9);
        assert_eq!(payload.event_count(EventName::PreviewLarge), 6);
        assert_eq!(payload.event_count(EventName::NextPreview), 2);
        assert_eq!(payload.event_count(EventName::PaymentCrypto), 0);
    }

    #[test]
    fn unit_summary_decode_rejects_foreign_messages_and_versions() {
        assert_eq!(
            decode_summary("Willkommen"),
            Err(MirrorDecodeError::MissingHeader(SUMMARY_HEADER))
        );
        let future = format!(
            "{SUMMARY_HEADER}\n{{\"schema_version\":9,\"user_count\":1}}"
        );
        assert_eq!(
            decode_summary(&future),
            Err(MirrorDecodeError::UnsupportedVersion(9))
        );
    }

    #[tokio::test]
    async fn integration_recovery_restores_counters_placeholders_and_discounts() {
        let mut remote = Aggregate::default();
        for id in ["11", "12", "13"] {
            remote.users.insert(id.to_string(), UserRecord::new(now()));
        }
        remote.increment_event(EventName::StartCommand);
        remote.increment_event(EventName::PackageSelected);

        let mut local = Aggregate::default();
        local.users.insert("11".to_string(), UserRecord::new(now()));
        let (ctx, transport) = test_harness(local);

        let mirror_id = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            render_discount_mirror(&sample_discounts()).expect("mirror"),
        );
        remote.discount_message_id = Some(mirror_id);
        let dashboard_id = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            render_summary(&remote, now()).expect("dashboard"),
        );
        transport.pin(TEST_NOTIFICATION_CHAT, dashboard_id);

        let report = recover_from_remote(&ctx).await;
        assert!(report.summary_restored, "{:?}", report.warnings);
        assert!(!report.legacy_summary);
        assert_eq!(report.placeholders_added, 2);
        assert_eq!(report.discounts_restored, 1);

        let restored = ctx.store.snapshot().await;
        assert_eq!(restored.user_count(), 3);
        assert!(restored.users.contains_key("restored_user_0"));
        assert_eq!(restored.event_count(EventName::StartCommand), 1);
        assert_eq!(restored.event_count(EventName::PaymentVoucher), 0);
        assert_eq!(restored.events.len(), EventName::ALL.len());
        assert_eq!(restored.pinned_message_id, Some(dashboard_id));
        assert_eq!(restored.discount_message_id, Some(mirror_id));
        assert_eq!(
            restored.users["11"].discount,
            Some(DiscountDescriptor::Percent { value: 20 })
        );
    }

    #[tokio::test]
    async fn functional_recovery_paths_abort_independently() {
        let mut local = Aggregate::default();
        local.users.insert("11".to_string(), UserRecord::new(now()));
        let (ctx, transport) = test_harness(local.clone());
        let unrelated = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            OutboundMessage::plain("Hallo zusammen"),
        );
        transport.pin(TEST_NOTIFICATION_CHAT, unrelated);
        let mirror_id = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            render_discount_mirror(&sample_discounts()).expect("mirror"),
        );
        ctx.store
            .mutate(|aggregate| aggregate.discount_message_id = Some(mirror_id))
            .await
            .expect("seed id");

        let report = recover_from_remote(&ctx).await;
        assert!(!report.summary_restored);
        assert_eq!(report.discounts_restored, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(ctx.store.snapshot().await.pinned_message_id, None);
    }

    #[tokio::test]
    async fn regression_placeholders_can_be_disabled() {
        let mut remote = Aggregate::default();
        for id in ["1", "2", "3"] {
            remote.users.insert(id.to_string(), UserRecord::new(now()));
        }
        let (mut ctx, transport) = test_harness(Aggregate::default());
        let mut config = (*ctx.config).clone();
        config.restore_placeholders = false;
        ctx.config = std::sync::Arc::new(config);
        let dashboard_id = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            render_summary(&remote, now()).expect("dashboard"),
        );
        transport.pin(TEST_NOTIFICATION_CHAT, dashboard_id);
        let report = recover_from_remote(&ctx).await;
        assert!(report.summary_restored);
        assert_eq!(report.placeholders_added, 0);
        assert_eq!(ctx.store.snapshot().await.user_count(), 0);
    }

    #[tokio::test]
    async fn regression_oversized_mirror_is_replaced_and_never_restored() {
        let mut local = Aggregate::default();
        for (user_id, descriptor) in auto_discount_holders(1_000) {
            let mut record = UserRecord::new(now());
            record.discount = Some(descriptor);
            local.users.insert(user_id, record);
        }
        // Discount deleted locally after the last mirror that still fit.
        local.users.insert("77".to_string(), UserRecord::new(now()));
        let (ctx, transport) = test_harness(local);
        let stale = BTreeMap::from([(
            "77".to_string(),
            DiscountDescriptor::Percent { value: 50 },
        )]);
        let mirror_id = transport.seed_message(
            TEST_NOTIFICATION_CHAT,
            render_discount_mirror(&stale).expect("mirror"),
        );
        ctx.store
            .mutate(|aggregate| aggregate.discount_message_id = Some(mirror_id))
            .await
            .expect("seed id");

        push_discount_mirror(&ctx, now()).await.expect("push");
        assert_eq!(ctx.store.snapshot().await.discount_message_id, Some(mirror_id));
        let text = transport
            .fetch_message_text(TEST_NOTIFICATION_CHAT, mirror_id)
            .await
            .expect("fetch")
            .expect("text");
        assert!(text.contains("1000 Rabatte"), "{text}");
        assert_eq!(
            decode_discount_mirror(&text),
            Err(MirrorDecodeError::Overflowed)
        );

        let report = recover_from_remote(&ctx).await;
        assert_eq!(report.discounts_restored, 0);
        assert!(report
            .warnings
            .iter()
            .any(|warning| warning.contains("outgrew one message")));
        assert_eq!(ctx.store.snapshot().await.users["77"].discount, None);
    }

    #[tokio::test]
    async fn functional_push_discount_mirror_creates_then_edits() {
        let mut local = Aggregate::default();
        let mut record = UserRecord::new(now());
        record.discount = Some(DiscountDescriptor::Percent { value: 15 });
        local.users.insert("11".to_string(), record);
        let (ctx, transport) = test_harness(local);

        push_discount_mirror(&ctx, now()).await.expect("push");
        let mirror_id = ctx
            .store
            .snapshot()
            .await
            .discount_message_id
            .expect("mirror id stored");
        let text = transport
            .fetch_message_text(TEST_NOTIFICATION_CHAT, mirror_id)
            .await
            .expect("fetch")
            .expect("text");
        assert_eq!(
            decode_discount_mirror(&text).expect("decode").entries.len(),
            1
        );

        ctx.store
            .mutate(|aggregate| {
                if let Some(record) = aggregate.users.get_mut("11") {
                    record.discount = None;
                }
            })
            .await
            .expect("clear");
        push_discount_mirror(&ctx, now()).await.expect("second push");
        assert_eq!(
            ctx.store.snapshot().await.discount_message_id,
            Some(mirror_id)
        );
        let text = transport
            .fetch_message_text(TEST_NOTIFICATION_CHAT, mirror_id)
            .await
            .expect("fetch")
            .expect("text");
        assert!(decode_discount_mirror(&text).expect("decode").entries.is_empty());
    }
}
