//! Operator-facing messages in the notification chat: the pinned dashboard,
//! one activity record per user, and permanent notifications.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shopbot_store::AdminLogEntry;
use shopbot_telegram::{escape_html, MessengerTransport, OutboundMessage, TransportResult};
use tracing::{debug, error, info, warn};

use crate::remote_mirror::render_summary;
use crate::shop_runtime::RuntimeContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Edited,
    /// Remote content already matched.
    Unchanged,
    Created(i64),
}

/// Edits `existing` in place, or sends a replacement when there is no
/// message to edit or the edit was rejected.
///
/// Retryable failures (rate limits, provider outages) are returned instead of
/// recreating, so a flaky edit never leaves two copies behind.
pub async fn upsert_message(
    transport: &dyn MessengerTransport,
    chat_id: i64,
    existing: Option<i64>,
    message: &OutboundMessage,
) -> TransportResult<UpsertOutcome> {
    if let Some(message_id) = existing {
        match transport.edit_message_text(chat_id, message_id, message).await {
            Ok(()) => return Ok(UpsertOutcome::Edited),
            Err(error) if error.is_not_modified() => return Ok(UpsertOutcome::Unchanged),
            Err(error) if error.retryable => return Err(error),
            Err(error) => {
                debug!(
                    "edit rejected, recreating: message_id={} reason_code={} detail={}",
                    message_id, error.reason_code, error.detail
                );
            }
        }
    }
    let message_id = transport.send_message(chat_id, message).await?;
    Ok(UpsertOutcome::Created(message_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DashboardPlacement {
    /// No dashboard was known yet.
    FirstPost,
    /// The known dashboard could not be edited and was replaced.
    Replaced { previous_message_id: i64 },
}

impl DashboardPlacement {
    pub(crate) fn from_previous(previous: Option<i64>) -> Self {
        match previous {
            None => Self::FirstPost,
            Some(previous_message_id) => Self::Replaced {
                previous_message_id,
            },
        }
    }

    fn log(self, message_id: i64) {
        match self {
            Self::FirstPost => info!("dashboard created: message_id={message_id}"),
            Self::Replaced {
                previous_message_id,
            } => warn!(
                "dashboard recreated: previous_message_id={previous_message_id} message_id={message_id}"
            ),
        }
    }
}

/// Re-renders the dashboard; recreates and pins it when the old one is gone.
pub async fn refresh_dashboard(ctx: &RuntimeContext, now: DateTime<Utc>) -> Result<()> {
    let Some(chat_id) = ctx.config.notification_chat_id else {
        return Ok(());
    };
    let aggregate = ctx.store.snapshot().await;
    let message = render_summary(&aggregate, now)?;
    let outcome = upsert_message(
        ctx.transport.as_ref(),
        chat_id,
        aggregate.pinned_message_id,
        &message,
    )
    .await;
    match outcome {
        Ok(UpsertOutcome::Created(message_id)) => {
            DashboardPlacement::from_previous(aggregate.pinned_message_id).log(message_id);
            ctx.store
                .mutate(|aggregate| aggregate.pinned_message_id = Some(message_id))
                .await?;
            if let Err(error) = ctx.transport.pin_chat_message(chat_id, message_id).await {
                error!(
                    "dashboard pin failed: message_id={} reason_code={} detail={}",
                    message_id, error.reason_code, error.detail
                );
            }
        }
        Ok(_) => {}
        Err(error) => error!(
            "dashboard update failed: reason_code={} detail={}",
            error.reason_code, error.detail
        ),
    }
    Ok(())
}

/// Forgets the dashboard id so the next refresh creates a fresh pinned copy.
pub async fn recreate_dashboard(ctx: &RuntimeContext, now: DateTime<Utc>) -> Result<()> {
    ctx.store
        .mutate(|aggregate| aggregate.pinned_message_id = None)
        .await?;
    refresh_dashboard(ctx, now).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Replaces the header of a user's activity record.
pub enum ActivityHeadline {
    NewUser,
    ReturningUser,
}

fn identity_block(user_id: i64, first_name: &str) -> String {
    format!(
        "<b>ID:</b> <code>{user_id}</code>\n<b>Name:</b> {}",
        escape_html(first_name)
    )
}

fn base_text(user_id: i64, first_name: &str, headline: Option<ActivityHeadline>) -> String {
    let title = match headline {
        Some(ActivityHeadline::NewUser) => "🎉 <b>Neuer Nutzer gestartet!</b>",
        Some(ActivityHeadline::ReturningUser) => "🔄 <b>Wiederkehrender Nutzer!</b>",
        None => "👤 <b>Nutzer-Aktivität</b>",
    };
    format!("{title}\n\n{}", identity_block(user_id, first_name))
}

/// Updates `user_id`'s activity record with `action` as its last line.
///
/// The base text is cached in the store so later actions keep the headline.
pub async fn log_user_activity(
    ctx: &RuntimeContext,
    user_id: i64,
    first_name: &str,
    headline: Option<ActivityHeadline>,
    action: Option<&str>,
) -> Result<()> {
    let Some(chat_id) = ctx.config.notification_chat_id else {
        return Ok(());
    };
    if ctx.config.is_operator(user_id) {
        return Ok(());
    }
    let key = user_id.to_string();
    let entry = ctx
        .store
        .snapshot()
        .await
        .admin_logs
        .get(&key)
        .cloned()
        .unwrap_or_default();
    let base = match (headline, entry.base_text.as_ref()) {
        (Some(_), _) | (None, None) => base_text(user_id, first_name, headline),
        (None, Some(cached)) => cached.clone(),
    };
    let text = match action {
        Some(action) => format!("{base}\n\n<code>Aktion: {}</code>", escape_html(action)),
        None => base.clone(),
    };
    let message = OutboundMessage::html(text);
    let message_id =
        match upsert_message(ctx.transport.as_ref(), chat_id, entry.message_id, &message).await {
            Ok(UpsertOutcome::Created(message_id)) => Some(message_id),
            Ok(_) => entry.message_id,
            Err(error) => {
                error!(
                    "activity log failed: user_id={} reason_code={} detail={}",
                    user_id, error.reason_code, error.detail
                );
                return Ok(());
            }
        };
    ctx.store
        .mutate(|aggregate| {
            aggregate.admin_logs.insert(
                key,
                AdminLogEntry {
                    message_id,
                    base_text: Some(base),
                },
            );
        })
        .await?;
    Ok(())
}

/// Deletes a user's activity record, e.g. when they go back to the main menu.
pub async fn delete_user_log(ctx: &RuntimeContext, user_id: i64) -> Result<()> {
    let Some(chat_id) = ctx.config.notification_chat_id else {
        return Ok(());
    };
    let key = user_id.to_string();
    let Some(message_id) = ctx
        .store
        .snapshot()
        .await
        .admin_logs
        .get(&key)
        .and_then(|entry| entry.message_id)
    else {
        return Ok(());
    };
    match ctx.transport.delete_message(chat_id, message_id).await {
        Ok(()) => {}
        Err(error) if error.is_message_missing() => {
            debug!("activity log already gone: user_id={user_id} message_id={message_id}");
        }
        Err(error) => {
            warn!(
                "activity log delete failed: user_id={} reason_code={} detail={}",
                user_id, error.reason_code, error.detail
            );
            return Ok(());
        }
    }
    ctx.store
        .mutate(|aggregate| {
            aggregate.admin_logs.remove(&key);
        })
        .await?;
    Ok(())
}

/// Posts a notification that is never edited afterwards.
pub async fn send_permanent_notification(ctx: &RuntimeContext, text: String) -> Option<i64> {
    let chat_id = ctx.config.notification_chat_id?;
    match ctx
        .transport
        .send_message(chat_id, &OutboundMessage::html(text))
        .await
    {
        Ok(message_id) => {
            info!("operator notification sent: message_id={message_id}");
            Some(message_id)
        }
        Err(error) => {
            error!(
                "operator notification failed: reason_code={} detail={}",
                error.reason_code, error.detail
            );
            None
        }
    }
}
