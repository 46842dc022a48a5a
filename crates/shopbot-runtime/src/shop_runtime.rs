//! Interaction router and shared runtime context.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use shopbot_core::{current_unix_timestamp_ms, elapsed_ms_since};
use shopbot_store::{StoreHandle, VoucherStore};
use shopbot_telegram::{
    InboundInteraction, InteractionKind, MessengerTransport, OutboundMessage,
};
use tracing::{debug, info, warn};

use crate::admin_log::{upsert_message, UpsertOutcome};
use crate::bot_config::BotConfig;
use crate::media_library::MediaLibrary;
use crate::operator_dialogue::{DialogueState, OperatorDialogues};
use crate::remote_mirror::{recover_from_remote, RecoveryReport};
use crate::storefront::{CustomerSession, StorefrontAction};

pub(crate) const BANNED_TEXT: &str = "⛔️ Du bist von der Nutzung dieses Bots ausgeschlossen.";
pub(crate) const DENIED_TEXT: &str = "⛔️ Du hast keine Berechtigung für diesen Befehl.";

#[derive(Clone)]
/// Collaborators shared by every handler.
pub struct RuntimeContext {
    pub config: Arc<BotConfig>,
    pub store: StoreHandle,
    pub vouchers: VoucherStore,
    pub transport: Arc<dyn MessengerTransport>,
    pub media: Arc<dyn MediaLibrary>,
}

impl RuntimeContext {
    pub fn new(
        config: BotConfig,
        store: StoreHandle,
        vouchers: VoucherStore,
        transport: Arc<dyn MessengerTransport>,
        media: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            vouchers,
            transport,
            media,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Handled,
    /// Banned user; answered with the exclusion notice only.
    Excluded,
    /// Operator-only surface used by someone else.
    Denied,
    Ignored,
}

impl RouteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Excluded => "excluded",
            Self::Denied => "denied",
            Self::Ignored => "ignored",
        }
    }
}

/// Single consumer of inbound interactions.
///
/// Customer sessions and operator dialogues live in memory only; a restart
/// drops them.
pub struct ShopRuntime {
    pub(crate) ctx: RuntimeContext,
    pub(crate) sessions: HashMap<i64, CustomerSession>,
    pub(crate) dialogues: OperatorDialogues,
}

impl ShopRuntime {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            sessions: HashMap::new(),
            dialogues: OperatorDialogues::default(),
        }
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn dialogue_state(&self, operator_id: i64) -> DialogueState {
        self.dialogues.state(operator_id)
    }

    /// Startup catch-up from the remote mirrors.
    pub async fn recover(&self) -> RecoveryReport {
        let report = recover_from_remote(&self.ctx).await;
        info!(
            "startup recovery finished: summary_restored={} legacy_summary={} placeholders_added={} discounts_restored={} discounts_skipped={} warnings={}",
            report.summary_restored,
            report.legacy_summary,
            report.placeholders_added,
            report.discounts_restored,
            report.discounts_skipped,
            report.warnings.len()
        );
        report
    }

    pub async fn handle(
        &mut self,
        interaction: &InboundInteraction,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let started_ms = current_unix_timestamp_ms();
        if let InteractionKind::Button { callback_id, .. } = &interaction.kind {
            if let Err(error) = self.ctx.transport.answer_callback(callback_id).await {
                debug!(
                    "callback answer failed: callback_id={} reason_code={}",
                    callback_id, error.reason_code
                );
            }
        }

        let outcome = if self.is_excluded(interaction.user_id).await {
            self.send(interaction.chat_id, OutboundMessage::plain(BANNED_TEXT))
                .await;
            RouteOutcome::Excluded
        } else {
            match &interaction.kind {
                InteractionKind::Command { name, args } => {
                    self.route_command(interaction, name, args, now).await?
                }
                InteractionKind::Button {
                    data, message_id, ..
                } => self.route_button(interaction, data, *message_id, now).await?,
                InteractionKind::Text(text) => self.route_text(interaction, text, now).await?,
            }
        };
        debug!(
            "interaction routed: update_id={} user_id={} outcome={} elapsed_ms={}",
            interaction.update_id,
            interaction.user_id,
            outcome.as_str(),
            elapsed_ms_since(started_ms)
        );
        Ok(outcome)
    }

    async fn is_excluded(&self, user_id: i64) -> bool {
        !self.ctx.config.is_operator(user_id)
            && self
                .ctx
                .store
                .snapshot()
                .await
                .is_banned(&user_id.to_string())
    }

    async fn route_command(
        &mut self,
        interaction: &InboundInteraction,
        name: &str,
        args: &[String],
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let operator_only = matches!(name, "admin" | "addvoucher" | "setsummary" | "cancel");
        if operator_only && !self.ctx.config.is_operator(interaction.user_id) {
            return Ok(self.deny(interaction).await);
        }
        match name {
            "start" => {
                self.handle_start(interaction, args.first().map(String::as_str), now)
                    .await
            }
            "admin" => self.show_admin_menu(interaction.chat_id, None).await,
            "addvoucher" => self.add_voucher_command(interaction, args).await,
            "setsummary" => self.set_summary_command(interaction, now).await,
            "cancel" => self.cancel_dialogue(interaction, now).await,
            _ => Ok(RouteOutcome::Ignored),
        }
    }

    async fn route_button(
        &mut self,
        interaction: &InboundInteraction,
        data: &str,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        if data.starts_with("admin_") || data.starts_with("dlg:") {
            if !self.ctx.config.is_operator(interaction.user_id) {
                return Ok(self.deny(interaction).await);
            }
            return self
                .handle_operator_button(interaction, data, message_id, now)
                .await;
        }
        match StorefrontAction::parse(data) {
            Some(action) => {
                self.handle_storefront(interaction, action, message_id, now)
                    .await
            }
            None => {
                debug!("unknown button ignored: user_id={} data={}", interaction.user_id, data);
                Ok(RouteOutcome::Ignored)
            }
        }
    }

    async fn route_text(
        &mut self,
        interaction: &InboundInteraction,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let awaiting_voucher = self
            .sessions
            .get(&interaction.user_id)
            .and_then(|session| session.awaiting_voucher);
        if let Some(pending) = awaiting_voucher {
            return self.submit_voucher(interaction, pending, text).await;
        }
        if self.ctx.config.is_operator(interaction.user_id)
            && self.dialogues.is_active(interaction.user_id)
        {
            return self.handle_dialogue_text(interaction, text, now).await;
        }
        Ok(RouteOutcome::Ignored)
    }

    async fn deny(&self, interaction: &InboundInteraction) -> RouteOutcome {
        warn!(
            "operator surface denied: user_id={} chat_id={}",
            interaction.user_id, interaction.chat_id
        );
        self.send(interaction.chat_id, OutboundMessage::plain(DENIED_TEXT))
            .await;
        RouteOutcome::Denied
    }

    /// Edits `editable` when given, otherwise (or when the edit is rejected)
    /// sends a new message. Returns the id now showing the content.
    pub(crate) async fn respond(
        &self,
        chat_id: i64,
        editable: Option<i64>,
        message: OutboundMessage,
    ) -> Option<i64> {
        match upsert_message(self.ctx.transport.as_ref(), chat_id, editable, &message).await {
            Ok(UpsertOutcome::Created(message_id)) => Some(message_id),
            Ok(_) => editable,
            Err(error) => {
                warn!(
                    "reply failed: chat_id={} reason_code={} detail={}",
                    chat_id, error.reason_code, error.detail
                );
                None
            }
        }
    }

    pub(crate) async fn send(&self, chat_id: i64, message: OutboundMessage) -> Option<i64> {
        self.respond(chat_id, None, message).await
    }
}

#[cfg(test)]
pub(crate) const TEST_OPERATOR: i64 = 1;
#[cfg(test)]
pub(crate) const TEST_NOTIFICATION_CHAT: i64 = -100;

#[cfg(test)]
/// Context over an in-memory store and transport with the operator and
/// notification chat set.
pub(crate) fn test_harness(
    initial: shopbot_store::Aggregate,
) -> (RuntimeContext, Arc<shopbot_telegram::InMemoryTransport>) {
    let transport = Arc::new(shopbot_telegram::InMemoryTransport::new());
    let mut config = BotConfig::new(TEST_OPERATOR);
    config.notification_chat_id = Some(TEST_NOTIFICATION_CHAT);
    config.payout.paypal_user = "shopdemo".to_string();
    config.payout.btc_wallet = "bc1qdemo".to_string();
    config.payout.eth_wallet = "0xdemo".to_string();
    let ctx = RuntimeContext::new(
        config,
        StoreHandle::in_memory(initial),
        VoucherStore::in_memory(),
        transport.clone(),
        Arc::new(crate::media_library::ManifestMediaLibrary::default()),
    );
    (ctx, transport)
}

#[cfg(test)]
impl RuntimeContext {
    pub(crate) fn in_memory(initial: shopbot_store::Aggregate) -> Self {
        test_harness(initial).0
    }
}
