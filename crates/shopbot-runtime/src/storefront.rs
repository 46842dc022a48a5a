//! Customer-facing flow: welcome menu, previews, prices, package choice and
//! payment instructions.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use shopbot_promo::{
    process_referral_reward, quote_package, register_preview_click, PreviewDecision, PriceQuote,
    ReferralReward,
};
use shopbot_store::{EventName, MediaType, PackageKey, Segment, VoucherProvider};
use shopbot_telegram::{escape_html, InboundInteraction, InlineButton, InlineKeyboard, OutboundMessage};
use tracing::{debug, error, info};

use crate::admin_log::{
    delete_user_log, log_user_activity, send_permanent_notification, ActivityHeadline,
};
use crate::bot_config::CryptoCoin;
use crate::media_library::MediaKind;
use crate::remote_mirror::push_discount_mirror;
use crate::session_tracker::{begin_session, record_event, SessionKind};
use crate::shop_runtime::{RouteOutcome, ShopRuntime};

const NOT_FOUND_TEXT: &str = "Ups! Ich konnte gerade keine passenden Inhalte finden...";
const PREVIEW_LIMIT_TEXT: &str =
    "Du hast das Vorschau-Limit erreicht. Schau dir gern die Preise & Pakete an.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Voucher code the customer was asked to type next.
pub struct PendingVoucher {
    pub provider: VoucherProvider,
    pub package: PackageKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerSession {
    pub preview_index: BTreeMap<Segment, usize>,
    /// Photo and caption of the last preview or price view.
    pub cleanup: Vec<i64>,
    pub awaiting_voucher: Option<PendingVoucher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuIntent {
    Preview,
    Prices,
}

impl MenuIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Prices => "prices",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "preview" => Some(Self::Preview),
            "prices" => Some(Self::Prices),
            _ => None,
        }
    }

    fn event(self, segment: Segment) -> EventName {
        match self {
            Self::Preview => EventName::preview(segment),
            Self::Prices => EventName::prices(segment),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Preview => "Vorschau",
            Self::Prices => "Preise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Paypal,
    Voucher,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paypal => "paypal",
            Self::Voucher => "voucher",
            Self::Crypto => "crypto",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Paypal => "PayPal",
            Self::Voucher => "Gutschein",
            Self::Crypto => "Krypto",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "paypal" => Some(Self::Paypal),
            "voucher" => Some(Self::Voucher),
            "crypto" => Some(Self::Crypto),
            _ => None,
        }
    }

    pub fn event(self) -> EventName {
        match self {
            Self::Paypal => EventName::PaymentPaypal,
            Self::Voucher => EventName::PaymentVoucher,
            Self::Crypto => EventName::PaymentCrypto,
        }
    }

    fn activity_line(self, price: u32) -> String {
        match self {
            Self::Paypal => format!("💰 PayPal für {price}€"),
            Self::Voucher => format!("🎟️ Gutschein für {price}€"),
            Self::Crypto => format!("🪙 Krypto für {price}€"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Customer button payloads.
pub enum StorefrontAction {
    MainMenu,
    ShowOptions(MenuIntent),
    SelectSegment {
        segment: Segment,
        intent: MenuIntent,
    },
    NextPreview(Segment),
    SelectPackage(PackageKey),
    Pay {
        method: PaymentMethod,
        package: PackageKey,
    },
    ShowWallet {
        coin: CryptoCoin,
        package: PackageKey,
    },
    ChooseVoucher {
        provider: VoucherProvider,
        package: PackageKey,
    },
}

fn parse_package(media: &str, amount: &str) -> Option<PackageKey> {
    let media_type = MediaType::parse(media)?;
    let amount = amount.parse::<u32>().ok()?;
    PackageKey::new(media_type, amount).ok()
}

fn package_suffix(package: PackageKey) -> String {
    format!("{}:{}", package.media_type().as_str(), package.amount())
}

impl StorefrontAction {
    pub fn parse(data: &str) -> Option<Self> {
        let parts = data.split(':').collect::<Vec<_>>();
        match parts.as_slice() {
            ["main_menu"] => Some(Self::MainMenu),
            ["show_preview_options"] => Some(Self::ShowOptions(MenuIntent::Preview)),
            ["show_price_options"] => Some(Self::ShowOptions(MenuIntent::Prices)),
            ["select_segment", segment, intent] => Some(Self::SelectSegment {
                segment: Segment::parse(segment)?,
                intent: MenuIntent::parse(intent)?,
            }),
            ["next_preview", segment] => Some(Self::NextPreview(Segment::parse(segment)?)),
            ["select_package", media, amount] => {
                parse_package(media, amount).map(Self::SelectPackage)
            }
            ["show_wallet", coin, media, amount] => Some(Self::ShowWallet {
                coin: CryptoCoin::parse(coin)?,
                package: parse_package(media, amount)?,
            }),
            ["voucher_provider", provider, media, amount] => Some(Self::ChooseVoucher {
                provider: VoucherProvider::parse(provider)?,
                package: parse_package(media, amount)?,
            }),
            [verb, media, amount] => {
                let method = PaymentMethod::parse(verb.strip_prefix("pay_")?)?;
                Some(Self::Pay {
                    method,
                    package: parse_package(media, amount)?,
                })
            }
            _ => None,
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            Self::MainMenu => "main_menu".to_string(),
            Self::ShowOptions(MenuIntent::Preview) => "show_preview_options".to_string(),
            Self::ShowOptions(MenuIntent::Prices) => "show_price_options".to_string(),
            Self::SelectSegment { segment, intent } => {
                format!("select_segment:{}:{}", segment.code(), intent.as_str())
            }
            Self::NextPreview(segment) => format!("next_preview:{}", segment.code()),
            Self::SelectPackage(package) => format!("select_package:{}", package_suffix(*package)),
            Self::Pay { method, package } => {
                format!("pay_{}:{}", method.as_str(), package_suffix(*package))
            }
            Self::ShowWallet { coin, package } => {
                format!("show_wallet:{}:{}", coin.code(), package_suffix(*package))
            }
            Self::ChooseVoucher { provider, package } => format!(
                "voucher_provider:{}:{}",
                provider.as_str(),
                package_suffix(*package)
            ),
        }
    }

    fn button(self, text: impl Into<String>) -> InlineButton {
        InlineButton::callback(text, self.callback_data())
    }
}

fn welcome_message(discount_line: Option<String>) -> OutboundMessage {
    let mut text = "Herzlich Willkommen! ✨\n\nHier kannst du eine Vorschau der Inhalte sehen oder direkt ein Paket auswählen. Die gesamte Bedienung erfolgt über die Buttons.".to_string();
    if let Some(line) = discount_line {
        text.push_str("\n\n");
        text.push_str(&line);
    }
    OutboundMessage::html(text).with_keyboard(
        InlineKeyboard::new()
            .row(vec![
                StorefrontAction::ShowOptions(MenuIntent::Preview).button("👀 Vorschau")
            ])
            .row(vec![
                StorefrontAction::ShowOptions(MenuIntent::Prices).button("💶 Preise & Pakete")
            ]),
    )
}

fn back_to_menu(label: &str) -> InlineKeyboard {
    InlineKeyboard::new().row(vec![StorefrontAction::MainMenu.button(label)])
}

fn price_label(quote: &PriceQuote) -> String {
    if quote.is_discounted() {
        format!("<s>{}€</s> <b>{}€</b>", quote.base_price, quote.final_price())
    } else {
        format!("<b>{}€</b>", quote.final_price())
    }
}

fn package_button_text(quote: &PriceQuote) -> String {
    if quote.is_discounted() {
        format!(
            "{} · {}€ statt {}€",
            quote.package.label(),
            quote.final_price(),
            quote.base_price
        )
    } else {
        format!("{} · {}€", quote.package.label(), quote.final_price())
    }
}

impl ShopRuntime {
    fn session_mut(&mut self, user_id: i64) -> &mut CustomerSession {
        self.sessions.entry(user_id).or_default()
    }

    async fn quote(&self, user_id: i64, package: PackageKey) -> PriceQuote {
        let aggregate = self.ctx.store.snapshot().await;
        let descriptor = aggregate
            .users
            .get(&user_id.to_string())
            .and_then(|record| record.discount.as_ref());
        quote_package(&self.ctx.config.catalogue, descriptor, package)
    }

    async fn discount_line(&self, user_id: i64) -> Option<String> {
        let aggregate = self.ctx.store.snapshot().await;
        let descriptor = aggregate.users.get(&user_id.to_string())?.discount.as_ref()?;
        Some(format!(
            "🏷️ Dein Rabatt: <b>{}</b>",
            escape_html(&descriptor.describe())
        ))
    }

    async fn cleanup_previous(&mut self, chat_id: i64, user_id: i64) {
        let stale = std::mem::take(&mut self.session_mut(user_id).cleanup);
        for message_id in stale {
            if let Err(error) = self.ctx.transport.delete_message(chat_id, message_id).await {
                debug!(
                    "stale message not deleted: chat_id={} message_id={} reason_code={}",
                    chat_id, message_id, error.reason_code
                );
            }
        }
    }

    async fn delete_quietly(&self, chat_id: i64, message_id: Option<i64>) {
        let Some(message_id) = message_id else {
            return;
        };
        if let Err(error) = self.ctx.transport.delete_message(chat_id, message_id).await {
            debug!(
                "menu message not deleted: chat_id={} message_id={} reason_code={}",
                chat_id, message_id, error.reason_code
            );
        }
    }

    async fn log_action(&self, interaction: &InboundInteraction, action: &str) -> Result<()> {
        log_user_activity(
            &self.ctx,
            interaction.user_id,
            &interaction.first_name,
            None,
            Some(action),
        )
        .await
    }

    /// `/start [ref_<id>]`.
    pub(crate) async fn handle_start(
        &mut self,
        interaction: &InboundInteraction,
        start_arg: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let user_id = interaction.user_id;
        let outcome = begin_session(&self.ctx, user_id, &interaction.first_name, start_arg, now)
            .await?;
        record_event(&self.ctx, user_id, EventName::StartCommand, now).await?;
        if outcome.should_notify() {
            let headline = match outcome.kind {
                SessionKind::New => ActivityHeadline::NewUser,
                _ => ActivityHeadline::ReturningUser,
            };
            log_user_activity(
                &self.ctx,
                user_id,
                &interaction.first_name,
                Some(headline),
                None,
            )
            .await?;
        }
        if let Some(referrer_id) = outcome.referrer_id.as_deref() {
            info!("referral linked: referrer={referrer_id} referred={user_id}");
        }
        if let Some(descriptor) = outcome.auto_discount.as_ref() {
            push_discount_mirror(&self.ctx, now).await?;
            let text = format!(
                "🎁 <b>Überraschung!</b>\n\nFür dich gibt es ab sofort einen Rabatt: <b>{}</b>. Er wird bei allen Paketen automatisch berücksichtigt.",
                escape_html(&descriptor.describe())
            );
            self.send(interaction.chat_id, OutboundMessage::html(text))
                .await;
        }
        self.cleanup_previous(interaction.chat_id, user_id).await;
        self.sessions.insert(user_id, CustomerSession::default());
        let welcome = welcome_message(self.discount_line(user_id).await);
        self.send(interaction.chat_id, welcome).await;
        Ok(RouteOutcome::Handled)
    }

    pub(crate) async fn handle_storefront(
        &mut self,
        interaction: &InboundInteraction,
        action: StorefrontAction,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        if !matches!(action, StorefrontAction::ChooseVoucher { .. }) {
            self.session_mut(interaction.user_id).awaiting_voucher = None;
        }
        match action {
            StorefrontAction::MainMenu => self.show_main_menu(interaction, message_id).await?,
            StorefrontAction::ShowOptions(intent) => {
                self.show_segment_options(interaction, intent, message_id)
                    .await?
            }
            StorefrontAction::SelectSegment { segment, intent } => {
                self.open_segment(interaction, segment, intent, message_id, now)
                    .await?
            }
            StorefrontAction::NextPreview(segment) => {
                self.next_preview(interaction, segment, now).await?
            }
            StorefrontAction::SelectPackage(package) => {
                self.select_package(interaction, package, message_id, now)
                    .await?
            }
            StorefrontAction::Pay { method, package } => {
                self.choose_payment(interaction, method, package, message_id, now)
                    .await?
            }
            StorefrontAction::ShowWallet { coin, package } => {
                self.show_wallet(interaction, coin, package, message_id)
                    .await
            }
            StorefrontAction::ChooseVoucher { provider, package } => {
                self.session_mut(interaction.user_id).awaiting_voucher =
                    Some(PendingVoucher { provider, package });
                let text = format!(
                    "Bitte sende mir jetzt deinen {}-Gutschein-Code als einzelne Nachricht.",
                    provider.display_name()
                );
                let keyboard = InlineKeyboard::new().row(vec![StorefrontAction::Pay {
                    method: PaymentMethod::Voucher,
                    package,
                }
                .button("Abbrechen")]);
                self.respond(
                    interaction.chat_id,
                    message_id,
                    OutboundMessage::plain(text).with_keyboard(keyboard),
                )
                .await;
            }
        }
        Ok(RouteOutcome::Handled)
    }

    /// Back to the welcome screen. Not counted as a start.
    async fn show_main_menu(
        &mut self,
        interaction: &InboundInteraction,
        message_id: Option<i64>,
    ) -> Result<()> {
        delete_user_log(&self.ctx, interaction.user_id).await?;
        self.cleanup_previous(interaction.chat_id, interaction.user_id)
            .await;
        self.sessions
            .insert(interaction.user_id, CustomerSession::default());
        let welcome = welcome_message(self.discount_line(interaction.user_id).await);
        self.respond(interaction.chat_id, message_id, welcome).await;
        Ok(())
    }

    async fn show_segment_options(
        &mut self,
        interaction: &InboundInteraction,
        intent: MenuIntent,
        message_id: Option<i64>,
    ) -> Result<()> {
        if intent == MenuIntent::Prices {
            delete_user_log(&self.ctx, interaction.user_id).await?;
        }
        self.cleanup_previous(interaction.chat_id, interaction.user_id)
            .await;
        let keyboard = InlineKeyboard::new()
            .row(
                Segment::ALL
                    .into_iter()
                    .map(|segment| {
                        StorefrontAction::SelectSegment { segment, intent }
                            .button(format!("Kollektion {}", segment.label()))
                    })
                    .collect(),
            )
            .row(vec![StorefrontAction::MainMenu.button("« Zurück")]);
        let message =
            OutboundMessage::plain("Welche Kollektion möchtest du sehen?").with_keyboard(keyboard);
        self.respond(interaction.chat_id, message_id, message).await;
        Ok(())
    }

    /// Counts a preview click for customers. The operator is never limited.
    async fn preview_allowed(&self, user_id: i64, segment: Segment) -> Result<bool> {
        if self.ctx.config.is_operator(user_id) {
            return Ok(true);
        }
        let key = user_id.to_string();
        let decision = self
            .ctx
            .store
            .mutate(|aggregate| {
                aggregate
                    .users
                    .get_mut(&key)
                    .map(|record| register_preview_click(record, segment))
            })
            .await?;
        Ok(!matches!(decision, Some(PreviewDecision::LimitReached)))
    }

    async fn open_segment(
        &mut self,
        interaction: &InboundInteraction,
        segment: Segment,
        intent: MenuIntent,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.cleanup_previous(interaction.chat_id, interaction.user_id)
            .await;
        self.delete_quietly(interaction.chat_id, message_id).await;
        record_event(&self.ctx, interaction.user_id, intent.event(segment), now).await?;
        self.log_action(
            interaction,
            &format!("Schaut sich {} von {} an", intent.label(), segment.label()),
        )
        .await?;
        match intent {
            MenuIntent::Preview => {
                if self.preview_allowed(interaction.user_id, segment).await? {
                    self.send_preview(interaction, segment, 0).await;
                } else {
                    self.send_preview_limit(interaction.chat_id).await;
                }
            }
            MenuIntent::Prices => self.send_price_list(interaction, segment, now).await,
        }
        Ok(())
    }

    async fn next_preview(
        &mut self,
        interaction: &InboundInteraction,
        segment: Segment,
        now: DateTime<Utc>,
    ) -> Result<()> {
        record_event(&self.ctx, interaction.user_id, EventName::NextPreview, now).await?;
        self.log_action(interaction, &format!("Nächstes Bild ({})", segment.label()))
            .await?;
        self.cleanup_previous(interaction.chat_id, interaction.user_id)
            .await;
        if !self.preview_allowed(interaction.user_id, segment).await? {
            self.send_preview_limit(interaction.chat_id).await;
            return Ok(());
        }
        let next = self
            .sessions
            .get(&interaction.user_id)
            .and_then(|session| session.preview_index.get(&segment).copied())
            .map(|index| index + 1)
            .unwrap_or(0);
        self.send_preview(interaction, segment, next).await;
        Ok(())
    }

    async fn send_not_found(&self, chat_id: i64) {
        self.send(
            chat_id,
            OutboundMessage::plain(NOT_FOUND_TEXT).with_keyboard(back_to_menu("« Zurück")),
        )
        .await;
    }

    async fn send_preview_limit(&self, chat_id: i64) {
        let keyboard = InlineKeyboard::new()
            .row(vec![
                StorefrontAction::ShowOptions(MenuIntent::Prices).button("🛍️ Zu den Preisen")
            ])
            .row(vec![StorefrontAction::MainMenu.button("« Zurück zum Hauptmenü")]);
        self.send(
            chat_id,
            OutboundMessage::plain(PREVIEW_LIMIT_TEXT).with_keyboard(keyboard),
        )
        .await;
    }

    /// Shows preview `index` (wrapping) with its caption and remembers both
    /// messages for cleanup.
    async fn send_preview(&mut self, interaction: &InboundInteraction, segment: Segment, index: usize) {
        let assets = self.ctx.media.assets(segment, MediaKind::Preview);
        if assets.is_empty() {
            self.send_not_found(interaction.chat_id).await;
            return;
        }
        let index = index % assets.len();
        let chat_id = interaction.chat_id;
        let mut shown = Vec::new();
        match self.ctx.transport.send_photo(chat_id, &assets[index]).await {
            Ok(photo_id) => shown.push(photo_id),
            Err(error) => error!(
                "preview photo failed: chat_id={} reason_code={} detail={}",
                chat_id, error.reason_code, error.detail
            ),
        }
        let caption = format!(
            "Vorschau der Kollektion {} ({}/{})",
            segment.label(),
            index + 1,
            assets.len()
        );
        let keyboard = InlineKeyboard::new()
            .row(vec![StorefrontAction::SelectSegment {
                segment,
                intent: MenuIntent::Prices,
            }
            .button("🛍️ Zu den Preisen")])
            .row(vec![
                StorefrontAction::NextPreview(segment).button("🖼️ Nächstes Bild")
            ])
            .row(vec![StorefrontAction::MainMenu.button("« Zurück zum Hauptmenü")]);
        if let Some(caption_id) = self
            .send(chat_id, OutboundMessage::plain(caption).with_keyboard(keyboard))
            .await
        {
            shown.push(caption_id);
        }
        let session = self.session_mut(interaction.user_id);
        session.preview_index.insert(segment, index);
        session.cleanup = shown;
    }

    async fn send_price_list(
        &mut self,
        interaction: &InboundInteraction,
        segment: Segment,
        now: DateTime<Utc>,
    ) {
        let assets = self.ctx.media.assets(segment, MediaKind::Prices);
        if assets.is_empty() {
            self.send_not_found(interaction.chat_id).await;
            return;
        }
        let chat_id = interaction.chat_id;
        let rotation = usize::try_from(now.timestamp().unsigned_abs()).unwrap_or_default();
        let mut shown = Vec::new();
        match self
            .ctx
            .transport
            .send_photo(chat_id, &assets[rotation % assets.len()])
            .await
        {
            Ok(photo_id) => shown.push(photo_id),
            Err(error) => error!(
                "price photo failed: chat_id={} reason_code={} detail={}",
                chat_id, error.reason_code, error.detail
            ),
        }
        let mut keyboard = InlineKeyboard::new();
        for amount in shopbot_store::PACKAGE_AMOUNTS {
            let mut row = Vec::new();
            for media_type in MediaType::ALL {
                let Ok(package) = PackageKey::new(media_type, amount) else {
                    continue;
                };
                let quote = self.quote(interaction.user_id, package).await;
                row.push(StorefrontAction::SelectPackage(package).button(package_button_text(&quote)));
            }
            keyboard = keyboard.row(row);
        }
        keyboard = keyboard.row(vec![StorefrontAction::MainMenu.button("« Zurück zum Hauptmenü")]);
        if let Some(list_id) = self
            .send(
                chat_id,
                OutboundMessage::plain("Wähle dein gewünschtes Paket:").with_keyboard(keyboard),
            )
            .await
        {
            shown.push(list_id);
        }
        self.session_mut(interaction.user_id).cleanup = shown;
    }

    fn payment_keyboard(package: PackageKey) -> InlineKeyboard {
        let pay = |method| StorefrontAction::Pay { method, package };
        InlineKeyboard::new()
            .row(vec![pay(PaymentMethod::Paypal).button("💳 PayPal")])
            .row(vec![pay(PaymentMethod::Voucher).button("🎟️ Gutschein")])
            .row(vec![pay(PaymentMethod::Crypto).button("🪙 Krypto")])
            .row(vec![
                StorefrontAction::ShowOptions(MenuIntent::Prices).button("« Zurück zu den Preisen")
            ])
    }

    async fn select_package(
        &mut self,
        interaction: &InboundInteraction,
        package: PackageKey,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        record_event(&self.ctx, interaction.user_id, EventName::PackageSelected, now).await?;
        let quote = self.quote(interaction.user_id, package).await;
        let text = format!(
            "Du hast das Paket <b>{}</b> für {} ausgewählt.\n\nWie möchtest du bezahlen?",
            package.label(),
            price_label(&quote)
        );
        let message = OutboundMessage::html(text).with_keyboard(Self::payment_keyboard(package));
        let came_from_price_list = self
            .sessions
            .get(&interaction.user_id)
            .map(|session| !session.cleanup.is_empty())
            .unwrap_or(false);
        if came_from_price_list {
            self.cleanup_previous(interaction.chat_id, interaction.user_id)
                .await;
            self.send(interaction.chat_id, message).await;
        } else {
            self.respond(interaction.chat_id, message_id, message).await;
        }
        Ok(())
    }

    async fn choose_payment(
        &mut self,
        interaction: &InboundInteraction,
        method: PaymentMethod,
        package: PackageKey,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user_id = interaction.user_id;
        let price = self.quote(user_id, package).await.final_price();
        record_event(&self.ctx, user_id, method.event(), now).await?;
        self.log_action(interaction, &method.activity_line(price))
            .await?;
        if !self.ctx.config.is_operator(user_id) {
            let key = user_id.to_string();
            let attempt = format!("({}, {price}€)", method.display_name());
            let reward = self
                .ctx
                .store
                .mutate(|aggregate| {
                    if let Some(record) = aggregate.users.get_mut(&key) {
                        record.record_payment_attempt(attempt);
                    }
                    process_referral_reward(aggregate, &key)
                })
                .await?;
            if let Some(reward) = reward {
                self.announce_referral_reward(interaction, &reward).await;
            }
        }

        let back = StorefrontAction::SelectPackage(package).button("« Zurück zur Bezahlwahl");
        let message = match method {
            PaymentMethod::Paypal => {
                let text = format!(
                    "Super! Klicke auf den Link, um die Zahlung für <b>{}</b> in Höhe von <b>{price}€</b> abzuschließen.\n\nGib als Verwendungszweck bitte deinen Telegram-Namen an.",
                    package.label()
                );
                OutboundMessage::html(text)
                    .with_keyboard(
                        InlineKeyboard::new()
                            .row(vec![InlineButton::link(
                                "➡️ Hier sicher bezahlen",
                                self.ctx.config.paypal_link(price),
                            )])
                            .row(vec![back]),
                    )
                    .without_link_preview()
            }
            PaymentMethod::Voucher => {
                let row = VoucherProvider::ALL
                    .into_iter()
                    .map(|provider| {
                        StorefrontAction::ChooseVoucher { provider, package }
                            .button(provider.display_name())
                    })
                    .collect();
                OutboundMessage::plain("Welchen Gutschein möchtest du einlösen?")
                    .with_keyboard(InlineKeyboard::new().row(row).row(vec![back]))
            }
            PaymentMethod::Crypto => {
                let row = [CryptoCoin::Btc, CryptoCoin::Eth]
                    .into_iter()
                    .map(|coin| {
                        StorefrontAction::ShowWallet { coin, package }.button(coin.display_name())
                    })
                    .collect();
                OutboundMessage::plain("Bitte wähle die gewünschte Kryptowährung:")
                    .with_keyboard(InlineKeyboard::new().row(row).row(vec![back]))
            }
        };
        self.respond(interaction.chat_id, message_id, message).await;
        Ok(())
    }

    async fn announce_referral_reward(
        &self,
        interaction: &InboundInteraction,
        reward: &ReferralReward,
    ) {
        info!(
            "referral reward granted: referrer={} referred={} total={}",
            reward.referrer_id, reward.referred_id, reward.successful_referrals
        );
        if let Ok(referrer_chat) = reward.referrer_id.parse::<i64>() {
            let text = format!(
                "🎉 Deine Einladung hat sich gelohnt! Bisher erfolgreiche Empfehlungen: <b>{}</b>.",
                reward.successful_referrals
            );
            self.send(referrer_chat, OutboundMessage::html(text)).await;
        }
        send_permanent_notification(
            &self.ctx,
            format!(
                "🤝 <b>Empfehlung erfolgreich!</b>\n\n<b>Werber:</b> <code>{}</code>\n<b>Neuer Nutzer:</b> <code>{}</code> ({})\n<b>Erfolgreiche Empfehlungen:</b> {}",
                escape_html(&reward.referrer_id),
                escape_html(&reward.referred_id),
                escape_html(&interaction.first_name),
                reward.successful_referrals
            ),
        )
        .await;
    }

    async fn show_wallet(
        &self,
        interaction: &InboundInteraction,
        coin: CryptoCoin,
        package: PackageKey,
        message_id: Option<i64>,
    ) {
        let price = self.quote(interaction.user_id, package).await.final_price();
        let text = format!(
            "Zahlung mit <b>{}</b>\n\nBitte sende den Gegenwert von <b>{price}€</b> für <b>{}</b> an folgende Adresse:\n\n<code>{}</code>\n\nSchicke danach bitte einen Screenshot der Transaktion.",
            coin.display_name(),
            package.label(),
            escape_html(self.ctx.config.wallet(coin))
        );
        let keyboard = InlineKeyboard::new().row(vec![StorefrontAction::Pay {
            method: PaymentMethod::Crypto,
            package,
        }
        .button("« Zurück zur Krypto-Wahl")]);
        self.respond(
            interaction.chat_id,
            message_id,
            OutboundMessage::html(text).with_keyboard(keyboard),
        )
        .await;
    }

    /// Free text while a voucher code is expected.
    pub(crate) async fn submit_voucher(
        &mut self,
        interaction: &InboundInteraction,
        pending: PendingVoucher,
        text: &str,
    ) -> Result<RouteOutcome> {
        let code = text.trim();
        if code.is_empty() {
            return Ok(RouteOutcome::Ignored);
        }
        if let Err(error) = self.ctx.vouchers.append(pending.provider, code) {
            error!(
                "voucher not stored: user_id={} provider={} error={error:#}",
                interaction.user_id,
                pending.provider.as_str()
            );
            self.send(
                interaction.chat_id,
                OutboundMessage::plain(
                    "Der Gutschein konnte gerade nicht gespeichert werden. Bitte sende ihn noch einmal.",
                ),
            )
            .await;
            return Ok(RouteOutcome::Handled);
        }
        self.session_mut(interaction.user_id).awaiting_voucher = None;
        info!(
            "voucher received: user_id={} provider={} package={}",
            interaction.user_id,
            pending.provider.as_str(),
            pending.package
        );
        send_permanent_notification(
            &self.ctx,
            format!(
                "📬 <b>Neuer Gutschein erhalten!</b>\n\n<b>Anbieter:</b> {}\n<b>Code:</b> <code>{}</code>\n<b>Paket:</b> {}\n<b>Von Nutzer:</b> <code>{}</code> ({})",
                pending.provider.display_name(),
                escape_html(code),
                pending.package.label(),
                interaction.user_id,
                escape_html(&interaction.first_name)
            ),
        )
        .await;
        self.send(
            interaction.chat_id,
            OutboundMessage::plain("Vielen Dank! Dein Gutschein wurde übermittelt und wird geprüft."),
        )
        .await;
        let welcome = welcome_message(self.discount_line(interaction.user_id).await);
        self.send(interaction.chat_id, welcome).await;
        Ok(RouteOutcome::Handled)
    }
}
