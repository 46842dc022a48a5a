//! Operator surface: admin menu, statistics, voucher views, resets, and the
//! side effects of finished dialogues.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use shopbot_promo::{apply_preview_limit_action, PreviewLimitAction};
use shopbot_store::{DiscountDescriptor, DiscountKind, PackageKey, VoucherProvider};
use shopbot_telegram::{
    escape_html, visible_text, InboundInteraction, InlineButton, InlineKeyboard, OutboundMessage,
    ParseMode, MESSAGE_TEXT_LIMIT,
};
use tracing::{debug, error, info};

use crate::admin_log::{recreate_dashboard, refresh_dashboard};
use crate::operator_dialogue::{
    advance, DialogueCommit, DialogueEffect, DialogueFlow, DialogueInput, DialogueState,
    DiscountTarget, InputProblem, TargetChoice,
};
use crate::remote_mirror::push_discount_mirror;
use crate::shop_runtime::{RouteOutcome, ShopRuntime};

const ACTIVE_WINDOW_HOURS: i64 = 24;
/// Room kept free in list panels for the title and the "more" line.
const PANEL_HEADROOM: usize = 256;

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Joins HTML `lines` while their visible text fits in `budget`; whatever is
/// left over is counted in a closing line.
fn bounded_lines(lines: &[String], budget: usize) -> String {
    let mut shown = Vec::new();
    let mut used = 0;
    for (index, line) in lines.iter().enumerate() {
        let cost = utf16_len(&visible_text(line, Some(ParseMode::Html))) + 1;
        if used + cost > budget {
            shown.push(format!("<i>… und {} weitere</i>", lines.len() - index));
            break;
        }
        used += cost;
        shown.push(line.clone());
    }
    shown.join("\n")
}

/// Splits plain text into message-sized parts, on line breaks where possible.
fn split_plain_text(text: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let mut line = line.to_string();
        while utf16_len(&line) > limit {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            let mut head = String::new();
            let mut rest = line.chars();
            for ch in rest.by_ref() {
                if utf16_len(&head) + ch.len_utf16() > limit {
                    parts.push(std::mem::take(&mut head));
                    head.push(ch);
                    break;
                }
                head.push(ch);
            }
            let tail = rest.as_str().to_string();
            line = head + &tail;
        }
        let separator = usize::from(!current.is_empty());
        if utf16_len(&current) + separator + utf16_len(&line) > limit {
            parts.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

fn dialogue_button(text: &str, input: DialogueInput) -> InlineButton {
    InlineButton::callback(text, input.callback_data().unwrap_or_default())
}

fn abort_row() -> Vec<InlineButton> {
    vec![dialogue_button("❌ Abbrechen", DialogueInput::Abort)]
}

fn back_to_admin() -> InlineKeyboard {
    InlineKeyboard::new().button("« Zurück zum Admin-Menü", "admin_main_menu")
}

fn admin_menu_message() -> OutboundMessage {
    OutboundMessage::html("🔒 <b>Admin-Menü</b>\n\nWähle eine Option:").with_keyboard(
        InlineKeyboard::new()
            .button("📊 Nutzer-Statistiken", "admin_stats_users")
            .button("🖱️ Klick-Statistiken", "admin_stats_clicks")
            .button("👥 Nutzerverwaltung", "admin_users_menu")
            .button("🏷️ Rabatte", "admin_discount_menu")
            .button("🎟️ Gutscheine anzeigen", "admin_show_vouchers")
            .button("🔄 Zähler zurücksetzen", "admin_reset_stats")
            .button("🗑️ Alles zurücksetzen", "admin_full_reset"),
    )
}

fn confirm_message(text: &str, confirm_data: &str) -> OutboundMessage {
    OutboundMessage::html(text).with_keyboard(
        InlineKeyboard::new()
            .button("✅ Ja, zurücksetzen", confirm_data)
            .button("❌ Nein, abbrechen", "admin_main_menu"),
    )
}

fn target_label(target: &DiscountTarget) -> String {
    match target {
        DiscountTarget::AllUsers => "alle Nutzer".to_string(),
        DiscountTarget::User(user_id) => format!("Nutzer <code>{}</code>", escape_html(user_id)),
    }
}

fn problem_text(problem: &InputProblem) -> String {
    match problem {
        InputProblem::NotNumeric => "⚠️ Bitte nur Ziffern senden.".to_string(),
        InputProblem::OutOfRange { min, max } => {
            format!("⚠️ Der Wert muss zwischen {min} und {max} liegen.")
        }
        InputProblem::UnknownUser(user_id) => format!(
            "⚠️ Nutzer <code>{}</code> ist nicht bekannt.",
            escape_html(user_id)
        ),
        InputProblem::NoDiscount(user_id) => format!(
            "⚠️ Nutzer <code>{}</code> hat keinen Rabatt.",
            escape_html(user_id)
        ),
        InputProblem::NoPackagesSelected => "⚠️ Bitte wähle mindestens ein Paket.".to_string(),
        InputProblem::ExpectedButton => "⚠️ Bitte benutze die Buttons.".to_string(),
    }
}

fn package_keyboard(selected: &std::collections::BTreeSet<PackageKey>) -> InlineKeyboard {
    let mut keyboard = InlineKeyboard::new();
    for pair in PackageKey::all().chunks(2) {
        let row = pair
            .iter()
            .map(|key| {
                let mark = if selected.contains(key) { "✅ " } else { "" };
                dialogue_button(
                    &format!("{mark}{}", key.label()),
                    DialogueInput::TogglePackage(*key),
                )
            })
            .collect();
        keyboard = keyboard.row(row);
    }
    keyboard
        .row(vec![dialogue_button("➡️ Weiter", DialogueInput::PackagesDone)])
        .row(abort_row())
}

/// Prompt shown for `state`, prefixed by the problem when input was rejected.
fn dialogue_prompt(state: &DialogueState, problem: Option<&InputProblem>) -> OutboundMessage {
    let (body, keyboard) = match state {
        DialogueState::Idle => return admin_menu_message(),
        DialogueState::ChooseDiscountType => (
            "🏷️ <b>Neuer Rabatt</b>\n\nWelche Art von Rabatt?".to_string(),
            InlineKeyboard::new()
                .row(vec![dialogue_button(
                    "Prozent auf alles",
                    DialogueInput::ChooseKind(DiscountKind::Percent),
                )])
                .row(vec![dialogue_button(
                    "Euro pro Paket",
                    DialogueInput::ChooseKind(DiscountKind::Euro),
                )])
                .row(vec![dialogue_button(
                    "Prozent pro Paket",
                    DialogueInput::ChooseKind(DiscountKind::PercentPackages),
                )])
                .row(abort_row()),
        ),
        DialogueState::ChooseTarget { .. } => (
            "Für wen gilt der Rabatt?".to_string(),
            InlineKeyboard::new()
                .row(vec![
                    dialogue_button(
                        "👥 Alle Nutzer",
                        DialogueInput::ChooseTarget(TargetChoice::AllUsers),
                    ),
                    dialogue_button(
                        "👤 Einzelner Nutzer",
                        DialogueInput::ChooseTarget(TargetChoice::SingleUser),
                    ),
                ])
                .row(abort_row()),
        ),
        DialogueState::AwaitDiscountUserId { .. } => (
            "Bitte sende die Nutzer-ID.".to_string(),
            InlineKeyboard::new().row(abort_row()),
        ),
        DialogueState::AwaitValue { kind, target } => {
            let question = match kind {
                DiscountKind::Euro => "Wie viel Euro Rabatt pro Paket? (1-999)",
                DiscountKind::Percent | DiscountKind::PercentPackages => {
                    "Wie viel Prozent Rabatt? (1-100)"
                }
            };
            (
                format!("Rabatt für {}.\n\n{question}", target_label(target)),
                InlineKeyboard::new().row(abort_row()),
            )
        }
        DialogueState::ChoosePackages {
            kind,
            value,
            selected,
            ..
        } => {
            let unit = if *kind == DiscountKind::Euro { "€" } else { "%" };
            (
                format!("Für welche Pakete gilt der Rabatt von <b>{value}{unit}</b>?"),
                package_keyboard(selected),
            )
        }
        DialogueState::Finalize { target, descriptor } => (
            format!(
                "<b>Zusammenfassung</b>\n\nZiel: {}\nRabatt: {}\n\nJetzt vergeben?",
                target_label(target),
                escape_html(&descriptor.describe())
            ),
            InlineKeyboard::new()
                .row(vec![dialogue_button("✅ Bestätigen", DialogueInput::Confirm)])
                .row(abort_row()),
        ),
        DialogueState::AwaitBanUserId { banned } => (
            format!(
                "Welche Nutzer-ID soll {} werden?",
                if *banned { "gesperrt" } else { "entsperrt" }
            ),
            InlineKeyboard::new().row(abort_row()),
        ),
        DialogueState::AwaitPreviewUserId => (
            "Für welche Nutzer-ID soll das Vorschau-Limit geändert werden?".to_string(),
            InlineKeyboard::new().row(abort_row()),
        ),
        DialogueState::ChoosePreviewAction { user_id } => (
            format!("Vorschau-Limit für <code>{}</code>:", escape_html(user_id)),
            InlineKeyboard::new()
                .row(vec![
                    dialogue_button(
                        "🔄 Zurücksetzen",
                        DialogueInput::PreviewAction(PreviewLimitAction::Reset),
                    ),
                    dialogue_button(
                        "⛔️ Ausschöpfen",
                        DialogueInput::PreviewAction(PreviewLimitAction::Exhaust),
                    ),
                ])
                .row(abort_row()),
        ),
        DialogueState::AwaitDeleteDiscountUserId => (
            "Von welcher Nutzer-ID soll der Rabatt gelöscht werden?".to_string(),
            InlineKeyboard::new().row(abort_row()),
        ),
        DialogueState::ConfirmDeleteDiscount { user_id } => (
            format!(
                "Rabatt von <code>{}</code> wirklich löschen?",
                escape_html(user_id)
            ),
            InlineKeyboard::new()
                .row(vec![dialogue_button("✅ Löschen", DialogueInput::Confirm)])
                .row(abort_row()),
        ),
    };
    let text = match problem {
        Some(problem) => format!("{}\n\n{body}", problem_text(problem)),
        None => body,
    };
    OutboundMessage::html(text).with_keyboard(keyboard)
}

fn voucher_lines(codes: &[String], budget: usize) -> String {
    if codes.is_empty() {
        return "Keine".to_string();
    }
    let lines = codes
        .iter()
        .map(|code| format!("- <code>{}</code>", escape_html(code)))
        .collect::<Vec<_>>();
    bounded_lines(&lines, budget)
}

fn is_customer_id(user_id: &str) -> bool {
    !user_id.is_empty() && user_id.chars().all(|ch| ch.is_ascii_digit())
}

impl ShopRuntime {
    pub(crate) async fn show_admin_menu(
        &mut self,
        chat_id: i64,
        editable: Option<i64>,
    ) -> Result<RouteOutcome> {
        self.respond(chat_id, editable, admin_menu_message()).await;
        Ok(RouteOutcome::Handled)
    }

    pub(crate) async fn handle_operator_button(
        &mut self,
        interaction: &InboundInteraction,
        data: &str,
        message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        if data.starts_with("dlg:") {
            let Some(input) = DialogueInput::from_callback(data) else {
                debug!("unknown dialogue button: data={data}");
                return Ok(RouteOutcome::Ignored);
            };
            return self
                .drive_dialogue(interaction, input, message_id, now)
                .await;
        }
        let chat_id = interaction.chat_id;
        let message = match data {
            "admin_main_menu" => {
                self.dialogues.set(interaction.user_id, DialogueState::Idle);
                admin_menu_message()
            }
            "admin_stats_users" => self.user_stats_message(now).await,
            "admin_stats_clicks" => self.click_stats_message().await,
            "admin_users_menu" => OutboundMessage::html("👥 <b>Nutzerverwaltung</b>").with_keyboard(
                InlineKeyboard::new()
                    .row(vec![dialogue_button(
                        "🚫 Nutzer sperren",
                        DialogueInput::Begin(DialogueFlow::Ban),
                    )])
                    .row(vec![dialogue_button(
                        "✅ Nutzer entsperren",
                        DialogueInput::Begin(DialogueFlow::Unban),
                    )])
                    .row(vec![dialogue_button(
                        "🖼️ Vorschau-Limit ändern",
                        DialogueInput::Begin(DialogueFlow::PreviewLimit),
                    )])
                    .button("« Zurück zum Admin-Menü", "admin_main_menu"),
            ),
            "admin_discount_menu" => OutboundMessage::html("🏷️ <b>Rabatte</b>").with_keyboard(
                InlineKeyboard::new()
                    .row(vec![dialogue_button(
                        "➕ Rabatt vergeben",
                        DialogueInput::Begin(DialogueFlow::CreateDiscount),
                    )])
                    .button("📋 Rabatte anzeigen", "admin_list_discounts")
                    .row(vec![dialogue_button(
                        "🗑️ Rabatt löschen",
                        DialogueInput::Begin(DialogueFlow::DeleteDiscount),
                    )])
                    .button("« Zurück zum Admin-Menü", "admin_main_menu"),
            ),
            "admin_list_discounts" => self.discount_list_message().await,
            "admin_show_vouchers" => self.voucher_panel_message(),
            "admin_export_vouchers" => {
                for part in self.voucher_report(now) {
                    self.send(chat_id, part).await;
                }
                return Ok(RouteOutcome::Handled);
            }
            "admin_reset_stats" => confirm_message(
                "⚠️ <b>Bist du sicher?</b>\n\nAlle Klick-Zähler werden unwiderruflich auf Null gesetzt.",
                "admin_reset_stats_confirm",
            ),
            "admin_reset_stats_confirm" => {
                self.ctx
                    .store
                    .mutate(|aggregate| aggregate.reset_event_counters())
                    .await?;
                refresh_dashboard(&self.ctx, now).await?;
                info!("event counters reset: operator_id={}", interaction.user_id);
                OutboundMessage::plain("✅ Alle Klick-Zähler wurden zurückgesetzt.")
                    .with_keyboard(back_to_admin())
            }
            "admin_full_reset" => confirm_message(
                "⚠️ <b>Wirklich alles zurücksetzen?</b>\n\nAlle Nutzer, Rabatte, Aktivitätsprotokolle und Zähler werden gelöscht.",
                "admin_full_reset_confirm",
            ),
            "admin_full_reset_confirm" => {
                self.ctx
                    .store
                    .mutate(|aggregate| aggregate.full_reset())
                    .await?;
                self.sessions.clear();
                push_discount_mirror(&self.ctx, now).await?;
                refresh_dashboard(&self.ctx, now).await?;
                info!("full reset: operator_id={}", interaction.user_id);
                OutboundMessage::plain("✅ Alle Daten wurden zurückgesetzt.")
                    .with_keyboard(back_to_admin())
            }
            _ => {
                debug!("unknown admin button: data={data}");
                return Ok(RouteOutcome::Ignored);
            }
        };
        self.respond(chat_id, message_id, message).await;
        Ok(RouteOutcome::Handled)
    }

    async fn user_stats_message(&self, now: DateTime<Utc>) -> OutboundMessage {
        let aggregate = self.ctx.store.snapshot().await;
        let banned = aggregate.users.values().filter(|record| record.banned).count();
        let text = format!(
            "📊 <b>Nutzer-Statistiken</b>\n\nGesamtzahl der Nutzer: <b>{}</b>\nAktiv (24h): <b>{}</b>\nGesperrt: <b>{}</b>\nMit Rabatt: <b>{}</b>",
            aggregate.user_count(),
            aggregate.active_users_since(now, Duration::hours(ACTIVE_WINDOW_HOURS)),
            banned,
            aggregate.discount_map().len()
        );
        OutboundMessage::html(text).with_keyboard(back_to_admin())
    }

    async fn click_stats_message(&self) -> OutboundMessage {
        let aggregate = self.ctx.store.snapshot().await;
        let mut counters = aggregate.events.iter().collect::<Vec<_>>();
        counters.sort_by(|(left_name, left), (right_name, right)| {
            right.cmp(left).then_with(|| left_name.cmp(right_name))
        });
        let mut text = "🖱️ <b>Klick-Statistiken</b>\n\n".to_string();
        if counters.is_empty() {
            text.push_str("Noch keine Klicks erfasst.");
        }
        for (name, count) in counters {
            text.push_str(&format!(
                "- <code>{}</code>: <b>{count}</b> Klicks\n",
                escape_html(name)
            ));
        }
        OutboundMessage::html(text.trim_end().to_string()).with_keyboard(back_to_admin())
    }

    async fn discount_list_message(&self) -> OutboundMessage {
        let discounts = self.ctx.store.snapshot().await.discount_map();
        let body = if discounts.is_empty() {
            "Keine Rabatte vergeben.".to_string()
        } else {
            let lines = discounts
                .iter()
                .map(|(user_id, descriptor)| {
                    format!(
                        "<code>{}</code>: {}",
                        escape_html(user_id),
                        escape_html(&descriptor.describe())
                    )
                })
                .collect::<Vec<_>>();
            bounded_lines(&lines, MESSAGE_TEXT_LIMIT - PANEL_HEADROOM)
        };
        OutboundMessage::html(format!("📋 <b>Aktive Rabatte</b>\n\n{body}")).with_keyboard(
            InlineKeyboard::new().button("« Zurück zu den Rabatten", "admin_discount_menu"),
        )
    }

    fn voucher_panel_message(&self) -> OutboundMessage {
        let ledger = self.ctx.vouchers.load();
        let budget = (MESSAGE_TEXT_LIMIT - PANEL_HEADROOM) / VoucherProvider::ALL.len();
        let sections = VoucherProvider::ALL
            .into_iter()
            .map(|provider| {
                format!(
                    "<b>{}:</b>\n{}",
                    provider.display_name(),
                    voucher_lines(ledger.codes(provider), budget)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        OutboundMessage::html(format!("🎟️ <b>Eingelöste Gutscheine</b>\n\n{sections}"))
            .with_keyboard(
                InlineKeyboard::new()
                    .button("📄 Als Bericht exportieren", "admin_export_vouchers")
                    .button("« Zurück zum Admin-Menü", "admin_main_menu"),
            )
    }

    /// Plain-text voucher report, split over as many messages as it needs.
    fn voucher_report(&self, now: DateTime<Utc>) -> Vec<OutboundMessage> {
        let ledger = self.ctx.vouchers.load();
        let mut report = format!("Gutschein-Report {}", now.format("%Y-%m-%d"));
        for provider in VoucherProvider::ALL {
            report.push_str(&format!("\n\n{} Gutscheine\n", provider.display_name()));
            let codes = ledger.codes(provider);
            if codes.is_empty() {
                report.push_str("Keine vorhanden.");
            } else {
                report.push_str(
                    &codes
                        .iter()
                        .map(|code| format!("- {code}"))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
        }
        split_plain_text(&report, MESSAGE_TEXT_LIMIT)
            .into_iter()
            .map(OutboundMessage::plain)
            .collect()
    }

    pub(crate) async fn handle_dialogue_text(
        &mut self,
        interaction: &InboundInteraction,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        self.drive_dialogue(interaction, DialogueInput::Text(text.to_string()), None, now)
            .await
    }

    pub(crate) async fn cancel_dialogue(
        &mut self,
        interaction: &InboundInteraction,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        if !self.dialogues.is_active(interaction.user_id) {
            self.send(
                interaction.chat_id,
                OutboundMessage::plain("Es läuft gerade kein Vorgang."),
            )
            .await;
            return Ok(RouteOutcome::Handled);
        }
        self.drive_dialogue(interaction, DialogueInput::Abort, None, now)
            .await
    }

    async fn drive_dialogue(
        &mut self,
        interaction: &InboundInteraction,
        input: DialogueInput,
        editable: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let operator_id = interaction.user_id;
        let current = self.dialogues.state(operator_id);
        let aggregate = self.ctx.store.snapshot().await;
        let transition = advance(&current, input, &aggregate);
        self.dialogues.set(operator_id, transition.next.clone());
        let chat_id = interaction.chat_id;
        match transition.effect {
            DialogueEffect::Prompt => {
                self.respond(chat_id, editable, dialogue_prompt(&transition.next, None))
                    .await;
            }
            DialogueEffect::Reprompt(problem) => {
                self.respond(
                    chat_id,
                    editable,
                    dialogue_prompt(&transition.next, Some(&problem)),
                )
                .await;
            }
            DialogueEffect::Commit(commit) => {
                let summary = self.execute_commit(commit, now).await?;
                self.respond(
                    chat_id,
                    editable,
                    OutboundMessage::html(summary).with_keyboard(back_to_admin()),
                )
                .await;
            }
            DialogueEffect::Aborted => {
                self.respond(
                    chat_id,
                    editable,
                    OutboundMessage::plain("❌ Vorgang abgebrochen.").with_keyboard(back_to_admin()),
                )
                .await;
            }
            DialogueEffect::Ignored => return Ok(RouteOutcome::Ignored),
        }
        Ok(RouteOutcome::Handled)
    }

    /// Applies a finished dialogue and returns the operator-facing summary.
    async fn execute_commit(&self, commit: DialogueCommit, now: DateTime<Utc>) -> Result<String> {
        match commit {
            DialogueCommit::AssignDiscount { target, descriptor } => {
                self.assign_discount(&target, &descriptor, now).await
            }
            DialogueCommit::SetBanned { user_id, banned } => {
                let key = user_id.clone();
                self.ctx
                    .store
                    .mutate(|aggregate| {
                        if let Some(record) = aggregate.users.get_mut(&key) {
                            record.banned = banned;
                        }
                    })
                    .await?;
                info!("ban updated: user_id={user_id} banned={banned}");
                Ok(if banned {
                    format!("🚫 Nutzer <code>{}</code> wurde gesperrt.", escape_html(&user_id))
                } else {
                    format!("✅ Nutzer <code>{}</code> wurde entsperrt.", escape_html(&user_id))
                })
            }
            DialogueCommit::AdjustPreviewLimit { user_id, action } => {
                let key = user_id.clone();
                let clicks = self
                    .ctx
                    .store
                    .mutate(|aggregate| {
                        aggregate
                            .users
                            .get_mut(&key)
                            .map(|record| apply_preview_limit_action(record, action))
                    })
                    .await?
                    .unwrap_or_default();
                info!(
                    "preview limit adjusted: user_id={} action={} clicks={}",
                    user_id,
                    action.as_str(),
                    clicks
                );
                let verb = match action {
                    PreviewLimitAction::Reset => "zurückgesetzt",
                    PreviewLimitAction::Exhaust => "ausgeschöpft",
                };
                Ok(format!(
                    "🖼️ Vorschau-Limit für <code>{}</code> {verb} (Klicks: {clicks}).",
                    escape_html(&user_id)
                ))
            }
            DialogueCommit::DeleteDiscount { user_id } => {
                let key = user_id.clone();
                self.ctx
                    .store
                    .mutate(|aggregate| {
                        if let Some(record) = aggregate.users.get_mut(&key) {
                            record.discount = None;
                        }
                    })
                    .await?;
                push_discount_mirror(&self.ctx, now).await?;
                info!("discount deleted: user_id={user_id}");
                Ok(format!(
                    "🗑️ Rabatt von <code>{}</code> gelöscht.",
                    escape_html(&user_id)
                ))
            }
        }
    }

    /// Stores the descriptor for every recipient in one mutation, mirrors once,
    /// then notifies each recipient.
    async fn assign_discount(
        &self,
        target: &DiscountTarget,
        descriptor: &DiscountDescriptor,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let recipients = self
            .ctx
            .store
            .mutate(|aggregate| {
                let ids = match target {
                    DiscountTarget::AllUsers => aggregate
                        .users
                        .iter()
                        .filter(|(user_id, record)| !record.banned && is_customer_id(user_id))
                        .map(|(user_id, _)| user_id.clone())
                        .collect::<Vec<_>>(),
                    DiscountTarget::User(user_id) if aggregate.users.contains_key(user_id) => {
                        vec![user_id.clone()]
                    }
                    DiscountTarget::User(_) => Vec::new(),
                };
                for user_id in &ids {
                    if let Some(record) = aggregate.users.get_mut(user_id) {
                        record.discount = Some(descriptor.clone());
                        record.discount_sent = true;
                    }
                }
                ids
            })
            .await?;
        push_discount_mirror(&self.ctx, now).await?;

        let description = escape_html(&descriptor.describe());
        let notice = OutboundMessage::html(format!(
            "🎁 <b>Neuer Rabatt für dich!</b>\n\n{description}\n\nDer Rabatt wird bei der Paketauswahl automatisch berücksichtigt."
        ));
        let mut sent = 0usize;
        let mut failed = 0usize;
        for user_id in &recipients {
            let Ok(chat_id) = user_id.parse::<i64>() else {
                failed += 1;
                continue;
            };
            match self.ctx.transport.send_message(chat_id, &notice).await {
                Ok(_) => sent += 1,
                Err(error) => {
                    failed += 1;
                    error!(
                        "discount notice failed: user_id={} reason_code={} detail={}",
                        user_id, error.reason_code, error.detail
                    );
                }
            }
        }
        info!(
            "discount assigned: kind={} recipients={} sent={} failed={}",
            descriptor.kind().as_str(),
            recipients.len(),
            sent,
            failed
        );
        Ok(format!(
            "✅ Rabatt vergeben an {}: {description}\n\nEmpfänger: <b>{}</b>\nBenachrichtigt: <b>{sent}</b>\nFehlgeschlagen: <b>{failed}</b>",
            target_label(target),
            recipients.len()
        ))
    }

    pub(crate) async fn add_voucher_command(
        &mut self,
        interaction: &InboundInteraction,
        args: &[String],
    ) -> Result<RouteOutcome> {
        let chat_id = interaction.chat_id;
        let reply = match args.split_first() {
            Some((provider_raw, code_parts)) if !code_parts.is_empty() => {
                match VoucherProvider::parse(provider_raw) {
                    None => "Fehler: Anbieter muss 'amazon' oder 'paysafe' sein.".to_string(),
                    Some(provider) => {
                        let code = code_parts.join(" ");
                        match self.ctx.vouchers.append(provider, &code) {
                            Ok(()) => {
                                info!("voucher added by operator: provider={}", provider.as_str());
                                format!(
                                    "✅ Gutschein für <b>{}</b> hinzugefügt:\n<code>{}</code>",
                                    provider.display_name(),
                                    escape_html(&code)
                                )
                            }
                            Err(error) => {
                                error!("voucher add failed: provider={} error={error:#}", provider.as_str());
                                "⚠️ Gutschein konnte nicht gespeichert werden.".to_string()
                            }
                        }
                    }
                }
            }
            _ => "⚠️ Falsches Format:\n<code>/addvoucher &lt;anbieter&gt; &lt;code...&gt;</code>"
                .to_string(),
        };
        self.send(chat_id, OutboundMessage::html(reply)).await;
        Ok(RouteOutcome::Handled)
    }

    pub(crate) async fn set_summary_command(
        &mut self,
        interaction: &InboundInteraction,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        if self.ctx.config.notification_chat_id != Some(interaction.chat_id) {
            self.send(
                interaction.chat_id,
                OutboundMessage::plain("⚠️ Dieser Befehl geht nur in der Admin-Gruppe."),
            )
            .await;
            return Ok(RouteOutcome::Handled);
        }
        self.send(
            interaction.chat_id,
            OutboundMessage::plain("🔄 Erstelle Dashboard..."),
        )
        .await;
        recreate_dashboard(&self.ctx, now).await?;
        Ok(RouteOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::{bounded_lines, split_plain_text, utf16_len};

    #[test]
    fn unit_bounded_lines_counts_what_it_leaves_out() {
        let lines = (0..10)
            .map(|index| format!("<code>{index}</code>: 10%"))
            .collect::<Vec<_>>();
        let all = bounded_lines(&lines, 1_000);
        assert_eq!(all.lines().count(), 10);
        let cut = bounded_lines(&lines, 20);
        assert_eq!(cut, "<code>0</code>: 10%\n<code>1</code>: 10%\n<i>… und 8 weitere</i>");
    }

    #[test]
    fn unit_split_plain_text_keeps_every_line_within_the_limit() {
        let text = (0..30)
            .map(|index| format!("- CODE-{index:02}"))
            .collect::<Vec<_>>()
            .join("\n");
        let parts = split_plain_text(&text, 40);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|part| utf16_len(part) <= 40));
        assert_eq!(parts.join("\n"), text);

        let single = split_plain_text(&"x".repeat(95), 40);
        assert_eq!(
            single.iter().map(|part| part.len()).collect::<Vec<_>>(),
            vec![40, 40, 15]
        );
        assert_eq!(split_plain_text("", 40), vec![String::new()]);
    }
}
