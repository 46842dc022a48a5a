//! Storefront bot runtime.
//!
//! [`ShopRuntime`] consumes one [`shopbot_telegram::InboundInteraction`] at a
//! time: it classifies sessions, counts events, keeps the operator dashboard
//! and discount mirror in the notification chat up to date, and drives the
//! operator dialogues. All remote I/O goes through the
//! [`shopbot_telegram::MessengerTransport`] held by [`RuntimeContext`].

pub mod admin_log;
pub mod bot_config;
pub mod media_library;
pub mod operator_console;
pub mod operator_dialogue;
pub mod remote_mirror;
pub mod session_tracker;
pub mod shop_runtime;
pub mod storefront;

pub use admin_log::{
    delete_user_log, log_user_activity, recreate_dashboard, refresh_dashboard,
    send_permanent_notification, upsert_message, ActivityHeadline, UpsertOutcome,
};
pub use bot_config::{BotConfig, CryptoCoin, PayoutConfig};
pub use media_library::{ManifestMediaLibrary, MediaKind, MediaLibrary};
pub use operator_dialogue::{
    advance, DialogueCommit, DialogueEffect, DialogueFlow, DialogueInput, DialogueState,
    DiscountTarget, InputProblem, OperatorDialogues, TargetChoice, Transition,
};
pub use remote_mirror::{
    decode_discount_mirror, decode_summary, push_discount_mirror, recover_from_remote,
    render_discount_mirror, render_overflowed_discount_mirror, render_summary, DiscountMirror,
    MirrorDecodeError, RecoveryReport, SummaryPayload, DISCOUNT_MIRROR_HEADER,
    DISCOUNT_MIRROR_SCHEMA_VERSION, MIRROR_SCHEMA_VERSION, PLACEHOLDER_PREFIX,
    SUMMARY_HEADER,
};
pub use session_tracker::{
    begin_session, classify_session, parse_referral_code, record_event, SessionKind,
    SessionOutcome, RETURNING_AFTER_HOURS,
};
pub use shop_runtime::{RouteOutcome, RuntimeContext, ShopRuntime};
pub use storefront::{CustomerSession, MenuIntent, PaymentMethod, PendingVoucher, StorefrontAction};
