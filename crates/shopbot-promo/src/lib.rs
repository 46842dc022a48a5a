//! Promotion rules: discount resolution, automatic discounts, referral rewards,
//! and the preview click limit.
//!
//! Everything here is pure over the record types from `shopbot-store`; callers
//! own persistence.

pub mod auto_discount;
pub mod preview;
pub mod pricing;
pub mod referral;

pub use auto_discount::{
    evaluate_auto_discount, issue_auto_discount, standard_discount, AUTO_DISCOUNT_DELAY_HOURS,
    STANDARD_DISCOUNT_PERCENT,
};
pub use preview::{
    apply_preview_limit_action, register_preview_click, PreviewDecision, PreviewLimitAction,
    PREVIEW_CLICK_LIMIT,
};
pub use pricing::{quote_package, resolve_price, PriceQuote};
pub use referral::{attach_referrer, process_referral_reward, ReferralReward};
