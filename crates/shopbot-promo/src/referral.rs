//! Referral bookkeeping.

use shopbot_store::Aggregate;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralReward {
    pub referrer_id: String,
    pub referred_id: String,
    pub successful_referrals: u32,
}

/// Links a freshly created user to its referrer.
///
/// Only applies when the referred record exists, has no referrer yet, the
/// referrer is a different known user. Returns whether the link was made.
pub fn attach_referrer(aggregate: &mut Aggregate, referred_id: &str, referrer_id: &str) -> bool {
    if referred_id == referrer_id || !aggregate.users.contains_key(referrer_id) {
        return false;
    }
    let Some(referred) = aggregate.users.get_mut(referred_id) else {
        return false;
    };
    if referred.referrer_id.is_some() {
        return false;
    }
    referred.referrer_id = Some(referrer_id.to_string());
    if let Some(referrer) = aggregate.users.get_mut(referrer_id) {
        if !referrer.referrals.iter().any(|id| id == referred_id) {
            referrer.referrals.push(referred_id.to_string());
        }
    }
    true
}

/// Credits the referrer for `referred_id`'s first qualifying action.
///
/// The guard flag on the referred record and the referrer's counter change in
/// the same call, at most once per referred user.
pub fn process_referral_reward(
    aggregate: &mut Aggregate,
    referred_id: &str,
) -> Option<ReferralReward> {
    let referred = aggregate.users.get(referred_id)?;
    if referred.reward_triggered_for_referrer {
        return None;
    }
    let referrer_id = referred.referrer_id.clone()?;
    let referrer = aggregate.users.get_mut(&referrer_id)?;
    referrer.successful_referrals = referrer.successful_referrals.saturating_add(1);
    let successful_referrals = referrer.successful_referrals;
    if let Some(referred) = aggregate.users.get_mut(referred_id) {
        referred.reward_triggered_for_referrer = true;
    }
    debug!(
        "referral reward: referrer={} referred={} total={}",
        referrer_id, referred_id, successful_referrals
    );
    Some(ReferralReward {
        referrer_id,
        referred_id: referred_id.to_string(),
        successful_referrals,
    })
}
