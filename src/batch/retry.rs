//! Retry config mutation.
//!
//! Between attempts, a failing session's config is mutated so the retry
//! does not present the exact same shape: the proxy-kind preference
//! rotates through a fixed cycle and the User-Agent is swapped for a
//! random profile of the same device class.
//!
//! The mutations are a fixed enumerable set of pure functions over the
//! config, driven by an injected random source, so tests can pin the
//! sequence with a seeded RNG.

use rand::RngCore;
use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;

use crate::user_agent;

use super::model::SessionConfig;

/// The fixed set of config mutations applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIterMacro)]
pub enum RetryMutation {
    /// Rotate the proxy-kind preference to the next kind in the cycle
    RotateKindPreference,
    /// Swap the User-Agent for a random same-device-class profile
    SwapUserAgent,
}

impl RetryMutation {
    /// Applies this mutation to `config`.
    pub fn apply(self, config: &mut SessionConfig, rng: &mut dyn RngCore) {
        match self {
            RetryMutation::RotateKindPreference => {
                config.kind_preference = config.kind_preference.next_preference();
            }
            RetryMutation::SwapUserAgent => {
                config.user_agent = user_agent::random_alternative(&config.user_agent, rng);
            }
        }
    }
}

/// Applies every mutation in the fixed set, in declaration order.
pub fn mutate_for_retry(config: &mut SessionConfig, rng: &mut dyn RngCore) {
    for mutation in RetryMutation::iter() {
        mutation.apply(config, rng);
    }
}
