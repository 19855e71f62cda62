//! User-Agent profile management.
//!
//! Sessions carry a User-Agent string as part of their config. Profiles are
//! grouped into device classes (desktop, mobile, tablet); the retry policy
//! swaps a failing session's User-Agent for a different profile *within the
//! same class*, so a retried session keeps its device shape while changing
//! its fingerprint.

use rand::seq::IndexedRandom;
use rand::RngCore;
use strum_macros::EnumIter as EnumIterMacro;

/// Device class a User-Agent profile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum DeviceClass {
    /// Desktop browsers
    Desktop,
    /// Phone browsers
    Mobile,
    /// Tablet browsers
    Tablet,
}

/// A User-Agent string together with its device class.
#[derive(Debug, Clone, Copy)]
pub struct UserAgentProfile {
    /// Device class this profile presents as
    pub device: DeviceClass,
    /// The full User-Agent header value
    pub user_agent: &'static str,
}

/// The built-in profile set.
///
/// Kept small and current-ish; callers can always override the User-Agent
/// entirely through the session config.
pub const PROFILES: &[UserAgentProfile] = &[
    UserAgentProfile {
        device: DeviceClass::Desktop,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    },
    UserAgentProfile {
        device: DeviceClass::Desktop,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    },
    UserAgentProfile {
        device: DeviceClass::Desktop,
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    },
    UserAgentProfile {
        device: DeviceClass::Desktop,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    },
    UserAgentProfile {
        device: DeviceClass::Mobile,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1",
    },
    UserAgentProfile {
        device: DeviceClass::Mobile,
        user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    },
    UserAgentProfile {
        device: DeviceClass::Mobile,
        user_agent: "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Mobile Safari/537.36",
    },
    UserAgentProfile {
        device: DeviceClass::Tablet,
        user_agent: "Mozilla/5.0 (iPad; CPU OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1",
    },
    UserAgentProfile {
        device: DeviceClass::Tablet,
        user_agent: "Mozilla/5.0 (Linux; Android 14; SM-X910) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    },
];

/// The default User-Agent for new sessions (first desktop profile).
pub fn default_user_agent() -> &'static str {
    PROFILES[0].user_agent
}

/// Determines the device class of a known profile string.
///
/// Returns `None` for User-Agents supplied by the caller that aren't in the
/// built-in set.
pub fn class_of(user_agent: &str) -> Option<DeviceClass> {
    PROFILES
        .iter()
        .find(|p| p.user_agent == user_agent)
        .map(|p| p.device)
}

/// Picks a random profile from the same device class, different from the
/// current one when the class has alternatives.
///
/// Unknown User-Agents are treated as desktop. Falls back to the current
/// string only if the class has a single member.
pub fn random_alternative(current: &str, rng: &mut dyn RngCore) -> String {
    let class = class_of(current).unwrap_or(DeviceClass::Desktop);
    let alternatives: Vec<&UserAgentProfile> = PROFILES
        .iter()
        .filter(|p| p.device == class && p.user_agent != current)
        .collect();

    match alternatives.choose(rng) {
        Some(profile) => profile.user_agent.to_string(),
        None => current.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_class_has_profiles() {
        for class in DeviceClass::iter() {
            assert!(
                PROFILES.iter().any(|p| p.device == class),
                "no profiles for {:?}",
                class
            );
        }
    }

    #[test]
    fn test_class_of_known_profile() {
        assert_eq!(class_of(default_user_agent()), Some(DeviceClass::Desktop));
        assert_eq!(class_of("definitely not a UA"), None);
    }

    #[test]
    fn test_random_alternative_stays_in_class() {
        let mut rng = StdRng::seed_from_u64(7);
        let mobile = PROFILES
            .iter()
            .find(|p| p.device == DeviceClass::Mobile)
            .unwrap();

        for _ in 0..20 {
            let alternative = random_alternative(mobile.user_agent, &mut rng);
            assert_ne!(alternative, mobile.user_agent);
            assert_eq!(class_of(&alternative), Some(DeviceClass::Mobile));
        }
    }

    #[test]
    fn test_random_alternative_unknown_ua_becomes_desktop() {
        let mut rng = StdRng::seed_from_u64(7);
        let alternative = random_alternative("custom-agent/1.0", &mut rng);
        assert_eq!(class_of(&alternative), Some(DeviceClass::Desktop));
    }

    #[test]
    fn test_random_alternative_is_deterministic_with_seeded_rng() {
        let a = random_alternative(default_user_agent(), &mut StdRng::seed_from_u64(42));
        let b = random_alternative(default_user_agent(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
