//! User-agent based device classification.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::DeviceType;

const MOBILE_PATTERN: &str =
    r"Mobile|Android|iP(hone|od)|IEMobile|BlackBerry|Kindle|Silk-Accelerated|(hpw|web)OS|Opera M(obi|ini)";

fn mobile_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MOBILE_PATTERN).ok()).as_ref()
}

/// `iPad`, or `Android` not followed anywhere by `Mobile`.
fn is_tablet(user_agent: &str) -> bool {
    if user_agent.contains("iPad") {
        return true;
    }
    match user_agent.rfind("Android") {
        Some(pos) => !user_agent[pos..].contains("Mobile"),
        None => false,
    }
}

/// Classify a user agent. The tablet rule is checked before the mobile rule.
pub fn classify_device(user_agent: &str) -> DeviceType {
    if is_tablet(user_agent) {
        DeviceType::Tablet
    } else if mobile_regex().is_some_and(|re| re.is_match(user_agent)) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cases = [
            ("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)", DeviceType::Tablet),
            ("Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36", DeviceType::Tablet),
            (
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36",
                DeviceType::Mobile,
            ),
            ("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)", DeviceType::Mobile),
            ("Opera/9.80 (J2ME/MIDP; Opera Mini/9.80)", DeviceType::Mobile),
            ("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0", DeviceType::Desktop),
            ("psylab/0.1.0 (linux; x86_64)", DeviceType::Desktop),
        ];
        for (ua, expected) in cases {
            assert_eq!(classify_device(ua), expected, "{}", ua);
        }
    }

    #[test]
    fn test_mobile_before_android_still_tablet() {
        // "Mobile" only counts when it appears after "Android".
        assert_eq!(classify_device("Mobile build; Android 12"), DeviceType::Tablet);
    }
}
