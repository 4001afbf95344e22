//! Best-effort user agent parsing for open and click events.
//!
//! Tracking only needs coarse buckets (OS, device class, browser family),
//! so this is deliberately a small substring matcher rather than a full
//! UA grammar. Unrecognized agents land in "Other"/Unknown buckets.

use serde::{Deserialize, Serialize};

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Desktop => write!(f, "Desktop"),
            DeviceClass::Mobile => write!(f, "Mobile"),
            DeviceClass::Tablet => write!(f, "Tablet"),
            DeviceClass::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Parsed user agent buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub os: String,
    pub device: DeviceClass,
    pub browser: String,
}

/// Parse a raw User-Agent header into coarse buckets
pub fn parse_user_agent(ua: &str) -> UserAgentInfo {
    let lower = ua.to_lowercase();

    if lower.trim().is_empty() {
        return UserAgentInfo {
            os: "Unknown".to_string(),
            device: DeviceClass::Unknown,
            browser: "Other".to_string(),
        };
    }

    // iOS must be checked before macOS: iPhone UAs also claim "like Mac OS X"
    let os = if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ipod") {
        "iOS"
    } else if lower.contains("android") {
        "Android"
    } else if lower.contains("windows") {
        "Windows"
    } else if lower.contains("mac os") || lower.contains("macintosh") {
        "macOS"
    } else if lower.contains("linux") {
        "Linux"
    } else {
        "Other"
    };

    let device = if lower.contains("ipad") || lower.contains("tablet") {
        DeviceClass::Tablet
    } else if lower.contains("mobi") || lower.contains("iphone") || lower.contains("android") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    // Order matters: Edge and Opera embed "chrome", Chrome embeds "safari"
    let browser = if lower.contains("edg") {
        "Edge"
    } else if lower.contains("opr") || lower.contains("opera") {
        "Opera"
    } else if lower.contains("outlook") {
        "Outlook"
    } else if lower.contains("thunderbird") {
        "Thunderbird"
    } else if lower.contains("firefox") {
        "Firefox"
    } else if lower.contains("chrome") || lower.contains("crios") {
        "Chrome"
    } else if lower.contains("safari") {
        "Safari"
    } else {
        "Other"
    };

    UserAgentInfo {
        os: os.to_string(),
        device,
        browser: browser.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_iphone_safari() {
        let info = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(info.os, "iOS");
        assert_eq!(info.device, DeviceClass::Mobile);
        assert_eq!(info.browser, "Safari");
    }

    #[test]
    fn test_windows_chrome() {
        let info = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(info.os, "Windows");
        assert_eq!(info.device, DeviceClass::Desktop);
        assert_eq!(info.browser, "Chrome");
    }

    #[test]
    fn test_edge_not_misparsed_as_chrome() {
        let info = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
        );
        assert_eq!(info.browser, "Edge");
    }

    #[test]
    fn test_ipad_is_tablet() {
        let info = parse_user_agent(
            "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(info.os, "iOS");
        assert_eq!(info.device, DeviceClass::Tablet);
    }

    #[test]
    fn test_empty_ua() {
        let info = parse_user_agent("  ");
        assert_eq!(info.os, "Unknown");
        assert_eq!(info.device, DeviceClass::Unknown);
        assert_eq!(info.browser, "Other");
    }
}
