//! Wire status tokens and persisted operating statuses.

use serde::{Deserialize, Serialize};

/// Raw health code reported on the wire by the data plane.
///
/// Listeners report `OPEN`/`FULL`; pools and members report
/// `UP`/`DOWN`/`DRAIN`/`MAINT`/`NO_CHECK`. Codes this build does not know
/// are preserved as [`StatusToken::Unrecognized`] rather than rejected;
/// the reconciler decides per context whether they map to anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusToken {
    Up,
    Down,
    Drain,
    Maint,
    NoCheck,
    Open,
    Full,
    Unrecognized(String),
}

impl StatusToken {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Drain => "DRAIN",
            Self::Maint => "MAINT",
            Self::NoCheck => "NO_CHECK",
            Self::Open => "OPEN",
            Self::Full => "FULL",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for StatusToken {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            "DRAIN" => Self::Drain,
            "MAINT" => Self::Maint,
            "NO_CHECK" => Self::NoCheck,
            "OPEN" => Self::Open,
            "FULL" => Self::Full,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<StatusToken> for String {
    fn from(token: StatusToken) -> Self {
        token.as_str().to_string()
    }
}

impl std::fmt::Display for StatusToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted operating status of a load balancer, listener, pool or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingStatus {
    Online,
    Offline,
    Draining,
    Error,
    Degraded,
    NoMonitor,
}

impl OperatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Draining => "DRAINING",
            Self::Error => "ERROR",
            Self::Degraded => "DEGRADED",
            Self::NoMonitor => "NO_MONITOR",
        }
    }
}

impl std::fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens_round_trip() {
        for raw in ["UP", "DOWN", "DRAIN", "MAINT", "NO_CHECK", "OPEN", "FULL"] {
            let token = StatusToken::from(raw.to_string());
            assert!(!matches!(token, StatusToken::Unrecognized(_)), "{raw} should be known");
            assert_eq!(token.as_str(), raw);
        }
    }

    #[test]
    fn test_unknown_token_preserved() {
        let token = StatusToken::from("bogus".to_string());
        assert_eq!(token, StatusToken::Unrecognized("bogus".to_string()));
        assert_eq!(token.as_str(), "bogus");
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        // The data plane emits upper-case codes; anything else is unknown.
        let token = StatusToken::from("up".to_string());
        assert!(matches!(token, StatusToken::Unrecognized(_)));
    }

    #[test]
    fn test_operating_status_serde_names() {
        let json = serde_json::to_string(&OperatingStatus::NoMonitor).unwrap();
        assert_eq!(json, "\"NO_MONITOR\"");
        let back: OperatingStatus = serde_json::from_str("\"DEGRADED\"").unwrap();
        assert_eq!(back, OperatingStatus::Degraded);
    }
}
