// ABOUTME: Client IP and user-agent pair recorded with an SSO session
// ABOUTME: Mismatch is a soft signal evaluated by the configured policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::{Deserialize, Serialize};

/// Browser fingerprint captured at session creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Client IP address as seen by the server
    pub ip_address: Option<String>,
    /// `User-Agent` header value
    pub user_agent: Option<String>,
}

impl Fingerprint {
    /// Construct from raw request values
    #[must_use]
    pub const fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Fields unknown on either side are not counted as a mismatch
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        fn same(a: Option<&String>, b: Option<&String>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        same(self.ip_address.as_ref(), other.ip_address.as_ref())
            && same(self.user_agent.as_ref(), other.user_agent.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_matching() {
        let original = Fingerprint::new(Some("10.0.0.1".to_owned()), Some("Firefox".to_owned()));
        assert!(original.matches(&original.clone()));
        assert!(original.matches(&Fingerprint::new(None, Some("Firefox".to_owned()))));
        assert!(!original.matches(&Fingerprint::new(
            Some("10.0.0.2".to_owned()),
            Some("Firefox".to_owned())
        )));
        assert!(!original.matches(&Fingerprint::new(
            Some("10.0.0.1".to_owned()),
            Some("curl".to_owned())
        )));
    }
}
