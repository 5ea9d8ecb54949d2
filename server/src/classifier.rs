//! Separates protocol-validation noise from real disconnects.
//!
//! The bridge and the host validate movement and packets differently, so a
//! healthy bridged session regularly trips host validation. Those termination
//! requests are cancelled; anything that looks like a genuine leave, network
//! timeout or shutdown always goes through.

use crate::config::DisconnectConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectVerdict {
    /// Matched an allow keyword; never suppressed
    Genuine { keyword: String },
    /// Validation mismatch between host and bridge
    Spurious { keyword: String },
    /// Matched nothing; the termination proceeds
    Unclassified,
}

impl DisconnectVerdict {
    pub fn suppresses(&self) -> bool {
        matches!(self, DisconnectVerdict::Spurious { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DisconnectClassifier {
    suppress: Vec<String>,
    allow: Vec<String>,
    packet_errors: Vec<String>,
}

impl DisconnectClassifier {
    pub fn new(config: &DisconnectConfig) -> Self {
        Self {
            suppress: lowercase(&config.suppress_keywords),
            allow: lowercase(&config.allow_keywords),
            packet_errors: lowercase(&config.packet_error_keywords),
        }
    }

    /// Classifies a termination reason, case-insensitively.
    pub fn classify(&self, reason: &str) -> DisconnectVerdict {
        let reason = reason.to_lowercase();

        // Allow wins even when a suppress keyword is also present.
        if let Some(keyword) = first_match(&self.allow, &reason) {
            return DisconnectVerdict::Genuine { keyword };
        }
        if let Some(keyword) = first_match(&self.suppress, &reason) {
            return DisconnectVerdict::Spurious { keyword };
        }
        DisconnectVerdict::Unclassified
    }

    /// Whether a termination request for a session should be cancelled.
    /// Native sessions are never suppressed.
    pub fn should_suppress(&self, bridged: bool, reason: &str) -> bool {
        bridged && self.classify(reason).suppresses()
    }

    /// Whether a packet-handling error should be kept from escalating into a
    /// disconnect. Errors without a message are always noise for bridged sessions.
    pub fn should_suppress_packet_error(&self, bridged: bool, message: Option<&str>) -> bool {
        if !bridged {
            return false;
        }
        match message {
            None => true,
            Some(message) => first_match(&self.packet_errors, &message.to_lowercase()).is_some(),
        }
    }
}

fn lowercase(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|keyword| !keyword.is_empty())
        .map(|keyword| keyword.to_lowercase())
        .collect()
}

fn first_match(keywords: &[String], text: &str) -> Option<String> {
    keywords
        .iter()
        .find(|keyword| text.contains(keyword.as_str()))
        .cloned()
}
