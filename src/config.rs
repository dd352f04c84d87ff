//! Agent configuration.
//!
//! Policy config lives in the settings store as key/value rows and is
//! loaded fresh at the start of every pipeline run into a typed
//! `AgentConfig`. Missing keys fall back to explicit defaults here, so a
//! half-populated settings table still yields a valid (conservative)
//! config. Infrastructure config (API keys, DB path, ports) is read from
//! the environment in `main` and never lives in the store.

use std::collections::{BTreeSet, HashMap};

use crate::error::ConfigError;

/// Default confidence threshold below which actions are held for review.
pub const DEFAULT_REVIEW_THRESHOLD: f32 = 0.7;

/// Default cap on unread messages fetched per run.
pub const DEFAULT_FETCH_LIMIT: usize = 25;

/// Default system prompt for the classifier when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the email triage assistant for an AV/IT \
integration company. Incoming mail is from customers needing support, sales prospects, \
vendors, and automated systems. Judge each message conservatively: only recommend an \
automatic reply when the correct response is unambiguous.";

/// Agent policy configuration, immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Master switch. A disabled agent makes a run a no-op success.
    pub enabled: bool,
    /// Allow the pipeline to send replies without human approval.
    pub auto_reply: bool,
    /// Allow the pipeline to create tickets without human approval.
    pub auto_create_tickets: bool,
    /// Optional CC applied to every auto-reply.
    pub cc_email: Option<String>,
    /// Destination for forwards and review-forwards.
    pub forward_email: Option<String>,
    /// Confidence threshold in [0, 1]; below it, actions are held for review.
    pub review_threshold: f32,
    /// Sender domains treated as internal staff.
    pub internal_domains: BTreeSet<String>,
    /// Sender substrings that are dropped before classification.
    pub ignore_domains: BTreeSet<String>,
    /// System prompt prepended to every classifier call.
    pub system_prompt: String,
    /// Signature appended to auto-replies.
    pub signature: String,
    /// Cap on unread messages fetched per run.
    pub fetch_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_reply: false,
            auto_create_tickets: false,
            cc_email: None,
            forward_email: None,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            internal_domains: BTreeSet::new(),
            ignore_domains: BTreeSet::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            signature: String::new(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

impl AgentConfig {
    /// Build a typed config from raw settings rows.
    ///
    /// Every key is optional; absent keys take the defaults above. Present
    /// keys must parse, and `review_threshold` must be in [0, 1] — a config
    /// someone actually wrote wrong should fail the run loudly rather than
    /// silently revert to a default.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = settings.get("enabled") {
            config.enabled = parse_bool("enabled", v)?;
        }
        if let Some(v) = settings.get("auto_reply") {
            config.auto_reply = parse_bool("auto_reply", v)?;
        }
        if let Some(v) = settings.get("auto_create_tickets") {
            config.auto_create_tickets = parse_bool("auto_create_tickets", v)?;
        }
        if let Some(v) = settings.get("cc_email") {
            config.cc_email = non_empty(v);
        }
        if let Some(v) = settings.get("forward_email") {
            config.forward_email = non_empty(v);
        }
        if let Some(v) = settings.get("review_threshold") {
            let threshold: f32 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "review_threshold".into(),
                message: format!("'{v}' is not a number"),
            })?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    key: "review_threshold".into(),
                    message: format!("{threshold} is outside [0, 1]"),
                });
            }
            config.review_threshold = threshold;
        }
        if let Some(v) = settings.get("internal_domains") {
            config.internal_domains = parse_domain_list(v);
        }
        if let Some(v) = settings.get("ignore_domains") {
            config.ignore_domains = parse_domain_list(v);
        }
        if let Some(v) = settings.get("system_prompt")
            && !v.trim().is_empty()
        {
            config.system_prompt = v.trim().to_string();
        }
        if let Some(v) = settings.get("signature") {
            config.signature = v.trim().to_string();
        }
        if let Some(v) = settings.get("fetch_limit") {
            let limit: usize = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "fetch_limit".into(),
                message: format!("'{v}' is not a positive integer"),
            })?;
            if limit == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "fetch_limit".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.fetch_limit = limit;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a comma-separated domain list, lowercased.
fn parse_domain_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_settings_yield_safe_defaults() {
        let config = AgentConfig::from_settings(&HashMap::new()).unwrap();
        assert!(!config.enabled);
        assert!(!config.auto_reply);
        assert!(!config.auto_create_tickets);
        assert!(config.forward_email.is_none());
        assert!((config.review_threshold - DEFAULT_REVIEW_THRESHOLD).abs() < f32::EPSILON);
        assert_eq!(config.fetch_limit, DEFAULT_FETCH_LIMIT);
        assert!(!config.system_prompt.is_empty());
    }

    #[test]
    fn parses_full_settings() {
        let config = AgentConfig::from_settings(&settings(&[
            ("enabled", "true"),
            ("auto_reply", "yes"),
            ("auto_create_tickets", "1"),
            ("cc_email", "office@avintegrators.com"),
            ("forward_email", "triage@avintegrators.com"),
            ("review_threshold", "0.85"),
            ("internal_domains", "AVIntegrators.com, corp.local"),
            ("ignore_domains", "noreply@, mailer-daemon"),
            ("signature", "— The Service Desk"),
            ("fetch_limit", "50"),
        ]))
        .unwrap();

        assert!(config.enabled && config.auto_reply && config.auto_create_tickets);
        assert_eq!(config.cc_email.as_deref(), Some("office@avintegrators.com"));
        assert!((config.review_threshold - 0.85).abs() < 1e-6);
        assert!(config.internal_domains.contains("avintegrators.com"));
        assert!(config.ignore_domains.contains("mailer-daemon"));
        assert_eq!(config.signature, "— The Service Desk");
        assert_eq!(config.fetch_limit, 50);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = AgentConfig::from_settings(&settings(&[("review_threshold", "1.5")]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidValue { key, .. }) if key == "review_threshold"
        ));
    }

    #[test]
    fn rejects_garbage_bool() {
        let err = AgentConfig::from_settings(&settings(&[("enabled", "maybe")]));
        assert!(err.is_err());
    }

    #[test]
    fn blank_forward_email_is_none() {
        let config = AgentConfig::from_settings(&settings(&[("forward_email", "  ")])).unwrap();
        assert!(config.forward_email.is_none());
    }

    #[test]
    fn rejects_zero_fetch_limit() {
        let err = AgentConfig::from_settings(&settings(&[("fetch_limit", "0")]));
        assert!(err.is_err());
    }
}
