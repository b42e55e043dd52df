//! Tracking configuration shared by the extractor and the link decorator.
//!
//! Both components receive the same immutable [`TrackingConfig`] at
//! construction. The defaults reproduce the behaviour of the deployed plugin;
//! a JSON document can override any subset of fields.

use crate::base::error::GlueError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Characters `encodeURIComponent` leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const DEFAULT_PARAM_NAME: &str = "switch_cls[id]";
pub const DEFAULT_STORAGE_KEY: &str = "cms_multifamily_tracking_param";
pub const DEFAULT_STORAGE_EXPIRY_KEY: &str = "cms_multifamily_tracking_expiry";
pub const DEFAULT_COOKIE_NAME: &str = "rentfetch_lead_source";

const DEFAULT_EXCLUDE_DOMAINS: &[&str] = &[
    "google.com",
    "facebook.com",
    "querymonitor.com",
    "wordpress.org",
    "googleapis",
];

// Images and common document/archive types.
const DEFAULT_EXCLUDE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "pdf", "doc", "docx", "xls", "xlsx", "zip",
    "rar",
];

const DEFAULT_EXCLUDE_PROTOCOLS: &[&str] = &["mailto:", "tel:", "sms:", "ftp:", "file:"];

/// Upper bound for `expiry_hours`: ten years.
pub const MAX_EXPIRY_HOURS: u64 = 10 * 365 * 24;

/// Upper bound for `cookie_max_age_days`: ten years.
pub const MAX_COOKIE_AGE_DAYS: u64 = 10 * 365;

/// Immutable configuration for lead-source tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Query parameter carrying the identifier, e.g. `switch_cls[id]`.
    pub param_name: String,

    /// Session storage key holding the identifier.
    pub storage_key: String,

    /// Session storage key holding the expiry (epoch milliseconds as text).
    pub storage_expiry_key: String,

    /// How long session memory keeps the identifier.
    pub expiry_hours: u64,

    /// When non-empty, only hosts containing one of these are decorated.
    pub include_domains: Vec<String>,

    /// Hosts containing any of these are never decorated.
    pub exclude_domains: Vec<String>,

    /// Lower-case file extensions (no leading dot) that are never decorated.
    pub exclude_extensions: Vec<String>,

    /// URL schemes, including the trailing `:`, that are never decorated.
    pub exclude_protocols: Vec<String>,

    /// Name of the durable cookie written by the extractor.
    pub cookie_name: String,

    /// Lifetime of the durable cookie.
    pub cookie_max_age_days: u64,

    /// Honour `X-Forwarded-Proto: https` when deciding the `Secure` flag.
    pub trust_forwarded_proto: bool,

    /// Delay before rescanning after anchors are added to the page.
    pub settle_delay_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            param_name: DEFAULT_PARAM_NAME.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_expiry_key: DEFAULT_STORAGE_EXPIRY_KEY.to_string(),
            expiry_hours: 24,
            include_domains: Vec::new(),
            exclude_domains: to_owned_list(DEFAULT_EXCLUDE_DOMAINS),
            exclude_extensions: to_owned_list(DEFAULT_EXCLUDE_EXTENSIONS),
            exclude_protocols: to_owned_list(DEFAULT_EXCLUDE_PROTOCOLS),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_max_age_days: 30,
            trust_forwarded_proto: false,
            settle_delay_ms: 100,
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl TrackingConfig {
    /// Parse a JSON document and validate it. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, GlueError> {
        let config: Self = serde_json::from_str(json)?;
        config.validated()
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GlueError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GlueError::config_read(path.display().to_string(), e.to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Check invariants and normalise list entries.
    ///
    /// Domains and extensions are lower-cased, extensions lose a leading dot,
    /// and protocols gain a trailing `:` if it was omitted.
    pub fn validated(mut self) -> Result<Self, GlueError> {
        for (field, value) in [
            ("param_name", &self.param_name),
            ("storage_key", &self.storage_key),
            ("storage_expiry_key", &self.storage_expiry_key),
            ("cookie_name", &self.cookie_name),
        ] {
            if value.trim().is_empty() {
                return Err(GlueError::invalid_config(format!("{field} must not be empty")));
            }
        }

        if self.storage_key == self.storage_expiry_key {
            return Err(GlueError::invalid_config(
                "storage_key and storage_expiry_key must differ",
            ));
        }
        if self.expiry_hours == 0 {
            return Err(GlueError::invalid_config("expiry_hours must be positive"));
        }
        if self.expiry_hours > MAX_EXPIRY_HOURS {
            return Err(GlueError::invalid_config(format!(
                "expiry_hours must not exceed {MAX_EXPIRY_HOURS}"
            )));
        }
        if self.cookie_max_age_days == 0 {
            return Err(GlueError::invalid_config(
                "cookie_max_age_days must be positive",
            ));
        }
        if self.cookie_max_age_days > MAX_COOKIE_AGE_DAYS {
            return Err(GlueError::invalid_config(format!(
                "cookie_max_age_days must not exceed {MAX_COOKIE_AGE_DAYS}"
            )));
        }
        if self
            .cookie_name
            .chars()
            .any(|c| c.is_ascii_control() || c.is_whitespace() || "()<>@,;:\\\"/[]?={}".contains(c))
        {
            return Err(GlueError::invalid_config(format!(
                "cookie_name `{}` is not a valid cookie token",
                self.cookie_name
            )));
        }

        self.include_domains =
            normalize_list("include_domains", self.include_domains, |d| normalize_domain(d))?;
        self.exclude_domains =
            normalize_list("exclude_domains", self.exclude_domains, |d| normalize_domain(d))?;
        self.exclude_extensions = normalize_list("exclude_extensions", self.exclude_extensions, |e| {
            e.trim_start_matches('.').to_ascii_lowercase()
        })?;
        self.exclude_protocols = normalize_list("exclude_protocols", self.exclude_protocols, |p| {
            let p = p.to_ascii_lowercase();
            if p.ends_with(':') {
                p
            } else {
                format!("{p}:")
            }
        })?;

        Ok(self)
    }

    pub fn with_include_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_domains = domains.into_iter().map(normalize_domain).collect();
        self
    }

    pub fn with_exclude_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_domains = domains.into_iter().map(normalize_domain).collect();
        self
    }

    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    pub fn with_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.settle_delay_ms = delay_ms;
        self
    }

    /// The parameter name as `encodeURIComponent` would write it,
    /// e.g. `switch_cls%5Bid%5D`.
    pub fn encoded_param_name(&self) -> String {
        utf8_percent_encode(&self.param_name, URI_COMPONENT).to_string()
    }

    /// Split a nested parameter name such as `switch_cls[id]` into
    /// `("switch_cls", "id")`. Plain names return `None`.
    pub fn nested_param(&self) -> Option<(&str, &str)> {
        let (base, rest) = self.param_name.split_once('[')?;
        let key = rest.strip_suffix(']')?;
        if base.is_empty() || key.is_empty() || key.contains(['[', ']']) {
            return None;
        }
        Some((base, key))
    }

    /// The top-level name a PHP-style parser files the parameter under.
    pub fn param_base(&self) -> &str {
        self.nested_param()
            .map(|(base, _)| base)
            .unwrap_or(&self.param_name)
    }

    /// Session memory lifetime. Values past [`MAX_EXPIRY_HOURS`] are capped.
    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::hours(capped(self.expiry_hours, MAX_EXPIRY_HOURS))
    }

    /// Cookie lifetime. Values past [`MAX_COOKIE_AGE_DAYS`] are capped.
    pub fn cookie_ttl(&self) -> time::Duration {
        time::Duration::days(capped(self.cookie_max_age_days, MAX_COOKIE_AGE_DAYS))
    }

    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }
}

fn capped(value: u64, max: u64) -> i64 {
    i64::try_from(value.min(max)).unwrap_or(i64::MAX)
}

/// Hosts from `url` are lower-case, so domain entries must be too.
fn normalize_domain(domain: impl Into<String>) -> String {
    domain.into().trim().to_ascii_lowercase()
}

fn normalize_list(
    field: &str,
    items: Vec<String>,
    normalize: impl Fn(&str) -> String,
) -> Result<Vec<String>, GlueError> {
    items
        .into_iter()
        .map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                Err(GlueError::invalid_config(format!(
                    "{field} must not contain empty entries"
                )))
            } else {
                Ok(normalize(trimmed))
            }
        })
        .collect()
}
