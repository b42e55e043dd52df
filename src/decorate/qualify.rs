//! Deciding whether an anchor should carry the tracking parameter.

use crate::base::config::TrackingConfig;
use std::sync::Arc;
use url::Url;

/// Result of checking one link. Every variant except
/// [`LinkVerdict::Qualifies`] means "leave the link alone".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVerdict {
    /// The anchor was evaluated earlier in this page view.
    AlreadyEvaluated,
    /// The anchor has no `href`.
    MissingHref,
    /// The destination could not be resolved.
    Unparseable,
    SameHost,
    ExcludedDomain,
    /// An include list is configured and the host is not on it.
    NotIncluded,
    ExcludedProtocol,
    ExcludedExtension,
    /// The link already carries the parameter.
    AlreadyTagged,
    Qualifies,
}

impl LinkVerdict {
    pub fn qualifies(self) -> bool {
        self == LinkVerdict::Qualifies
    }
}

/// Applies the include/exclude rules to candidate links.
#[derive(Debug, Clone)]
pub struct LinkQualifier {
    config: Arc<TrackingConfig>,
    encoded_param: String,
}

impl LinkQualifier {
    pub fn new(config: Arc<TrackingConfig>) -> Self {
        let encoded_param = config.encoded_param_name();
        Self {
            config,
            encoded_param,
        }
    }

    /// Check `href` as found on a page at `page`.
    ///
    /// Rules run in order and the first that matches decides: same host,
    /// excluded domain, include list, excluded scheme, excluded file
    /// extension, already tagged. An `href` that cannot be resolved against
    /// the page never qualifies.
    pub fn evaluate(&self, href: &str, page: &Url) -> LinkVerdict {
        let Ok(link) = page.join(href) else {
            return LinkVerdict::Unparseable;
        };

        let host = link.host_str().unwrap_or("");
        if host == page.host_str().unwrap_or("") {
            return LinkVerdict::SameHost;
        }
        if self.config.exclude_domains.iter().any(|d| host.contains(d.as_str())) {
            return LinkVerdict::ExcludedDomain;
        }
        if !self.config.include_domains.is_empty()
            && !self.config.include_domains.iter().any(|d| host.contains(d.as_str()))
        {
            return LinkVerdict::NotIncluded;
        }
        if self.is_excluded_protocol(href) {
            return LinkVerdict::ExcludedProtocol;
        }
        if self.is_excluded_file_type(&link) {
            return LinkVerdict::ExcludedExtension;
        }
        if self.contains_tracking_param(href) {
            return LinkVerdict::AlreadyTagged;
        }
        LinkVerdict::Qualifies
    }

    /// Case-insensitive scheme prefix check (`mailto:`, `tel:`, ...).
    pub fn is_excluded_protocol(&self, href: &str) -> bool {
        let href = href.trim_start();
        self.config.exclude_protocols.iter().any(|p| {
            href.get(..p.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(p))
        })
    }

    /// Whether the path ends in an excluded extension. The extension is the
    /// lower-cased text after the last `.` of the path, cut at any `?`.
    pub fn is_excluded_file_type(&self, link: &Url) -> bool {
        let path = link.path().to_ascii_lowercase();
        let Some(dot) = path.rfind('.') else {
            return false;
        };
        let extension = path[dot + 1..].split('?').next().unwrap_or("");
        self.config
            .exclude_extensions
            .iter()
            .any(|e| e == extension)
    }

    /// Whether `href` already mentions the parameter, literally or encoded.
    pub fn contains_tracking_param(&self, href: &str) -> bool {
        href.contains(self.config.param_name.as_str()) || href.contains(self.encoded_param.as_str())
    }
}
