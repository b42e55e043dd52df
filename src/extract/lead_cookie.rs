//! The durable lead-source cookie.

use crate::base::config::TrackingConfig;
use crate::base::identifier::TrackingIdentifier;
use cookie::{Cookie, SameSite};
use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use time::OffsetDateTime;

/// A `Set-Cookie` record carrying the identifier across requests.
///
/// Path `/`, no domain, `SameSite=Lax`, script-readable (never HttpOnly),
/// and `Secure` only when the request arrived over TLS. Both `Expires` and
/// `Max-Age` are emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadCookie {
    cookie: Cookie<'static>,
}

impl LeadCookie {
    pub fn new(
        config: &TrackingConfig,
        identifier: &TrackingIdentifier,
        secure: bool,
        now: OffsetDateTime,
    ) -> Self {
        let ttl = config.cookie_ttl();
        let cookie = Cookie::build((config.cookie_name.clone(), identifier.as_str().to_string()))
            .path("/")
            .expires(now + ttl)
            .max_age(ttl)
            .secure(secure)
            .http_only(false)
            .same_site(SameSite::Lax)
            .build();
        Self { cookie }
    }

    pub fn name(&self) -> &str {
        self.cookie.name()
    }

    /// The decoded identifier.
    pub fn value(&self) -> &str {
        self.cookie.value()
    }

    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.cookie.expires_datetime()
    }

    pub fn is_secure(&self) -> bool {
        self.cookie.secure().unwrap_or(false)
    }

    pub fn is_http_only(&self) -> bool {
        self.cookie.http_only().unwrap_or(false)
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.cookie.same_site()
    }

    /// `name=value` with the value percent-encoded, as it would appear in a
    /// request `Cookie` header.
    pub fn pair(&self) -> String {
        self.cookie.encoded().stripped().to_string()
    }

    /// The full `Set-Cookie` header value, percent-encoded.
    pub fn header_value(&self) -> String {
        self.cookie.encoded().to_string()
    }

    /// Append this cookie as a `Set-Cookie` header.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.header_value()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(cookie = %self.name(), error = %e, "lead cookie is not a valid header value");
            }
        }
    }
}
