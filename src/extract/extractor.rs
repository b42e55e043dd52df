//! Request-start hook: find the identifier and queue the durable cookie.

use crate::base::config::TrackingConfig;
use crate::base::identifier::TrackingIdentifier;
use crate::extract::lead_cookie::LeadCookie;
use crate::extract::query::{decode_query_value, scan_raw_param, ParsedQuery, QueryValue};
use http::header::{HeaderMap, HeaderValue, COOKIE};
use http::{Request, Response, Uri};
use std::sync::Arc;
use time::OffsetDateTime;

/// Which query encoding produced the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// `switch_cls` parsed as a map containing `id`.
    NestedMap,
    /// `switch_cls` given as a plain value.
    NestedScalar,
    /// A decoded key spelled exactly `switch_cls[id]`.
    LiteralKey,
    /// Found by scanning the undecoded query text.
    RawScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub identifier: TrackingIdentifier,
    pub source: ExtractionSource,
}

/// Transport facts the host knows about the connection.
///
/// Hosts that terminate TLS themselves insert this into the request
/// extensions so the `Secure` cookie flag can be decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub tls: bool,
}

/// Outcome of the request-start hook.
#[derive(Debug, Clone, Default)]
pub struct RequestStart {
    identifier: Option<TrackingIdentifier>,
    cookie: Option<LeadCookie>,
}

impl RequestStart {
    pub fn identifier(&self) -> Option<&TrackingIdentifier> {
        self.identifier.as_ref()
    }

    pub fn cookie(&self) -> Option<&LeadCookie> {
        self.cookie.as_ref()
    }

    /// Append the pending `Set-Cookie`, if any. Nothing is written when no
    /// identifier was seen.
    pub fn apply_to_headers(&self, headers: &mut HeaderMap) {
        if let Some(cookie) = &self.cookie {
            cookie.append_to(headers);
        }
    }

    pub fn apply_to_response<B>(&self, response: &mut Response<B>) {
        self.apply_to_headers(response.headers_mut());
    }
}

/// Extracts the lead-source identifier from inbound requests.
#[derive(Debug, Clone)]
pub struct LeadSourceExtractor {
    config: Arc<TrackingConfig>,
}

impl LeadSourceExtractor {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn with_shared(config: Arc<TrackingConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Look for the identifier in a query string.
    ///
    /// Encodings are tried in order: nested map, nested plain value, literal
    /// decoded key, raw scan. The first candidate that is non-empty after
    /// trimming wins; it is then sanitized. Never fails.
    pub fn extract(&self, query: &str) -> Option<Extraction> {
        let parsed = ParsedQuery::parse(query);
        let (raw, source) = self.find_candidate(&parsed)?;

        match TrackingIdentifier::sanitized(&raw) {
            Some(identifier) => Some(Extraction { identifier, source }),
            None => {
                tracing::debug!(?source, "tracking value empty after sanitizing");
                None
            }
        }
    }

    pub fn extract_from_uri(&self, uri: &Uri) -> Option<Extraction> {
        uri.query().and_then(|q| self.extract(q))
    }

    fn find_candidate(&self, parsed: &ParsedQuery) -> Option<(String, ExtractionSource)> {
        let config = &*self.config;
        let non_empty = |v: &str| !v.trim().is_empty();

        if let Some((base, key)) = config.nested_param() {
            let nested = parsed
                .get(base)
                .and_then(|v| v.get(key))
                .and_then(QueryValue::as_scalar)
                .filter(|v| non_empty(v));
            if let Some(value) = nested {
                return Some((value.to_string(), ExtractionSource::NestedMap));
            }
        }

        let scalar = parsed
            .get(config.param_base())
            .and_then(QueryValue::as_scalar)
            .filter(|v| non_empty(v));
        if let Some(value) = scalar {
            return Some((value.to_string(), ExtractionSource::NestedScalar));
        }

        if let Some(value) = parsed
            .first_flat(&config.param_name)
            .filter(|v| non_empty(v))
        {
            return Some((value.to_string(), ExtractionSource::LiteralKey));
        }

        [config.encoded_param_name(), config.param_name.clone()]
            .iter()
            .filter_map(|key| scan_raw_param(parsed.raw(), key))
            .filter_map(decode_query_value)
            .find(|value| non_empty(value))
            .map(|value| (value, ExtractionSource::RawScan))
    }

    /// Request-start hook using the current time.
    pub fn on_request_start<B>(&self, request: &mut Request<B>) -> RequestStart {
        self.on_request_start_at(request, OffsetDateTime::now_utc())
    }

    /// Request-start hook.
    ///
    /// Must run before the response body is generated. When an identifier is
    /// present the returned [`RequestStart`] carries the cookie to emit, and
    /// the request itself is updated so later handlers see the value: the
    /// `Cookie` header gains the pair and the identifier is stored in the
    /// request extensions. Absence of an identifier changes nothing.
    pub fn on_request_start_at<B>(
        &self,
        request: &mut Request<B>,
        now: OffsetDateTime,
    ) -> RequestStart {
        let Some(extraction) = self.extract_from_uri(request.uri()) else {
            tracing::trace!(uri = %request.uri(), "no tracking identifier in request");
            return RequestStart::default();
        };

        let secure = is_secure_request(request, self.config.trust_forwarded_proto);
        let cookie = LeadCookie::new(&self.config, &extraction.identifier, secure, now);

        expose_cookie(request.headers_mut(), &self.config.cookie_name, &cookie.pair());
        request
            .extensions_mut()
            .insert(extraction.identifier.clone());

        tracing::debug!(
            identifier = %extraction.identifier,
            source = ?extraction.source,
            secure,
            "captured tracking identifier"
        );

        RequestStart {
            identifier: Some(extraction.identifier),
            cookie: Some(cookie),
        }
    }
}

/// Whether the request arrived over TLS.
///
/// Checks the URI scheme, then a host-supplied [`ConnectionInfo`], then
/// (only if trusted) `X-Forwarded-Proto`. Without any of these the answer is
/// `false`.
pub fn is_secure_request<B>(request: &Request<B>, trust_forwarded_proto: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    if let Some(info) = request.extensions().get::<ConnectionInfo>() {
        return info.tls;
    }
    trust_forwarded_proto
        && request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Replace any existing `name=` pair in the request's `Cookie` header(s)
/// with `pair`, collapsing them into one header.
///
/// Works on raw header bytes: cookie values may carry non-ASCII octets and
/// every other pair must survive untouched.
fn expose_cookie(headers: &mut HeaderMap, name: &str, pair: &str) {
    let mut joined: Vec<u8> = Vec::new();
    for value in headers.get_all(COOKIE) {
        for part in value.as_bytes().split(|b| *b == b';') {
            let part = trim_bytes(part);
            if part.is_empty() {
                continue;
            }
            let part_name = part
                .iter()
                .position(|b| *b == b'=')
                .map_or(part, |eq| &part[..eq]);
            if trim_bytes(part_name) == name.as_bytes() {
                continue;
            }
            joined.extend_from_slice(part);
            joined.extend_from_slice(b"; ");
        }
    }
    joined.extend_from_slice(pair.as_bytes());

    match HeaderValue::from_bytes(&joined) {
        Ok(value) => {
            headers.insert(COOKIE, value);
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not rewrite request cookie header");
        }
    }
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn extractor() -> LeadSourceExtractor {
        LeadSourceExtractor::new(TrackingConfig::default())
    }

    fn id_of(query: &str) -> Option<String> {
        extractor()
            .extract(query)
            .map(|e| e.identifier.into_string())
    }

    #[test]
    fn test_all_encodings_agree() {
        assert_eq!(id_of("switch_cls[id]=ABC123").as_deref(), Some("ABC123"));
        assert_eq!(id_of("switch_cls%5Bid%5D=ABC123").as_deref(), Some("ABC123"));
        assert_eq!(id_of("switch_cls%5bid%5d=ABC123").as_deref(), Some("ABC123"));
        assert_eq!(id_of("switch_cls=ABC123").as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_sources() {
        let e = extractor().extract("switch_cls[id]=A").unwrap();
        assert_eq!(e.source, ExtractionSource::NestedMap);

        let e = extractor().extract("switch_cls=A").unwrap();
        assert_eq!(e.source, ExtractionSource::NestedScalar);
    }

    #[test]
    fn test_literal_key_when_nested_view_is_overridden() {
        // `switch_cls=` and `switch_cls[x]` replace the nested entry, leaving
        // no `id` in it; the flat key still carries the value.
        let e = extractor()
            .extract("switch_cls[id]=A&switch_cls=&switch_cls[x]=1")
            .unwrap();
        assert_eq!(e.identifier.as_str(), "A");
        assert_eq!(e.source, ExtractionSource::LiteralKey);
    }

    #[test]
    fn test_raw_scan_when_structured_views_miss() {
        // The first literal pair is blank and a later nested key turns `id`
        // into a map, so only the encoded spelling in the raw text is left.
        let e = extractor()
            .extract("switch_cls[id]=%20&switch_cls%5Bid%5D=A+B&switch_cls[id][z]=1")
            .expect("raw scan should match");
        assert_eq!(e.identifier.as_str(), "A B");
        assert_eq!(e.source, ExtractionSource::RawScan);
    }

    #[test]
    fn test_plus_only_value_is_blank() {
        assert_eq!(id_of("switch_cls[id]=+"), None);
        assert_eq!(id_of("switch_cls%5Bid%5D=+"), None);
        assert_eq!(id_of("switch_cls=+"), None);
        assert_eq!(id_of("switch_cls[id]=A+B").as_deref(), Some("A B"));
    }

    #[test]
    fn test_missing_or_empty() {
        assert_eq!(id_of(""), None);
        assert_eq!(id_of("page=2"), None);
        assert_eq!(id_of("switch_cls[id]="), None);
        assert_eq!(id_of("switch_cls[id]=%20%20"), None);
        assert_eq!(id_of("switch_cls[id]=<b></b>"), None);
    }

    #[test]
    fn test_empty_candidate_falls_through() {
        assert_eq!(
            id_of("switch_cls[id]=&switch_cls%5Bid%5D=XYZ").as_deref(),
            Some("XYZ")
        );
    }

    #[test]
    fn test_value_is_decoded_and_trimmed() {
        assert_eq!(id_of("switch_cls[id]=%20AB%2FC%20").as_deref(), Some("AB/C"));
    }

    #[test]
    fn test_secure_detection() {
        let req = Request::get("https://site.example/?a=1").body(()).unwrap();
        assert!(is_secure_request(&req, false));

        let req = Request::get("/?a=1").body(()).unwrap();
        assert!(!is_secure_request(&req, false));

        let mut req = Request::get("/?a=1").body(()).unwrap();
        req.extensions_mut().insert(ConnectionInfo { tls: true });
        assert!(is_secure_request(&req, false));

        let req = Request::get("/")
            .header("X-Forwarded-Proto", "https")
            .body(())
            .unwrap();
        assert!(!is_secure_request(&req, false));
        assert!(is_secure_request(&req, true));
    }

    #[test]
    fn test_expose_cookie_replaces_existing_pair() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; rentfetch_lead_source=OLD"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));

        expose_cookie(&mut headers, "rentfetch_lead_source", "rentfetch_lead_source=NEW");

        assert_eq!(headers.get_all(COOKIE).iter().count(), 1);
        assert_eq!(
            headers.get(COOKIE).unwrap(),
            "a=1; b=2; rentfetch_lead_source=NEW"
        );
    }

    #[test]
    fn test_expose_cookie_keeps_non_ascii_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(
            COOKIE,
            HeaderValue::from_bytes("session=xyz; name=café".as_bytes()).unwrap(),
        );

        expose_cookie(&mut headers, "rentfetch_lead_source", "rentfetch_lead_source=ABC");

        assert_eq!(
            headers.get(COOKIE).unwrap().as_bytes(),
            "session=xyz; name=café; rentfetch_lead_source=ABC".as_bytes()
        );
    }

    #[test]
    fn test_request_start_keeps_other_cookies() {
        let mut req = Request::get("/?switch_cls%5Bid%5D=ABC")
            .header(COOKIE, HeaderValue::from_bytes("session=xyz; name=café".as_bytes()).unwrap())
            .body(())
            .unwrap();
        extractor().on_request_start(&mut req);

        let cookie = req.headers().get(COOKIE).unwrap().as_bytes();
        assert!(cookie.starts_with(b"session=xyz; "));
        assert!(cookie.ends_with(b"; rentfetch_lead_source=ABC"));
    }

    #[test]
    fn test_request_start_without_identifier_changes_nothing() {
        let mut req = Request::get("/listing?page=2")
            .header(COOKIE, "rentfetch_lead_source=KEEP")
            .body(())
            .unwrap();
        let outcome = extractor().on_request_start_at(&mut req, datetime!(2026-01-01 00:00 UTC));

        assert!(outcome.identifier().is_none());
        assert!(outcome.cookie().is_none());
        assert_eq!(req.headers().get(COOKIE).unwrap(), "rentfetch_lead_source=KEEP");

        let mut response = Response::new(());
        outcome.apply_to_response(&mut response);
        assert!(response.headers().is_empty());
    }
}
