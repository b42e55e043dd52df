//! Request-start extraction and the durable cookie.

use http::header::{COOKIE, SET_COOKIE};
use http::{Request, Response};
use leadglue::base::config::TrackingConfig;
use leadglue::base::identifier::TrackingIdentifier;
use leadglue::extract::{ConnectionInfo, ExtractionSource, LeadSourceExtractor};
use proptest::prelude::*;
use time::macros::datetime;
use url::form_urlencoded::byte_serialize;

fn extractor() -> LeadSourceExtractor {
    LeadSourceExtractor::new(TrackingConfig::default())
}

#[test]
fn test_request_sets_lead_cookie() {
    let mut req = Request::get("/homes?switch_cls[id]=ABC123")
        .body(())
        .unwrap();
    let outcome = extractor().on_request_start_at(&mut req, datetime!(2026-06-01 00:00 UTC));

    let cookie = outcome.cookie().expect("cookie should be queued");
    assert_eq!(cookie.name(), "rentfetch_lead_source");
    assert_eq!(cookie.value(), "ABC123");
    assert_eq!(cookie.expires(), Some(datetime!(2026-07-01 00:00 UTC)));
    assert!(!cookie.is_secure());
    assert!(!cookie.is_http_only());

    let mut response = Response::new(());
    outcome.apply_to_response(&mut response);
    let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(header.starts_with("rentfetch_lead_source=ABC123"));
    assert!(header.contains("SameSite=Lax"));
    assert!(header.contains("Path=/"));
}

#[test]
fn test_value_visible_to_rest_of_request() {
    let mut req = Request::get("/homes?switch_cls%5Bid%5D=ABC123")
        .header(COOKIE, "session=xyz")
        .body(())
        .unwrap();
    extractor().on_request_start(&mut req);

    assert_eq!(
        req.headers().get(COOKIE).unwrap(),
        "session=xyz; rentfetch_lead_source=ABC123"
    );
    assert_eq!(
        req.extensions().get::<TrackingIdentifier>().map(|id| id.as_str()),
        Some("ABC123")
    );
}

#[test]
fn test_new_sighting_overwrites_cookie_value() {
    let mut req = Request::get("/?switch_cls[id]=NEW")
        .header(COOKIE, "rentfetch_lead_source=OLD")
        .body(())
        .unwrap();
    let outcome = extractor().on_request_start(&mut req);

    assert_eq!(outcome.cookie().map(|c| c.value()), Some("NEW"));
    assert_eq!(req.headers().get(COOKIE).unwrap(), "rentfetch_lead_source=NEW");
}

#[test]
fn test_secure_flag_follows_tls() {
    let mut req = Request::get("https://homes.example/?switch_cls[id]=A")
        .body(())
        .unwrap();
    assert!(extractor().on_request_start(&mut req).cookie().unwrap().is_secure());

    let mut req = Request::get("/?switch_cls[id]=A").body(()).unwrap();
    req.extensions_mut().insert(ConnectionInfo { tls: true });
    assert!(extractor().on_request_start(&mut req).cookie().unwrap().is_secure());

    let mut req = Request::get("/?switch_cls[id]=A")
        .header("X-Forwarded-Proto", "https")
        .body(())
        .unwrap();
    assert!(!extractor().on_request_start(&mut req).cookie().unwrap().is_secure());

    let trusting = LeadSourceExtractor::new(TrackingConfig::default().with_trust_forwarded_proto(true));
    let mut req = Request::get("/?switch_cls[id]=A")
        .header("X-Forwarded-Proto", "https")
        .body(())
        .unwrap();
    assert!(trusting.on_request_start(&mut req).cookie().unwrap().is_secure());
}

#[test]
fn test_no_identifier_no_cookie() {
    for target in ["/", "/?page=2", "/?switch_cls[id]=", "/?switch_cls[id]=%20", "/?switch_cls[x]=1"] {
        let mut req = Request::get(target).body(()).unwrap();
        let outcome = extractor().on_request_start(&mut req);
        assert!(outcome.cookie().is_none(), "unexpected cookie for {target}");
        assert!(req.headers().get(COOKIE).is_none());
        assert!(req.extensions().get::<TrackingIdentifier>().is_none());
    }
}

#[test]
fn test_markup_is_sanitized() {
    let e = extractor()
        .extract("switch_cls[id]=%3Cb%3EABC%3C%2Fb%3E123")
        .unwrap();
    assert_eq!(e.identifier.as_str(), "ABC123");
    assert_eq!(e.source, ExtractionSource::NestedMap);
}

#[test]
fn test_custom_plain_parameter_name() {
    let config = TrackingConfig {
        param_name: "lead".to_string(),
        ..TrackingConfig::default()
    };
    let extractor = LeadSourceExtractor::new(config);
    let e = extractor.extract("lead=XYZ").unwrap();
    assert_eq!(e.identifier.as_str(), "XYZ");
    assert_eq!(e.source, ExtractionSource::NestedScalar);
}

proptest! {
    #[test]
    fn prop_encodings_yield_same_value(value in "[A-Za-z0-9._~-]([A-Za-z0-9 ._~-]{0,22}[A-Za-z0-9._~-])?") {
        let encoded: String = byte_serialize(value.as_bytes()).collect();
        let expected = TrackingIdentifier::sanitized(&value).map(TrackingIdentifier::into_string);

        let queries = [
            (format!("switch_cls[id]={encoded}"), ExtractionSource::NestedMap),
            (format!("switch_cls%5Bid%5D={encoded}"), ExtractionSource::NestedMap),
            (format!("switch_cls={encoded}"), ExtractionSource::NestedScalar),
            (format!("utm_source=ad&switch_cls%5bid%5d={encoded}&page=1"), ExtractionSource::NestedMap),
            // Blank literal pair first and a nested override last: only the
            // raw text still carries the value.
            (
                format!("switch_cls[id]=%20&switch_cls%5Bid%5D={encoded}&switch_cls[id][z]=1"),
                ExtractionSource::RawScan,
            ),
        ];
        for (query, source) in &queries {
            let got = extractor().extract(query);
            prop_assert_eq!(
                got.as_ref().map(|e| e.identifier.as_str()),
                expected.as_deref(),
                "query {}",
                query
            );
            if let Some(e) = got {
                prop_assert_eq!(e.source, *source, "query {}", query);
            }
        }
    }

    #[test]
    fn prop_extraction_never_panics(query in ".{0,64}") {
        let _ = extractor().extract(&query);
    }
}
