//! Reading the tracking parameter from the current page URL.

use crate::base::identifier::TrackingIdentifier;
use crate::extract::query::{decode_query_value, scan_raw_param};
use url::Url;

/// Find the tracking parameter in `page`'s query.
///
/// Tries the decoded query pairs under the literal name, then under the
/// percent-encoded name, then scans the raw query text for either spelling.
/// Only the first pair for each name is consulted; an empty value moves on
/// to the next strategy.
pub fn tracking_param_from_url(page: &Url, name: &str, encoded_name: &str) -> Option<TrackingIdentifier> {
    for key in [name, encoded_name] {
        let first = page
            .query_pairs()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| TrackingIdentifier::new(v));
        if first.is_some() {
            return first;
        }
    }

    let raw = page.query()?;
    [name, encoded_name]
        .into_iter()
        .filter_map(|key| scan_raw_param(raw, key))
        .filter_map(decode_query_value)
        .find_map(TrackingIdentifier::new)
}
