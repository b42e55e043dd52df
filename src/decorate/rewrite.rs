//! Appending the tracking parameter to a link.
//!
//! The parameter is concatenated as text rather than set through a URL
//! builder, so the value lands exactly as given with no further
//! percent-encoding.

use url::Url;

/// Append `name=value` to `href`.
///
/// An absolute `href` is first normalised by the URL parser. Anything that
/// does not parse on its own (relative or protocol-relative paths, malformed
/// input) is handled as plain text. In both cases the parameter goes before
/// any `#fragment`, joined with `&` when a query is already present and `?`
/// otherwise.
pub fn append_tracking_param(href: &str, name: &str, value: &str) -> String {
    match Url::parse(href) {
        Ok(url) => concat_param(url.as_str(), name, value),
        Err(e) => {
            tracing::trace!(href, error = %e, "appending tracking parameter to unparsed link");
            concat_param(href, name, value)
        }
    }
}

fn concat_param(href: &str, name: &str, value: &str) -> String {
    let (head, fragment) = match href.find('#') {
        Some(i) => href.split_at(i),
        None => (href, ""),
    };

    let separator = match head.find('?') {
        None => "?",
        Some(_) if head.ends_with('?') || head.ends_with('&') => "",
        Some(_) => "&",
    };

    let mut out = String::with_capacity(href.len() + name.len() + value.len() + 2);
    out.push_str(head);
    out.push_str(separator);
    out.push_str(name);
    out.push('=');
    out.push_str(value);
    out.push_str(fragment);
    out
}
