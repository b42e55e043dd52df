//! Text-field sanitization for identifiers read from a request.
//!
//! Mirrors the usual CMS text-field cleaning: tags are stripped (script and
//! style blocks with their contents), a `<` that does not open a tag is
//! escaped, control characters are dropped, whitespace runs collapse to a
//! single space, and stray percent-encoded octets are removed.

/// Sanitize a candidate identifier. Returns an empty string when nothing
/// survives.
pub fn sanitize_text_field(input: &str) -> String {
    let without_blocks = strip_blocks(input, "script");
    let without_blocks = strip_blocks(&without_blocks, "style");
    let stripped = strip_tags(&without_blocks);
    let collapsed = collapse_whitespace(&stripped);

    let (without_octets, found) = strip_octets(&collapsed);
    if found {
        collapse_whitespace(&without_octets)
    } else {
        collapsed
    }
}

/// Remove `<tag ...>...</tag>` blocks, contents included, case-insensitively.
fn strip_blocks(input: &str, tag: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(input.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open).map(|i| pos + i) {
        out.push_str(&input[pos..start]);
        // An unterminated block swallows the rest of the input.
        let Some(close_start) = lower[start..].find(&close).map(|i| start + i) else {
            return out;
        };
        pos = match lower[close_start..].find('>') {
            Some(end) => close_start + end + 1,
            None => return out,
        };
    }
    out.push_str(&input[pos..]);
    out
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let opens_tag = chars
            .peek()
            .is_some_and(|(_, next)| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'));
        let close = input[i..].find('>');
        match (opens_tag, close) {
            (true, Some(offset)) => {
                let end = i + offset;
                while chars.peek().is_some_and(|(j, _)| *j <= end) {
                    chars.next();
                }
            }
            // An unclosed tag runs to the end of the input.
            (true, None) => break,
            (false, _) => out.push_str("&lt;"),
        }
    }
    out
}

/// Drop control characters, fold whitespace runs into one space, and trim.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_control() {
            continue;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Remove every `%XX` hex octet, repeating until none remain.
fn strip_octets(input: &str) -> (String, bool) {
    let mut text = input.to_string();
    let mut found = false;
    while let Some(octet) = find_octet(&text) {
        text = text.replace(&octet, "");
        found = true;
    }
    (text, found)
}

fn find_octet(text: &str) -> Option<String> {
    text.as_bytes()
        .windows(3)
        .position(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
        .map(|i| text[i..i + 3].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_untouched() {
        assert_eq!(sanitize_text_field("ABC123"), "ABC123");
        assert_eq!(sanitize_text_field("lead-42_x.y"), "lead-42_x.y");
    }

    #[test]
    fn test_strips_tags() {
        assert_eq!(sanitize_text_field("<b>ABC</b>123"), "ABC123");
        assert_eq!(sanitize_text_field("ABC<script>alert(1)</script>"), "ABC");
        assert_eq!(sanitize_text_field("x<STYLE>p{}</style>y"), "xy");
    }

    #[test]
    fn test_escapes_lone_less_than() {
        assert_eq!(sanitize_text_field("a < b"), "a &lt; b");
        assert_eq!(sanitize_text_field("a<b"), "a");
        assert_eq!(sanitize_text_field("a<3"), "a&lt;3");
    }

    #[test]
    fn test_control_characters_and_whitespace() {
        assert_eq!(sanitize_text_field("  A\tB\r\n C \u{0} "), "A B C");
        assert_eq!(sanitize_text_field("\u{7}\u{1b}"), "");
    }

    #[test]
    fn test_strips_percent_octets() {
        assert_eq!(sanitize_text_field("AB%20C"), "ABC");
        assert_eq!(sanitize_text_field("A %41 B"), "A B");
        assert_eq!(sanitize_text_field("100%"), "100%");
    }
}
