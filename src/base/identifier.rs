use crate::extract::sanitize::sanitize_text_field;
use std::fmt;

/// An opaque lead-source token.
///
/// Always trimmed and never empty. Values read by the server extractor are
/// additionally sanitized; values re-read from a page URL or session memory
/// are carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingIdentifier(String);

impl TrackingIdentifier {
    /// Trim a raw value. Empty input yields `None`.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Trim and sanitize a value taken from an untrusted request.
    pub fn sanitized(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Self::new(sanitize_text_field(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TrackingIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackingIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_blank_are_none() {
        assert!(TrackingIdentifier::new("").is_none());
        assert!(TrackingIdentifier::new("   \t").is_none());
        assert!(TrackingIdentifier::sanitized(" <b></b> ").is_none());
    }

    #[test]
    fn test_trimmed() {
        let id = TrackingIdentifier::new("  ABC123 ").unwrap();
        assert_eq!(id.as_str(), "ABC123");
        assert_eq!(id.to_string(), "ABC123");
    }

    #[test]
    fn test_sanitized_strips_markup() {
        let id = TrackingIdentifier::sanitized("ABC<script>x</script>123").unwrap();
        assert_eq!(id.as_str(), "ABC123");
    }
}
