//! MIME header handling.

use crate::encoding::{decode_rfc2047, encode_rfc2047_words};
use crate::error::Result;
use std::fmt;

/// Maximum recommended header line length before folding (RFC 5322 §2.1.1).
pub const MAX_HEADER_LINE_LENGTH: usize = 76;

/// Collection of email headers that preserves insertion order.
///
/// Unlike a map keyed purely by name, `Headers` keeps the order values were
/// added in, so iteration and `Display` produce stable output matching
/// whatever order the caller added headers in.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value, keeping any existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values for the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Gets the first value for a header (case-insensitive name match).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header (case-insensitive name match), in the
    /// order they were added.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes all values for a header (case-insensitive name match).
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns `true` if no header has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Encodes a header value using RFC 2047 Q-encoding if it contains
    /// non-ASCII text.
    #[must_use]
    pub fn encode_value(value: &str) -> String {
        encode_rfc2047_words(value, "UTF-8")
    }

    /// Decodes a header value from RFC 2047 if encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_value(value: &str) -> Result<String> {
        decode_rfc2047(value)
    }
}

/// Folds a single `Name: value` header line so that no physical line exceeds
/// [`MAX_HEADER_LINE_LENGTH`] columns, inserting CRLF + single-space
/// continuation as required by RFC 5322 §2.2.3. Splits only at whitespace
/// boundaries in `value`; a single word longer than the limit is emitted
/// unbroken rather than corrupted.
#[must_use]
pub fn fold_header_line(name: &str, value: &str) -> String {
    let prefix = format!("{name}: ");
    let mut out = String::new();
    let mut line_len = 0;

    out.push_str(&prefix);
    line_len += prefix.len();

    let mut first_word_on_line = true;
    for word in value.split(' ') {
        let needed = usize::from(!first_word_on_line) + word.len();
        if line_len + needed > MAX_HEADER_LINE_LENGTH && !first_word_on_line {
            out.push_str("\r\n ");
            line_len = 1;
            first_word_on_line = true;
        }
        if !first_word_on_line {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(word);
        line_len += word.len();
        first_word_on_line = false;
    }

    out
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}", fold_header_line(name, value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn add_get_preserves_multiple_values() {
        let mut headers = Headers::new();
        headers.add("Received", "from a");
        headers.add("Received", "from b");
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
    }

    #[test]
    fn set_replaces_existing_values() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To").len(), 1);
        assert_eq!(headers.get("To"), Some("charlie@example.com"));
    }

    #[test]
    fn remove_drops_all_matching_values() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.remove("subject");
        assert!(headers.get("Subject").is_none());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Subject", "From", "To"]);
    }

    #[test]
    fn display_folds_long_lines_under_limit() {
        let mut headers = Headers::new();
        let long_value = "word ".repeat(40);
        headers.add("X-Long", long_value.trim());

        let rendered = headers.to_string();
        for line in rendered.split("\r\n") {
            assert!(line.len() <= MAX_HEADER_LINE_LENGTH);
        }
    }

    #[test]
    fn fold_header_line_keeps_short_value_on_one_line() {
        let folded = fold_header_line("Subject", "Hello there");
        assert_eq!(folded, "Subject: Hello there");
    }
}
