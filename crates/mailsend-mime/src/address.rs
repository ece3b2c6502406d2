//! RFC 5322 address-list parsing.

use crate::header::Headers;

/// A parsed mailbox: an optional display name plus the raw address text.
///
/// Unlike a validated email type, `Mailbox` is the result of a best-effort
/// parse — `address` may not contain an `@` at all if the input was
/// malformed. Use [`Mailbox::is_addressable`] to check whether it is usable
/// as an SMTP envelope recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, if the input carried one (`"Last, First" <a@b>`).
    pub name: Option<String>,
    /// Raw address text between (or in place of) angle brackets.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox with no display name.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a mailbox with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Returns `true` if `address` contains exactly one `@` with non-empty
    /// local and domain parts — the predicate downstream SMTP envelope
    /// construction uses to decide whether an entry is usable.
    #[must_use]
    pub fn is_addressable(&self) -> bool {
        if self.address.matches('@').count() != 1 {
            return false;
        }
        let Some((local, domain)) = self.address.split_once('@') else {
            return false;
        };
        !local.is_empty() && !domain.is_empty()
    }

    /// Renders this mailbox as an RFC 5322 `"name" <addr>` header value,
    /// Q-encoding the display name if it contains non-ASCII text.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => {
                let encoded = Headers::encode_value(name);
                if encoded == *name && needs_quoting(name) {
                    format!("\"{}\" <{}>", name.replace('"', "\\\""), self.address)
                } else {
                    format!("{encoded} <{}>", self.address)
                }
            }
            _ => self.address.clone(),
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.contains(|c: char| ",\"<>@:;()[]\\".contains(c))
}

/// Joins mailboxes into a single header value, comma-separated, per
/// RFC 5322's address-list syntax.
#[must_use]
pub fn join_mailboxes(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(Mailbox::to_header_value)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses an RFC 5322 address-list string into a sequence of mailboxes.
///
/// Honours quoted display names, bracketed addresses, comma separators
/// outside quoted regions, and group syntax (`Group: a@b, c@d;`). Comments
/// in parentheses are stripped. This is a best-effort parse: malformed input
/// never fails, it just yields whatever mailboxes can be recovered — callers
/// that need validity should check [`Mailbox::is_addressable`].
#[must_use]
pub fn parse_address_list(input: &str) -> Vec<Mailbox> {
    let text = strip_comments(input);
    let mut results = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut angle_depth = 0_i32;
    let mut in_group = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                angle_depth += 1;
                current.push(c);
            }
            '>' if !in_quotes => {
                angle_depth = (angle_depth - 1).max(0);
                current.push(c);
            }
            ':' if !in_quotes && angle_depth == 0 && !in_group => {
                in_group = true;
                current.clear();
            }
            ';' if !in_quotes && angle_depth == 0 && in_group => {
                push_if_present(&mut results, &current);
                current.clear();
                in_group = false;
            }
            ',' if !in_quotes && angle_depth == 0 => {
                push_if_present(&mut results, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_if_present(&mut results, &current);

    results
}

fn push_if_present(results: &mut Vec<Mailbox>, token: &str) {
    if let Some(mailbox) = parse_single(token) {
        results.push(mailbox);
    }
}

fn parse_single(token: &str) -> Option<Mailbox> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(start) = token.find('<') {
        if let Some(end) = token.rfind('>') {
            if end > start {
                let name_part = token[..start].trim();
                let name = if name_part.is_empty() {
                    None
                } else {
                    Some(unquote(name_part))
                };
                let address = token[start + 1..end].trim().to_string();
                return Some(Mailbox { name, address });
            }
        }
    }

    Some(Mailbox::new(unquote(token)))
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].replace("\\\"", "\"")
    } else {
        s.to_string()
    }
}

fn strip_comments(s: &str) -> String {
    let mut out = String::new();
    let mut depth = 0_i32;
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth > 0 => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_address() {
        let result = parse_address_list("user@example.com");
        assert_eq!(result, vec![Mailbox::new("user@example.com")]);
    }

    #[test]
    fn parses_quoted_display_name_with_comma() {
        let result = parse_address_list("\"Last, First\" <a@b.com>");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name.as_deref(), Some("Last, First"));
        assert_eq!(result[0].address, "a@b.com");
    }

    #[test]
    fn parses_comma_separated_list() {
        let result = parse_address_list("a@b.com, \"Bob\" <c@d.com>");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].address, "a@b.com");
        assert_eq!(result[1].name.as_deref(), Some("Bob"));
        assert_eq!(result[1].address, "c@d.com");
    }

    #[test]
    fn strips_parenthetical_comments() {
        let result = parse_address_list("user@example.com (this is a comment)");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].address, "user@example.com");
    }

    #[test]
    fn parses_group_syntax() {
        let result = parse_address_list("Undisclosed: a@b.com, c@d.com;");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].address, "a@b.com");
        assert_eq!(result[1].address, "c@d.com");
    }

    #[test]
    fn malformed_input_never_panics_and_is_best_effort() {
        let result = parse_address_list("not-an-address, <>, \"unterminated");
        assert!(!result.is_empty());
        assert!(!result[0].is_addressable());
    }

    #[test]
    fn is_addressable_requires_exactly_one_at_and_nonempty_parts() {
        assert!(Mailbox::new("user@example.com").is_addressable());
        assert!(!Mailbox::new("user@@example.com").is_addressable());
        assert!(!Mailbox::new("@example.com").is_addressable());
        assert!(!Mailbox::new("user@").is_addressable());
        assert!(!Mailbox::new("userexample.com").is_addressable());
    }

    #[test]
    fn to_header_value_q_encodes_non_ascii_name() {
        let mailbox = Mailbox::with_name("Héllo", "h@example.com");
        let rendered = mailbox.to_header_value();
        assert!(rendered.starts_with("=?UTF-8?Q?"));
        assert!(rendered.ends_with("<h@example.com>"));
    }
}
