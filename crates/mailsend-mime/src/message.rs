//! In-memory email representation, validation, and envelope derivation.

use crate::address::{parse_address_list, Mailbox};
use crate::attachment::Attachment;
use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::Headers;
use std::collections::HashSet;
use std::fmt;

/// Transfer encoding for a MIME body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a transfer encoding name, defaulting to 7-bit for anything
    /// unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Picks 7-bit or quoted-printable for a plain-text body: 7-bit if the
    /// text is strictly ASCII and no line exceeds 998 bytes, else
    /// quoted-printable.
    #[must_use]
    pub fn for_text_body(text: &str) -> Self {
        let ascii = text.is_ascii();
        let lines_ok = text.split('\n').all(|line| line.len() <= 998);
        if ascii && lines_ok {
            Self::SevenBit
        } else {
            Self::QuotedPrintable
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Result of [`Message::check_validity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the message passed validation.
    pub is_valid: bool,
    /// The failure reason, present iff `is_valid` is `false`.
    pub validation_error: Option<String>,
}

impl ValidationResult {
    const fn ok() -> Self {
        Self {
            is_valid: true,
            validation_error: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            validation_error: Some(message.into()),
        }
    }
}

/// An in-memory email message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Envelope/header `From`.
    pub from: Option<Mailbox>,
    /// `Sender` header, if distinct from `From`.
    pub sender: Option<Mailbox>,
    /// `Reply-To` header.
    pub reply_to: Option<Mailbox>,
    /// `To` recipients.
    pub to: Vec<Mailbox>,
    /// `Cc` recipients.
    pub cc: Vec<Mailbox>,
    /// `Bcc` recipients (envelope-only; never rendered into headers).
    pub bcc: Vec<Mailbox>,
    /// `Subject` header.
    pub subject: Option<String>,
    /// `Date` header, as supplied by the caller. Defaulted by the encoder
    /// if absent or not RFC 2822-valid.
    pub date: Option<String>,
    /// `Message-ID` header, as supplied by the caller. Defaulted by the
    /// encoder if absent.
    pub message_id: Option<String>,
    /// User-supplied extra headers, passed through verbatim.
    pub extra_headers: Headers,
    /// Content type of the primary body.
    pub content_type: ContentType,
    /// Primary plain-text body.
    pub text: Option<String>,
    /// Alternate representation (typically HTML) forming
    /// `multipart/alternative` with `text`.
    pub alternative: Option<String>,
    /// Ordered attachments.
    pub attachments: Vec<Attachment>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            from: None,
            sender: None,
            reply_to: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            date: None,
            message_id: None,
            extra_headers: Headers::new(),
            content_type: ContentType::text_plain(),
            text: None,
            alternative: None,
            attachments: Vec::new(),
        }
    }
}

impl Message {
    /// Starts building a new message.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Validates that this message is fit to send.
    ///
    /// `from` must be present and parse to at least one addressable
    /// mailbox; at least one of `to`/`cc`/`bcc` must yield at least one
    /// addressable recipient. This check is free of side effects and
    /// re-running it without mutating the message returns the same result.
    #[must_use]
    pub fn check_validity(&self) -> ValidationResult {
        let Some(from) = &self.from else {
            return ValidationResult::fail("Message must have a `from` header");
        };
        if !from.is_addressable() {
            return ValidationResult::fail("Message must have a `from` header");
        }

        let has_recipient = self
            .to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .any(Mailbox::is_addressable);

        if !has_recipient {
            return ValidationResult::fail(
                "Message must have at least one `to`, `cc`, or `bcc` header",
            );
        }

        ValidationResult::ok()
    }
}

/// Builder for [`Message`].
#[derive(Debug, Default)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Sets the `From` header from an address-list string, taking the first
    /// parsed mailbox.
    #[must_use]
    pub fn from(mut self, address: &str) -> Self {
        self.message.from = parse_address_list(address).into_iter().next();
        self
    }

    /// Sets the `Sender` header.
    #[must_use]
    pub fn sender(mut self, address: &str) -> Self {
        self.message.sender = parse_address_list(address).into_iter().next();
        self
    }

    /// Sets the `Reply-To` header.
    #[must_use]
    pub fn reply_to(mut self, address: &str) -> Self {
        self.message.reply_to = parse_address_list(address).into_iter().next();
        self
    }

    /// Appends recipients to `To` from an address-list string.
    #[must_use]
    pub fn to(mut self, addresses: &str) -> Self {
        self.message.to.extend(parse_address_list(addresses));
        self
    }

    /// Appends recipients to `Cc` from an address-list string.
    #[must_use]
    pub fn cc(mut self, addresses: &str) -> Self {
        self.message.cc.extend(parse_address_list(addresses));
        self
    }

    /// Appends recipients to `Bcc` from an address-list string.
    #[must_use]
    pub fn bcc(mut self, addresses: &str) -> Self {
        self.message.bcc.extend(parse_address_list(addresses));
        self
    }

    /// Sets the `Subject` header.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.message.subject = Some(subject.into());
        self
    }

    /// Sets the `Date` header (overriding the encoder's default).
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.message.date = Some(date.into());
        self
    }

    /// Sets the `Message-ID` header (overriding the encoder's default).
    #[must_use]
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message.message_id = Some(message_id.into());
        self
    }

    /// Adds a custom header, passed through verbatim.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.extra_headers.add(name, value);
        self
    }

    /// Sets the primary plain-text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.message.text = Some(text.into());
        self
    }

    /// Sets the alternate (typically HTML) representation.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.message.alternative = Some(html.into());
        self
    }

    /// Overrides the content type of the primary body.
    #[must_use]
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.message.content_type = content_type;
        self
    }

    /// Appends an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.message.attachments.push(attachment);
        self
    }

    /// Finishes the builder, producing a [`Message`].
    ///
    /// No validation happens here; call [`Message::check_validity`] before
    /// sending.
    #[must_use]
    pub fn build(self) -> Message {
        self.message
    }
}

/// The per-send envelope derived from a [`Message`]: the sender address,
/// the deduplicated recipient list, and the return path, plus the message
/// itself so the caller doesn't need to track both.
#[derive(Debug)]
pub struct MessageStack {
    /// Envelope sender (`MAIL FROM`).
    pub from: String,
    /// Deduplicated envelope recipients (`RCPT TO`), union of
    /// `to`+`cc`+`bcc`, first occurrence wins.
    pub to: Vec<String>,
    /// Return path, currently always equal to `from`.
    pub return_path: String,
    /// The message this stack was derived from.
    pub message: Message,
}

/// Builds the [`MessageStack`] for a message: envelope sender, deduplicated
/// recipient list (first occurrence across `to` then `cc` then `bcc` wins),
/// and return path. Pure — does not touch the network.
///
/// # Errors
///
/// Returns an error if the message has no addressable `from`.
pub fn create_message_stack(message: Message) -> Result<MessageStack> {
    let from = message
        .from
        .as_ref()
        .filter(|f| f.is_addressable())
        .ok_or_else(|| Error::InvalidMessage("Message must have a `from` header".to_string()))?
        .address
        .clone();

    let mut seen = HashSet::new();
    let mut to = Vec::new();
    for mailbox in message
        .to
        .iter()
        .chain(message.cc.iter())
        .chain(message.bcc.iter())
    {
        if mailbox.is_addressable() && seen.insert(mailbox.address.clone()) {
            to.push(mailbox.address.clone());
        }
    }

    let return_path = from.clone();

    Ok(MessageStack {
        from,
        to,
        return_path,
        message,
    })
}
