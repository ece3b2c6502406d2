//! Streaming RFC 5322 / RFC 2045 renderer for [`Message`].
//!
//! [`Encoder`] is a pull iterator: [`Encoder::next_chunk`] yields one byte
//! chunk at a time, reading attachment bytes lazily so a very large
//! attachment never needs to be fully materialized in memory. Dot-stuffing
//! and CRLF normalization of the DATA payload are the SMTP connection's
//! responsibility, not this type's — see `mailsend_smtp::connection`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::pin::Pin;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::address::Mailbox;
use crate::attachment::{Attachment, AttachmentData, ATTACHMENT_CHUNK_SIZE};
use crate::content_type::ContentType;
use crate::encoding::{encode_base64, encode_quoted_printable, wrap_base64_chunk};
use crate::error::Result;
use crate::header::{fold_header_line, Headers};
use crate::message::{Message, TransferEncoding};

/// A piece of the encoder's output: either literal bytes ready to emit, or
/// a placeholder for a streamed attachment body.
enum Segment {
    Bytes(Vec<u8>),
    Attachment(usize),
}

/// How an attachment's bytes are transformed as they're read.
enum AttachmentMode {
    /// Base64, wrapped at 76 columns; column state carries across chunks.
    Base64 { column: usize },
    /// Bytes emitted unchanged (the caller already encoded them).
    Verbatim,
}

/// Lazy byte source for one attachment, opened on first read.
enum AttachmentReader {
    Bytes { data: Vec<u8>, pos: usize },
    Path { path: PathBuf, file: Option<tokio::fs::File> },
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl AttachmentReader {
    fn new(data: AttachmentData) -> Self {
        match data {
            AttachmentData::Bytes(data) => Self::Bytes { data, pos: 0 },
            AttachmentData::Path(path) => Self::Path { path, file: None },
            AttachmentData::Reader(reader) => Self::Stream(reader),
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Bytes { data, pos } => {
                if *pos >= data.len() {
                    return Ok(None);
                }
                let end = (*pos + ATTACHMENT_CHUNK_SIZE).min(data.len());
                let chunk = data[*pos..end].to_vec();
                *pos = end;
                Ok(Some(chunk))
            }
            Self::Path { path, file } => {
                if file.is_none() {
                    *file = Some(tokio::fs::File::open(&path).await?);
                }
                let handle = file.as_mut().expect("just opened");
                let mut buf = vec![0_u8; ATTACHMENT_CHUNK_SIZE];
                let n = handle.read(&mut buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    buf.truncate(n);
                    Ok(Some(buf))
                }
            }
            Self::Stream(stream) => {
                let mut buf = vec![0_u8; ATTACHMENT_CHUNK_SIZE];
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    buf.truncate(n);
                    Ok(Some(buf))
                }
            }
        }
    }
}

struct AttachmentCursor {
    reader: AttachmentReader,
    mode: AttachmentMode,
}

/// Streaming MIME encoder: drains a [`Message`] into the byte stream its
/// `DATA` phase should carry.
pub struct Encoder {
    segments: VecDeque<Segment>,
    attachments: Vec<Option<Attachment>>,
    current: Option<AttachmentCursor>,
}

/// Generates a fresh multipart boundary token. Random tokens are used
/// rather than scanning body content for collisions, matching common
/// practice: the entropy here makes an accidental collision astronomically
/// unlikely.
fn random_boundary() -> String {
    let suffix: u64 = rand::thread_rng().r#gen();
    format!("----=_mailsend_{suffix:016x}")
}

/// Encodes a `u64` as lowercase base36, used for the message-id timestamp.
fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_else(|_| "0".to_string())
}

fn default_message_id() -> String {
    let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let random: u32 = rand::thread_rng().r#gen();
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("<{}.{:x}@{host}>", to_base36(timestamp), random)
}

fn normalize_message_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        trimmed.to_string()
    } else {
        format!("<{trimmed}>")
    }
}

fn default_date() -> String {
    chrono::Utc::now().to_rfc2822()
}

fn encode_header_text(value: &str) -> String {
    crate::encoding::encode_rfc2047_words(value, "UTF-8")
}

/// Renders one `Name: value` header line, folded to the 76-column limit,
/// terminated with CRLF.
fn render_header(name: &str, value: &str) -> Vec<u8> {
    let mut line = fold_header_line(name, value);
    line.push_str("\r\n");
    line.into_bytes()
}

/// Renders an address-list header. Multiple entries are joined by `,` +
/// CRLF + tab continuation, per RFC 5322 folding for address lists.
fn render_address_header(name: &str, mailboxes: &[Mailbox]) -> Option<Vec<u8>> {
    if mailboxes.is_empty() {
        return None;
    }
    let rendered: Vec<String> = mailboxes.iter().map(Mailbox::to_header_value).collect();
    let joined = rendered.join(",\r\n\t");
    let line = format!("{name}: {joined}\r\n");
    Some(line.into_bytes())
}

struct HeaderPlan {
    date: String,
    message_id: String,
}

fn plan_headers(message: &Message) -> HeaderPlan {
    let date = message
        .date
        .as_deref()
        .and_then(|d| chrono::DateTime::parse_from_rfc2822(d).ok().map(|_| d.to_string()))
        .unwrap_or_else(default_date);

    let message_id = message
        .message_id
        .as_deref()
        .map(normalize_message_id)
        .unwrap_or_else(default_message_id);

    HeaderPlan { date, message_id }
}

/// Renders the top-level envelope/MIME headers shared by every body
/// structure: `From`, `Reply-To`, `Sender`, `To`, `Cc`, `Subject`,
/// `Message-ID`, `Date`, user extras, then `Mime-Version`.
///
/// `Bcc` is deliberately never rendered: it is an envelope-only instruction
/// (see [`Message::bcc`]) and must not leak into the delivered headers.
fn render_common_headers(message: &Message, plan: &HeaderPlan, out: &mut Vec<u8>) {
    if let Some(from) = &message.from {
        out.extend(render_header("From", &from.to_header_value()));
    }
    if let Some(reply_to) = &message.reply_to {
        out.extend(render_header("Reply-To", &reply_to.to_header_value()));
    }
    if let Some(sender) = &message.sender {
        out.extend(render_header("Sender", &sender.to_header_value()));
    }
    if let Some(bytes) = render_address_header("To", &message.to) {
        out.extend(bytes);
    }
    if let Some(bytes) = render_address_header("Cc", &message.cc) {
        out.extend(bytes);
    }
    if let Some(subject) = &message.subject {
        out.extend(render_header("Subject", &encode_header_text(subject)));
    }
    out.extend(render_header("Message-ID", &plan.message_id));
    out.extend(render_header("Date", &plan.date));
    for (name, value) in message.extra_headers.iter() {
        out.extend(render_header(name, &encode_header_text(value)));
    }
}

/// A single part body plus the headers needed to introduce it within a
/// multipart container (or, for the top-level bare-body case, the whole
/// message).
struct PartBuilder<'a> {
    attachments: &'a mut Vec<Option<Attachment>>,
    attachment_index: &'a mut usize,
}

impl PartBuilder<'_> {
    fn register_attachment(&mut self, attachment: Attachment) -> usize {
        let idx = *self.attachment_index;
        self.attachments.push(Some(attachment));
        *self.attachment_index += 1;
        idx
    }

    /// Renders a plain-text part (the primary `text` or `alternative` body)
    /// inline, choosing 7bit or quoted-printable transfer encoding.
    fn render_text_part(&self, text: &str, content_type: &ContentType, segments: &mut Vec<Segment>) {
        let encoding = TransferEncoding::for_text_body(text);
        let mut header = Vec::new();
        header.extend(render_header("Content-Type", &content_type.to_string()));
        header.extend(render_header("Content-Transfer-Encoding", &encoding.to_string()));
        header.extend(b"\r\n".to_vec());

        let body = match encoding {
            TransferEncoding::QuotedPrintable => encode_quoted_printable(text.as_bytes()),
            _ => text.replace('\n', "\r\n").replace("\r\r\n", "\r\n"),
        };
        header.extend(body.into_bytes());
        segments.push(Segment::Bytes(header));
    }

    /// Renders an attachment's part headers, then queues its body for
    /// streaming. If the attachment carries `related` sub-attachments, it
    /// becomes a nested `multipart/related` instead of a single part.
    fn render_attachment_part(&mut self, mut attachment: Attachment, segments: &mut Vec<Segment>) {
        let related = std::mem::take(&mut attachment.related);
        if related.is_empty() {
            self.render_leaf_attachment(attachment, segments);
            return;
        }

        let boundary = random_boundary();
        segments.push(Segment::Bytes(
            format!("Content-Type: multipart/related; boundary=\"{boundary}\"\r\n\r\n").into_bytes(),
        ));
        segments.push(Segment::Bytes(format!("--{boundary}\r\n").into_bytes()));
        self.render_leaf_attachment(attachment, segments);
        for rel in related {
            segments.push(Segment::Bytes(format!("\r\n--{boundary}\r\n").into_bytes()));
            self.render_attachment_part(rel, segments);
        }
        segments.push(Segment::Bytes(format!("\r\n--{boundary}--\r\n").into_bytes()));
    }

    fn render_leaf_attachment(&mut self, attachment: Attachment, segments: &mut Vec<Segment>) {
        let mut header = Vec::new();
        let mut content_type = format!("{}", attachment.content_type);
        if let Some(name) = &attachment.name {
            content_type.push_str(&format!("; name=\"{name}\""));
        }
        if let Some(charset) = &attachment.charset {
            content_type.push_str(&format!("; charset={charset}"));
        }
        if let Some(method) = &attachment.method {
            content_type.push_str(&format!("; method={method}"));
        }
        header.extend(render_header("Content-Type", &content_type));

        let transfer_encoding = if attachment.encoded {
            attachment
                .transfer_encoding
                .clone()
                .unwrap_or_else(|| "base64".to_string())
        } else {
            "base64".to_string()
        };
        header.extend(render_header("Content-Transfer-Encoding", &transfer_encoding));

        let disposition = if attachment.inline { "inline" } else { "attachment" };
        let mut disposition_value = disposition.to_string();
        if let Some(name) = &attachment.name {
            disposition_value.push_str(&format!("; filename=\"{name}\""));
        }
        header.extend(render_header("Content-Disposition", &disposition_value));

        if let Some(cid) = &attachment.content_id {
            header.extend(render_header("Content-ID", &format!("<{cid}>")));
        }
        header.extend(b"\r\n".to_vec());
        segments.push(Segment::Bytes(header));

        let idx = self.register_attachment(attachment);
        segments.push(Segment::Attachment(idx));
    }
}

impl Encoder {
    /// Builds an encoder for `message`. Consumes the message (attachment
    /// streams can only be read once).
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails validation.
    pub fn new(message: Message) -> Result<Self> {
        let validity = message.check_validity();
        if !validity.is_valid {
            return Err(crate::error::Error::InvalidMessage(
                validity.validation_error.unwrap_or_default(),
            ));
        }

        let plan = plan_headers(&message);
        let mut attachments: Vec<Option<Attachment>> = Vec::new();
        let mut attachment_index = 0_usize;
        let mut segments = Vec::new();

        let mut common = Vec::new();
        render_common_headers(&message, &plan, &mut common);

        let has_alternative = message.alternative.is_some();
        let has_attachments = !message.attachments.is_empty();

        match (message.text.as_deref(), has_alternative, has_attachments) {
            (Some(text), false, false) => {
                common.extend(render_header("Content-Type", &message.content_type.to_string()));
                let encoding = TransferEncoding::for_text_body(text);
                common.extend(render_header("Content-Transfer-Encoding", &encoding.to_string()));
                common.extend(render_header("Mime-Version", "1.0"));
                common.extend(b"\r\n".to_vec());
                let body = match encoding {
                    TransferEncoding::QuotedPrintable => encode_quoted_printable(text.as_bytes()),
                    _ => text.replace('\n', "\r\n").replace("\r\r\n", "\r\n"),
                };
                common.extend(body.into_bytes());
                segments.push(Segment::Bytes(common));
            }
            (text, alt_present, attachments_present) => {
                common.extend(render_header("Mime-Version", "1.0"));

                let mut builder = PartBuilder {
                    attachments: &mut attachments,
                    attachment_index: &mut attachment_index,
                };

                // Build the alternative-or-text core.
                let core_segments: Vec<Segment> = if alt_present {
                    let alt_boundary = random_boundary();
                    let mut inner = Vec::new();

                    let alt_header = render_header(
                        "Content-Type",
                        &format!("multipart/alternative; boundary=\"{alt_boundary}\""),
                    );
                    if attachments_present {
                        // This core becomes a nested part inside the outer
                        // multipart/mixed, so it needs its own Content-Type
                        // header introducing it rather than one leaking to
                        // the top level (where multipart/mixed's goes).
                        let mut part_header = alt_header;
                        part_header.extend(b"\r\n".to_vec());
                        inner.push(Segment::Bytes(part_header));
                    } else {
                        common.extend(alt_header);
                    }

                    inner.push(Segment::Bytes(format!("--{alt_boundary}\r\n").into_bytes()));
                    if let Some(text) = text {
                        builder.render_text_part(text, &message.content_type, &mut inner);
                    }
                    inner.push(Segment::Bytes(format!("\r\n--{alt_boundary}\r\n").into_bytes()));
                    builder.render_text_part(
                        message.alternative.as_deref().unwrap_or_default(),
                        &ContentType::text_html(),
                        &mut inner,
                    );
                    inner.push(Segment::Bytes(format!("\r\n--{alt_boundary}--\r\n").into_bytes()));

                    inner
                } else {
                    let mut inner = Vec::new();
                    if let Some(text) = text {
                        builder.render_text_part(text, &message.content_type, &mut inner);
                    }
                    inner
                };

                if attachments_present {
                    let mixed_boundary = random_boundary();
                    common.extend(render_header(
                        "Content-Type",
                        &format!("multipart/mixed; boundary=\"{mixed_boundary}\""),
                    ));
                    common.extend(b"\r\n".to_vec());
                    segments.push(Segment::Bytes(common));

                    segments.push(Segment::Bytes(format!("--{mixed_boundary}\r\n").into_bytes()));
                    segments.extend(core_segments);

                    for attachment in message.attachments {
                        segments.push(Segment::Bytes(
                            format!("\r\n--{mixed_boundary}\r\n").into_bytes(),
                        ));
                        builder.render_attachment_part(attachment, &mut segments);
                    }
                    segments.push(Segment::Bytes(
                        format!("\r\n--{mixed_boundary}--\r\n").into_bytes(),
                    ));
                } else {
                    common.extend(b"\r\n".to_vec());
                    segments.push(Segment::Bytes(common));
                    segments.extend(core_segments);
                }
            }
        }

        Ok(Self {
            segments: segments.into(),
            attachments,
            current: None,
        })
    }

    /// Pulls the next chunk of the encoded byte stream, or `None` once the
    /// message is exhausted. Never buffers a whole attachment: each call
    /// reads at most [`ATTACHMENT_CHUNK_SIZE`] bytes from the underlying
    /// source before base64/verbatim-wrapping it.
    ///
    /// # Errors
    ///
    /// Returns an error if reading an attachment's path or stream fails.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(cursor) = &mut self.current {
                match cursor.reader.read_chunk().await? {
                    Some(raw) => {
                        let out = match &mut cursor.mode {
                            AttachmentMode::Base64 { column } => {
                                wrap_base64_chunk(&encode_base64(&raw), column).into_bytes()
                            }
                            AttachmentMode::Verbatim => raw,
                        };
                        return Ok(Some(out));
                    }
                    None => {
                        self.current = None;
                    }
                }
                continue;
            }

            match self.segments.pop_front() {
                None => return Ok(None),
                Some(Segment::Bytes(bytes)) => return Ok(Some(bytes)),
                Some(Segment::Attachment(idx)) => {
                    let attachment = self.attachments[idx]
                        .take()
                        .expect("attachment segment consumed exactly once");
                    let mode = if attachment.encoded {
                        AttachmentMode::Verbatim
                    } else {
                        AttachmentMode::Base64 { column: 0 }
                    };
                    self.current = Some(AttachmentCursor {
                        reader: AttachmentReader::new(attachment.data),
                        mode,
                    });
                }
            }
        }
    }

    /// Drains the whole encoder into a single buffer. Convenience for
    /// tests and small messages; production sends should prefer
    /// [`Encoder::next_chunk`] to avoid buffering large attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk read fails.
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend(chunk);
        }
        Ok(out)
    }
}
