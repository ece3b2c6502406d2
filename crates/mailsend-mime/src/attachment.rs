//! Attachment data model.

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Chunk size used when the encoder streams attachment bytes. Fixed so that
/// very large attachments never need full in-memory materialization.
pub const ATTACHMENT_CHUNK_SIZE: usize = 64 * 1024;

/// Source of an attachment's bytes.
pub enum AttachmentData {
    /// Bytes already held in memory.
    Bytes(Vec<u8>),
    /// A path to be opened and read lazily from the filesystem.
    Path(PathBuf),
    /// A caller-supplied byte stream, consumed once.
    Reader(Pin<Box<dyn AsyncRead + Send>>),
}

impl fmt::Debug for AttachmentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Reader(_) => f.debug_tuple("Reader").field(&"<stream>").finish(),
        }
    }
}

/// A MIME attachment: an inline buffer, filesystem path, or readable stream,
/// plus the metadata needed to render its MIME part headers.
#[derive(Debug)]
pub struct Attachment {
    /// Where the bytes come from.
    pub data: AttachmentData,
    /// MIME type (e.g. `application/pdf`).
    pub content_type: String,
    /// Filename surfaced in `Content-Disposition`/`Content-Type name=`.
    pub name: Option<String>,
    /// Charset parameter, for text-like attachments.
    pub charset: Option<String>,
    /// Caller-declared method (used for calendar invites, etc).
    pub method: Option<String>,
    /// If `true`, bytes are emitted verbatim using `transfer_encoding`
    /// instead of being base64-encoded by the encoder.
    pub encoded: bool,
    /// Transfer encoding declared for already-encoded bytes. Ignored unless
    /// `encoded` is `true`.
    pub transfer_encoding: Option<String>,
    /// Whether this is an alternate body representation rather than a
    /// conventional attachment.
    pub alternative: bool,
    /// Whether this should be rendered with `Content-Disposition: inline`.
    pub inline: bool,
    /// `Content-ID` for reference from HTML via `cid:`.
    pub content_id: Option<String>,
    /// Sub-attachments rendered as `multipart/related` alongside this one.
    pub related: Vec<Attachment>,
}

impl Attachment {
    /// Creates an attachment backed by in-memory bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self::new(AttachmentData::Bytes(data.into()), content_type)
    }

    /// Creates an attachment backed by a filesystem path, read lazily.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self::new(AttachmentData::Path(path.into()), content_type)
    }

    /// Creates an attachment backed by a caller-supplied stream.
    #[must_use]
    pub fn from_reader(
        reader: impl AsyncRead + Send + 'static,
        content_type: impl Into<String>,
    ) -> Self {
        Self::new(AttachmentData::Reader(Box::pin(reader)), content_type)
    }

    fn new(data: AttachmentData, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
            name: None,
            charset: None,
            method: None,
            encoded: false,
            transfer_encoding: None,
            alternative: false,
            inline: false,
            content_id: None,
            related: Vec::new(),
        }
    }

    /// Sets the filename.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the charset parameter.
    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the `Content-ID`, for reference from HTML via `cid:`.
    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Sets the `method` parameter (e.g. `REQUEST`), as used by calendar
    /// invite attachments (`text/calendar; method=REQUEST`).
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Marks this attachment's bytes as already encoded with
    /// `transfer_encoding`, to be emitted verbatim.
    #[must_use]
    pub fn with_pre_encoded(mut self, transfer_encoding: impl Into<String>) -> Self {
        self.encoded = true;
        self.transfer_encoding = Some(transfer_encoding.into());
        self
    }

    /// Marks this attachment for `Content-Disposition: inline`.
    #[must_use]
    pub const fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Adds a related sub-attachment (for `multipart/related`).
    #[must_use]
    pub fn with_related(mut self, attachment: Self) -> Self {
        self.related.push(attachment);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_builder_sets_metadata() {
        let att = Attachment::from_bytes(b"hello".to_vec(), "text/plain")
            .with_name("hello.txt")
            .with_charset("utf-8");
        assert_eq!(att.name.as_deref(), Some("hello.txt"));
        assert_eq!(att.charset.as_deref(), Some("utf-8"));
        assert!(!att.inline);
    }

    #[test]
    fn with_related_accumulates_sub_attachments() {
        let inline_image = Attachment::from_bytes(vec![0xFF], "image/png")
            .with_content_id("logo")
            .inline();
        let html = Attachment::from_bytes(b"<html></html>".to_vec(), "text/html")
            .with_related(inline_image);
        assert_eq!(html.related.len(), 1);
        assert_eq!(html.related[0].content_id.as_deref(), Some("logo"));
    }
}
