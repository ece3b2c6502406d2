//! # mailsend-mime
//!
//! RFC 5322 / RFC 2045–2049 message assembler and address-list parser for
//! the `mailsend` SMTP submission client.
//!
//! This crate is an *assembler*, not a parser: it turns a structured
//! [`Message`] into the byte stream an SMTP `DATA` phase expects. It does
//! not read mail off the wire.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsend_mime::Message;
//!
//! let message = Message::builder()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Test Message")
//!     .text("Hello, World!")
//!     .build();
//!
//! let result = message.check_validity();
//! assert!(result.is_valid);
//! ```
//!
//! ### Attachments and `multipart/related`
//!
//! ```ignore
//! use mailsend_mime::{Attachment, Message};
//!
//! let logo = Attachment::from_bytes(png_bytes, "image/png")
//!     .with_content_id("logo")
//!     .inline();
//! let html = Attachment::from_bytes(b"<img src=\"cid:logo\">".to_vec(), "text/html")
//!     .with_related(logo);
//!
//! let message = Message::builder()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .text("plain-text fallback")
//!     .build();
//! ```
//!
//! ### Streaming the wire form
//!
//! ```ignore
//! use mailsend_mime::Encoder;
//!
//! let mut encoder = Encoder::new(message)?;
//! while let Some(chunk) = encoder.next_chunk().await? {
//!     // hand `chunk` to the SMTP connection's DATA phase
//! }
//! ```
//!
//! ### Encoding/Decoding
//!
//! ```ignore
//! use mailsend_mime::encoding::{encode_base64, decode_base64, encode_quoted_printable};
//!
//! let encoded = encode_base64(b"Hello, World!");
//! let decoded = decode_base64(&encoded)?;
//! let qp = encode_quoted_printable("Héllo, Wørld!".as_bytes());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod attachment;
mod content_type;
mod encoder;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::{join_mailboxes, parse_address_list, Mailbox};
pub use attachment::{Attachment, AttachmentData, ATTACHMENT_CHUNK_SIZE};
pub use content_type::ContentType;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{
    create_message_stack, Message, MessageBuilder, MessageStack, TransferEncoding,
    ValidationResult,
};
