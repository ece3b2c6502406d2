//! # mailsend-smtp
//!
//! SMTP submission client: connection state machine, authentication, and
//! the per-client send queue for the `mailsend` crate.
//!
//! ## Features
//!
//! - **Runtime connection state machine**: `Connection::state()` returns an
//!   observable `0..6` integer (spec §4.3), rather than encoding the state
//!   in the type system.
//! - **Full protocol support**: EHLO/HELO, MAIL FROM, RCPT TO, DATA, AUTH,
//!   STARTTLS.
//! - **TLS support**: implicit TLS (`ssl`, typically port 465) and
//!   opportunistic STARTTLS (`tls`, typically port 587).
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5, XOAUTH2.
//! - **Extensions**: 8BITMIME, SIZE, PIPELINING, SMTPUTF8, DSN, BINARYMIME.
//! - **Send queue**: strict per-client FIFO ordering, exactly-once send
//!   callbacks, one-shot greylist retry on a 450 `RCPT TO`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsend_mime::Message;
//! use mailsend_smtp::{Client, ConnectionOptions};
//!
//! #[tokio::main]
//! async fn main() -> mailsend_smtp::Result<()> {
//!     let options = ConnectionOptions::builder("smtp.example.com")
//!         .tls(true)
//!         .credentials("user@example.com", "hunter2")
//!         .build();
//!     let client = Client::new(options)?;
//!
//!     let message = Message::builder()
//!         .from("sender@example.com")
//!         .to("recipient@example.com")
//!         .subject("Hello")
//!         .text("Hello, World!")
//!         .build();
//!
//!     client.send_async(message).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the send queue (spec §4.5)
//! - [`connection`]: socket handling, the `Connection` state machine, and
//!   [`connection::ConnectionOptions`]
//! - [`command`]: SMTP command builders
//! - [`parser`]: response parser
//! - [`types`]: core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use client::{Client, ClientStatus};
pub use connection::{Connection, ConnectionOptions, ConnectionOptionsBuilder, ConnectionState, ServerInfo};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};

/// SMTP protocol version supported.
pub const SMTP_VERSION: &str = "SMTP/ESMTP (RFC 5321)";
