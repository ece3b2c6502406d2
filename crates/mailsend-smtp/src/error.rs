//! Error types for the SMTP connection and client.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by [`crate::connection::Connection`] and
/// [`crate::client::Client`].
///
/// Every send failure mode funnels into one of these variants and reaches
/// the caller through the send callback's sole `err` argument — never more
/// than once per send.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Message failed `check_validity` before any network I/O happened.
    /// Does not touch the connection.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Constructor-time misuse, e.g. a password without a user.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An envelope address failed to parse.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Underlying socket I/O failure (connect refused, reset, broken pipe).
    /// Destroys the connection.
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    /// TLS handshake or record-layer failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// No reply within the configured timeout. Destroys the connection.
    #[error("timeout")]
    Timeout,

    /// The server's wire output couldn't be parsed as an SMTP reply, or a
    /// supplied hostname isn't a valid DNS name/IP for TLS SNI.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned a reply code outside the expected set for the
    /// command that was sent.
    #[error("bad response on command '{command}': {message}")]
    ProtocolReply {
        /// Three-digit SMTP reply code.
        code: u16,
        /// Reply text (continuation lines joined by `\n`).
        message: String,
        /// The command (e.g. `RCPT`, `MAIL`, `DATA`) that triggered it.
        command: String,
    },

    /// Authentication failed (535 or analogous). Fatal to the send and to
    /// the connection — the spec mandates no fallthrough to the next
    /// mechanism.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// STARTTLS was required but refused, unsupported, or the upgrade
    /// handshake failed.
    #[error("STARTTLS upgrade failed: {0}")]
    TlsUpgrade(String),
}

impl Error {
    /// Builds a [`Error::ProtocolReply`] from a parsed reply.
    #[must_use]
    pub fn protocol_reply(code: u16, message: impl Into<String>, command: impl Into<String>) -> Self {
        Self::ProtocolReply {
            code,
            message: message.into(),
            command: command.into(),
        }
    }

    /// Returns `true` if this is a transient (4xx) protocol reply.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ProtocolReply { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns `true` if this error is fatal to the underlying connection
    /// (as opposed to just the in-flight send).
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Socket(_)
                | Self::Tls(_)
                | Self::Timeout
                | Self::AuthFailure(_)
                | Self::TlsUpgrade(_)
                | Self::Protocol(_)
        )
    }
}

impl From<mailsend_mime::Error> for Error {
    fn from(err: mailsend_mime::Error) -> Self {
        match err {
            mailsend_mime::Error::InvalidMessage(msg) => Self::InvalidMessage(msg),
            other => Self::InvalidMessage(other.to_string()),
        }
    }
}
