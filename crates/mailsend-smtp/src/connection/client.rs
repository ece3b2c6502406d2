//! Runtime SMTP connection state machine.
//!
//! The teacher's IMAP sibling and this crate's earlier draft used a
//! compile-time type-state (`Client<Connected>`, `Client<Authenticated>`,
//! ...). A single long-lived connection that idles, retries a greylisted
//! recipient, or gets reused by a send queue across many messages needs its
//! state to be inspectable and mutable at runtime, so [`Connection`] tracks
//! it with a plain enum instead and enforces transitions with `Result`
//! checks rather than the type system.

use super::{ConnectionOptions, ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use hmac::Mac;
use std::collections::HashSet;
use tokio::time::timeout;

type HmacMd5 = hmac::Hmac<md5::Md5>;

/// Pause before retrying a greylisted `RCPT TO` (spec §4.5's "short
/// backoff").
const GREYLIST_BACKOFF: std::time::Duration = std::time::Duration::from_millis(250);

/// Connection lifecycle state (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No socket open.
    NotConnected = 0,
    /// Socket is being established.
    Connecting = 1,
    /// Socket open, greeting read, no EHLO/auth yet.
    Connected = 2,
    /// AUTH exchange in progress.
    Authorizing = 3,
    /// AUTH completed successfully (or not required).
    Authorized = 4,
    /// MAIL FROM / RCPT TO in flight.
    Sending = 5,
    /// Inside the DATA phase, streaming message bytes.
    Data = 6,
}

impl ConnectionState {
    /// The numeric state code exposed by [`Connection::state`].
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A single SMTP connection: socket, negotiated capabilities, and the
/// runtime state machine driving them.
#[derive(Debug)]
pub struct Connection {
    stream: Option<SmtpStream>,
    server_info: ServerInfo,
    state: ConnectionState,
    options: ConnectionOptions,
}

impl Connection {
    /// Opens the socket (implicit TLS if `options.ssl`), reads the
    /// greeting, and leaves the connection in [`ConnectionState::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Socket`]/[`Error::Tls`] if the connection fails,
    /// [`Error::Timeout`] if the greeting doesn't arrive in time, or
    /// [`Error::ProtocolReply`] if the server greets with anything but 220.
    pub async fn connect(options: ConnectionOptions) -> Result<Self> {
        let mut conn = Self {
            stream: None,
            server_info: ServerInfo::default(),
            state: ConnectionState::Connecting,
            options,
        };

        let stream = if conn.options.ssl {
            super::stream::connect_tls(&conn.options.host, conn.options.port).await?
        } else {
            super::stream::connect(&conn.options.host, conn.options.port).await?
        };
        conn.stream = Some(stream);

        let reply = conn.read_reply().await?;
        if reply.code != ReplyCode::SERVICE_READY {
            conn.state = ConnectionState::NotConnected;
            conn.stream = None;
            return Err(Error::protocol_reply(
                reply.code.as_u16(),
                reply.message_text(),
                "CONNECT",
            ));
        }

        conn.server_info.hostname = reply
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or(&conn.options.host)
            .to_string();
        conn.state = ConnectionState::Connected;

        conn.ehlo().await?;
        if conn.options.tls && !conn.options.ssl {
            conn.starttls().await?;
        }
        if conn.options.user.is_some() {
            conn.authenticate().await?;
        } else {
            conn.state = ConnectionState::Authorized;
        }

        Ok(conn)
    }

    /// The current lifecycle state, as a numeric code matching spec §4.3.
    #[must_use]
    pub const fn state(&self) -> u8 {
        self.state.as_u8()
    }

    /// Server capabilities as negotiated by the last EHLO.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    async fn ehlo(&mut self) -> Result<()> {
        let domain = self.options.domain.clone();
        let ehlo_reply = self.command_raw(Command::Ehlo { hostname: domain.clone() }, &[ReplyCode::OK]).await;

        let reply = match ehlo_reply {
            Ok(reply) => reply,
            Err(Error::ProtocolReply { code, .. }) if (500..600).contains(&code) => {
                // Fall back to HELO for servers without ESMTP support.
                self.command(Command::Helo { hostname: domain }, &[ReplyCode::OK]).await?
            }
            Err(err) => return Err(err),
        };

        let mut extensions = HashSet::new();
        if reply.message.len() > 1 {
            for line in reply.message.iter().skip(1) {
                extensions.insert(Extension::parse(line));
            }
        }
        self.server_info.extensions = extensions;
        Ok(())
    }

    async fn starttls(&mut self) -> Result<()> {
        if !self.server_info.supports_starttls() {
            return Err(Error::TlsUpgrade("server did not advertise STARTTLS".into()));
        }

        self.command(Command::StartTls, &[ReplyCode::SERVICE_READY]).await?;

        let stream = self.stream.take().ok_or(Error::Timeout)?;
        let upgraded = stream.upgrade_to_tls(&self.options.host).await?;
        self.stream = Some(upgraded);

        // RFC 3207: capabilities must be re-discovered after the upgrade.
        self.ehlo().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.state = ConnectionState::Authorizing;
        let offered = self.server_info.auth_mechanisms();
        let user = self.options.user.clone().unwrap_or_default();
        let password = self.options.password.clone().unwrap_or_default();

        let mechanism = self
            .options
            .authentication
            .iter()
            .copied()
            .find(|m| offered.is_empty() || offered.contains(m))
            .ok_or_else(|| {
                Error::AuthFailure("server offered no mechanism this client supports".into())
            })?;

        let result = match mechanism {
            AuthMechanism::Plain => self.auth_plain(&user, &password).await,
            AuthMechanism::Login => self.auth_login(&user, &password).await,
            AuthMechanism::CramMd5 => self.auth_cram_md5(&user, &password).await,
            AuthMechanism::XOAuth2 => self.auth_xoauth2(&user, &password).await,
            AuthMechanism::OAuthBearer => {
                Err(Error::AuthFailure("OAUTHBEARER is not implemented".into()))
            }
        };

        match result {
            Ok(()) => {
                self.state = ConnectionState::Authorized;
                Ok(())
            }
            Err(err) => {
                // No fallthrough to another mechanism after a failed AUTH.
                self.state = ConnectionState::Connected;
                Err(err)
            }
        }
    }

    async fn auth_plain(&mut self, user: &str, password: &str) -> Result<()> {
        let credentials = format!("\0{user}\0{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        let reply = self
            .command(
                Command::Auth {
                    mechanism: AuthMechanism::Plain,
                    initial_response: Some(encoded),
                },
                &[ReplyCode::AUTH_SUCCESS],
            )
            .await;
        self.map_auth_reply(reply)
    }

    async fn auth_login(&mut self, user: &str, password: &str) -> Result<()> {
        self.command_raw(
            Command::Auth { mechanism: AuthMechanism::Login, initial_response: None },
            &[ReplyCode::AUTH_CONTINUE],
        )
        .await
        .map_err(|e| self.auth_failure(e))?;

        let user_b64 = base64::engine::general_purpose::STANDARD.encode(user.as_bytes());
        self.command_raw(Command::Raw(user_b64), &[ReplyCode::AUTH_CONTINUE])
            .await
            .map_err(|e| self.auth_failure(e))?;

        let password_b64 = base64::engine::general_purpose::STANDARD.encode(password.as_bytes());
        let reply = self.command(Command::Raw(password_b64), &[ReplyCode::AUTH_SUCCESS]).await;
        self.map_auth_reply(reply)
    }

    async fn auth_cram_md5(&mut self, user: &str, password: &str) -> Result<()> {
        let challenge_reply = self
            .command_raw(
                Command::Auth { mechanism: AuthMechanism::CramMd5, initial_response: None },
                &[ReplyCode::AUTH_CONTINUE],
            )
            .await
            .map_err(|e| self.auth_failure(e))?;

        let challenge_b64 = challenge_reply.message.first().cloned().unwrap_or_default();
        let challenge = base64::engine::general_purpose::STANDARD
            .decode(challenge_b64.trim())
            .map_err(|e| Error::AuthFailure(format!("malformed CRAM-MD5 challenge: {e}")))?;

        let mut mac = HmacMd5::new_from_slice(password.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(&challenge);
        let digest = mac.finalize().into_bytes();
        let hex_digest = digest.iter().fold(String::with_capacity(32), |mut s, b| {
            use std::fmt::Write as _;
            let _ = write!(s, "{b:02x}");
            s
        });

        let response = format!("{user} {hex_digest}");
        let response_b64 = base64::engine::general_purpose::STANDARD.encode(response.as_bytes());
        let reply = self.command(Command::Raw(response_b64), &[ReplyCode::AUTH_SUCCESS]).await;
        self.map_auth_reply(reply)
    }

    async fn auth_xoauth2(&mut self, user: &str, token: &str) -> Result<()> {
        let payload = format!("user={user}\x01auth=Bearer {token}\x01\x01");
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
        let reply = self
            .command(
                Command::Auth {
                    mechanism: AuthMechanism::XOAuth2,
                    initial_response: Some(encoded),
                },
                &[ReplyCode::AUTH_SUCCESS, ReplyCode::AUTH_CONTINUE],
            )
            .await;

        // A 334 continuation on XOAUTH2 carries a JSON error payload; RFC
        // 7628 requires the client answer with an empty line before the
        // server will return the terminal failure code.
        match reply {
            Ok(r) if r.code == ReplyCode::AUTH_CONTINUE => {
                let _ = self.command_raw(Command::Raw(String::new()), &[ReplyCode::AUTH_SUCCESS]).await;
                Err(Error::AuthFailure(r.message_text()))
            }
            other => self.map_auth_reply(other),
        }
    }

    fn map_auth_reply(&mut self, reply: Result<Reply>) -> Result<()> {
        reply.map(|_| ()).map_err(|e| self.auth_failure(e))
    }

    fn auth_failure(&mut self, err: Error) -> Error {
        match err {
            Error::ProtocolReply { code, message, .. } => Error::AuthFailure(format!("{code} {message}")),
            other => other,
        }
    }

    /// Starts a mail transaction: `MAIL FROM`, then one `RCPT TO` per
    /// recipient. A 450 (greylisted) on any RCPT is retried exactly once;
    /// a second 450, or any other non-2xx code, aborts the transaction by
    /// propagating the error without resetting the connection state back
    /// out of `Sending` — the caller is expected to `reset()` or `quit()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolReply`] if MAIL FROM or any RCPT TO is
    /// rejected, or a connection error if the socket fails mid-transaction.
    pub async fn start_transaction(&mut self, from: &Address, to: &[Address]) -> Result<()> {
        if self.state != ConnectionState::Authorized {
            return Err(Error::protocol_reply(503, "not authorized", "MAIL"));
        }
        self.state = ConnectionState::Sending;

        self.command(
            Command::MailFrom { from: from.clone(), body: None, size: None },
            &[ReplyCode::OK],
        )
        .await?;

        for recipient in to {
            self.rcpt_with_greylist_retry(recipient).await?;
        }
        Ok(())
    }

    async fn rcpt_with_greylist_retry(&mut self, to: &Address) -> Result<()> {
        let cmd = Command::RcptTo { to: to.clone() };
        match self.command(cmd.clone(), &[ReplyCode::OK, ReplyCode::FORWARD]).await {
            Ok(_) => Ok(()),
            Err(Error::ProtocolReply { code, .. }) if code == ReplyCode::MAILBOX_BUSY.as_u16() => {
                tokio::time::sleep(GREYLIST_BACKOFF).await;
                self.command(cmd, &[ReplyCode::OK, ReplyCode::FORWARD]).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Issues `DATA`, streams `body` with CRLF normalization and RFC 5321
    /// dot-stuffing, and appends the `.\r\n` terminator. On success the
    /// connection returns to [`ConnectionState::Authorized`], ready for the
    /// next transaction.
    ///
    /// Dot-stuffing lives here rather than in the MIME encoder: the encoder
    /// only knows about message structure, while leading-dot escaping is a
    /// property of the wire transfer, matching spec §4.2's note that the
    /// connection layer owns transparency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolReply`] if DATA or the final dot is
    /// rejected, or a connection error if the socket fails mid-transfer.
    pub async fn send_body(&mut self, encoder: &mut mailsend_mime::Encoder) -> Result<()> {
        if self.state != ConnectionState::Sending {
            return Err(Error::protocol_reply(503, "no transaction in progress", "DATA"));
        }

        self.command(Command::Data, &[ReplyCode::START_DATA]).await?;
        self.state = ConnectionState::Data;

        let mut carry = Vec::new();
        while let Some(chunk) = encoder.next_chunk().await? {
            carry.extend_from_slice(&chunk);
            let mut lines: Vec<&[u8]> = carry.split(|&b| b == b'\n').collect();
            // Keep a possibly-incomplete final fragment for the next chunk.
            let tail = lines.pop().unwrap_or_default().to_vec();
            for line in &lines {
                self.write_dot_stuffed_line(line).await?;
            }
            carry = tail;
        }
        if !carry.is_empty() {
            self.write_dot_stuffed_line(&carry).await?;
        }

        self.write_raw(b".\r\n").await?;
        let reply = self.read_reply().await?;
        self.state = ConnectionState::Authorized;
        if !reply.is_success() {
            return Err(Error::protocol_reply(reply.code.as_u16(), reply.message_text(), "DATA"));
        }
        Ok(())
    }

    async fn write_dot_stuffed_line(&mut self, line: &[u8]) -> Result<()> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            self.write_raw(b".").await?;
        }
        self.write_raw(line).await?;
        self.write_raw(b"\r\n").await?;
        Ok(())
    }

    /// Aborts the in-flight transaction with `RSET`, returning to
    /// `Authorized` (or `Connected` if auth never happened).
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(&mut self) -> Result<()> {
        self.command(Command::Rset, &[ReplyCode::OK]).await?;
        self.state = if self.options.user.is_some() {
            ConnectionState::Authorized
        } else {
            ConnectionState::Connected
        };
        Ok(())
    }

    /// Sends `QUIT` and tears down the socket regardless of the reply.
    /// `force` skips the `QUIT` round-trip entirely (used when the
    /// connection is already known to be broken).
    pub async fn close(&mut self, force: bool) {
        if !force && self.stream.is_some() {
            let _ = self.command(Command::Quit, &[ReplyCode::CLOSING]).await;
        }
        self.stream = None;
        self.state = ConnectionState::NotConnected;
    }

    async fn command(&mut self, cmd: Command, expected: &[ReplyCode]) -> Result<Reply> {
        let name = cmd.name();
        let reply = self.command_raw(cmd, expected).await;
        reply.map_err(|err| match err {
            Error::ProtocolReply { code, message, .. } => Error::protocol_reply(code, message, name),
            other => other,
        })
    }

    async fn command_raw(&mut self, cmd: Command, expected: &[ReplyCode]) -> Result<Reply> {
        let data = cmd.serialize();
        self.write_raw(&data).await?;
        let reply = self.read_reply().await?;
        if expected.iter().any(|code| *code == reply.code) {
            Ok(reply)
        } else {
            Err(Error::protocol_reply(reply.code.as_u16(), reply.message_text(), cmd.name()))
        }
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::Timeout)?;
        timeout(self.options.timeout, stream.write_all(data))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or(Error::Timeout)?;
        let mut lines = Vec::new();
        loop {
            let line = timeout(self.options.timeout, stream.read_line())
                .await
                .map_err(|_| Error::Timeout)??;
            if line.is_empty() {
                continue;
            }
            let is_last = is_last_reply_line(&line);
            lines.push(line);
            if is_last {
                break;
            }
        }
        parse_reply(&lines)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_match_spec_numbering() {
        assert_eq!(ConnectionState::NotConnected.as_u8(), 0);
        assert_eq!(ConnectionState::Connecting.as_u8(), 1);
        assert_eq!(ConnectionState::Connected.as_u8(), 2);
        assert_eq!(ConnectionState::Authorizing.as_u8(), 3);
        assert_eq!(ConnectionState::Authorized.as_u8(), 4);
        assert_eq!(ConnectionState::Sending.as_u8(), 5);
        assert_eq!(ConnectionState::Data.as_u8(), 6);
    }

    #[test]
    fn cram_md5_matches_rfc_2195_vector() {
        // RFC 2195 §3's worked example: secret "tanstaaftanstaaf", the given
        // challenge, username "tim".
        let challenge = b"<1896.697170952@postoffice.reston.mci.net>";
        let mut mac = HmacMd5::new_from_slice(b"tanstaaftanstaaf").unwrap();
        mac.update(challenge);
        let digest = mac.finalize().into_bytes();
        let hex_digest = digest.iter().fold(String::with_capacity(32), |mut s, b| {
            use std::fmt::Write as _;
            let _ = write!(s, "{b:02x}");
            s
        });
        assert_eq!(hex_digest, "b913a602c7eda7a495b4e6e7334d3890");
    }
}
