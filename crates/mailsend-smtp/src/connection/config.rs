//! Connection configuration types.

use std::time::Duration;

use crate::types::AuthMechanism;

/// Default connect/command timeout (§3: "timeout (default 5000 ms)").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Every SASL mechanism this crate can speak, in the selection order the
/// connection tries them (filtered by what the caller allows and what the
/// server advertises).
pub const DEFAULT_AUTH_METHODS: &[AuthMechanism] = &[
    AuthMechanism::CramMd5,
    AuthMechanism::Login,
    AuthMechanism::Plain,
    AuthMechanism::XOAuth2,
];

/// Configuration snapshot for a [`crate::connection::Connection`].
///
/// Mirrors spec.md §3's `ConnectionOptions`: a plain, `Clone`-able struct
/// built through [`ConnectionOptionsBuilder`], following the
/// required-field-via-constructor / optional-fields-via-chained-setters
/// split this workspace's IMAP sibling uses for its connection config.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Server hostname. Defaults to `localhost`.
    pub host: String,
    /// Server port. Defaults to 465 if `ssl`, 587 if `tls`, else 25.
    pub port: u16,
    /// Implicit TLS: wrap the socket in TLS from byte 0.
    pub ssl: bool,
    /// Opportunistic STARTTLS: upgrade after EHLO if the server advertises it.
    pub tls: bool,
    /// Username for PLAIN/LOGIN/CRAM-MD5, or the `user=` claim for XOAUTH2.
    pub user: Option<String>,
    /// Password for PLAIN/LOGIN/CRAM-MD5, or the bearer token for XOAUTH2.
    pub password: Option<String>,
    /// Authentication mechanisms the caller permits, in preference order.
    pub authentication: Vec<AuthMechanism>,
    /// Per-command and connect timeout.
    pub timeout: Duration,
    /// HELO/EHLO domain. Defaults to the local hostname.
    pub domain: String,
}

impl ConnectionOptions {
    /// Starts a builder for `host`.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(host)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptionsBuilder::new("localhost").build()
    }
}

/// Builder for [`ConnectionOptions`].
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    host: String,
    port: Option<u16>,
    ssl: bool,
    tls: bool,
    user: Option<String>,
    password: Option<String>,
    authentication: Vec<AuthMechanism>,
    timeout: Duration,
    domain: Option<String>,
}

fn local_domain() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl ConnectionOptionsBuilder {
    /// Creates a builder defaulting to plain TCP on port 25.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            ssl: false,
            tls: false,
            user: None,
            password: None,
            authentication: DEFAULT_AUTH_METHODS.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            domain: None,
        }
    }

    /// Overrides the port (otherwise derived from `ssl`/`tls`).
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables implicit TLS (port defaults to 465).
    #[must_use]
    pub const fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Enables opportunistic STARTTLS (port defaults to 587).
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets credentials. A password without a user is rejected at
    /// [`ConnectionOptionsBuilder::build`] time — see
    /// [`crate::error::Error::Configuration`].
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets an XOAUTH2-style user with no separate password field (the
    /// token is passed as `password`).
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Restricts (or reorders) the permitted authentication mechanisms.
    #[must_use]
    pub fn authentication(mut self, mechanisms: Vec<AuthMechanism>) -> Self {
        self.authentication = mechanisms;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the HELO/EHLO domain (otherwise the local hostname).
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    fn default_port(&self) -> u16 {
        if self.ssl {
            465
        } else if self.tls {
            587
        } else {
            25
        }
    }

    /// Finishes the builder.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Configuration`] if a password is set
    /// without a user.
    pub fn try_build(self) -> crate::error::Result<ConnectionOptions> {
        if self.password.is_some() && self.user.is_none() {
            return Err(crate::error::Error::Configuration(
                "password supplied without a user".to_string(),
            ));
        }
        Ok(self.build())
    }

    /// Finishes the builder without validating the user/password pairing.
    /// Prefer [`ConnectionOptionsBuilder::try_build`] when credentials may
    /// have been supplied.
    #[must_use]
    pub fn build(self) -> ConnectionOptions {
        let port = self.port.unwrap_or_else(|| self.default_port());
        ConnectionOptions {
            host: self.host,
            port,
            ssl: self.ssl,
            tls: self.tls,
            user: self.user,
            password: self.password,
            authentication: self.authentication,
            timeout: self.timeout,
            domain: self.domain.unwrap_or_else(local_domain),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let options = ConnectionOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 25);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.authentication, DEFAULT_AUTH_METHODS.to_vec());
    }

    #[test]
    fn ssl_defaults_to_port_465() {
        let options = ConnectionOptions::builder("smtp.example.com").ssl(true).build();
        assert_eq!(options.port, 465);
    }

    #[test]
    fn tls_defaults_to_port_587() {
        let options = ConnectionOptions::builder("smtp.example.com").tls(true).build();
        assert_eq!(options.port, 587);
    }

    #[test]
    fn explicit_port_overrides_derived_default() {
        let options = ConnectionOptions::builder("smtp.example.com").ssl(true).port(2525).build();
        assert_eq!(options.port, 2525);
    }

    #[test]
    fn password_without_user_is_rejected() {
        let result = ConnectionOptionsBuilder::new("smtp.example.com")
            .password_only_for_test()
            .try_build();
        assert!(result.is_err());
    }

    impl ConnectionOptionsBuilder {
        fn password_only_for_test(mut self) -> Self {
            self.password = Some("secret".to_string());
            self
        }
    }
}
