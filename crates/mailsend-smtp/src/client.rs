//! High-level send API: per-client FIFO queue, greylist retry, and idle
//! connection recovery (spec §4.5).

use crate::connection::{Connection, ConnectionOptions};
use crate::error::{Error, Result};
use crate::types::Address;
use mailsend_mime::{create_message_stack, Encoder, Message};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

fn closed_error() -> Error {
    Error::Socket(std::io::Error::other("client closed"))
}

/// Snapshot of a [`Client`]'s externally observable state (spec §6's
/// "Public observable properties").
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientStatus {
    /// The underlying connection is open and authorized.
    pub ready: bool,
    /// A send is currently driving the connection.
    pub sending: bool,
    /// `Connection::state()`, or 0 if no connection has ever been opened.
    pub state: u8,
}

struct SendJob {
    message: Message,
    respond: oneshot::Sender<Result<Message>>,
}

/// A message on the actor's queue: either a send to perform, or a request
/// to stop (spec §5's "explicit close" cancellation path).
enum Job {
    Send(SendJob),
    Close(oneshot::Sender<()>),
}

/// A send-queue-backed SMTP client targeting one host.
///
/// Internally this owns an `mpsc` handle to a background task that owns the
/// [`Connection`] exclusively and drains jobs one at a time — the "at most
/// one message in-flight, strict FIFO order" contract of spec §5 falls out
/// of that ownership rather than needing a mutex around manual
/// `ready`/`sending` flags.
#[derive(Debug, Clone)]
pub struct Client {
    tx: mpsc::UnboundedSender<Job>,
    status: watch::Receiver<ClientStatus>,
    closing: Arc<watch::Sender<bool>>,
}

impl Client {
    /// Creates a client targeting the host in `options`. The connection is
    /// not opened yet — it connects lazily on the first `send`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `password` is set without `user`.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        if options.password.is_some() && options.user.is_none() {
            return Err(Error::Configuration(
                "password supplied without a user".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());
        let (closing_tx, closing_rx) = watch::channel(false);
        tokio::spawn(run_actor(options, rx, status_tx, closing_rx));

        Ok(Self { tx, status: status_rx, closing: Arc::new(closing_tx) })
    }

    /// Enqueues `message` for delivery. The returned receiver resolves
    /// exactly once, with `Ok(message)` on success or the failure that
    /// aborted the send — mirroring spec §4.5's "callback invoked exactly
    /// once" contract via a one-shot channel instead of a callback.
    pub fn send(&self, message: Message) -> oneshot::Receiver<Result<Message>> {
        let (respond, receiver) = oneshot::channel();
        let job = SendJob { message, respond };
        if self.tx.send(Job::Send(job)).is_err() {
            // The actor task is gone (panicked or was dropped); report it
            // through the same channel so callers see exactly one reply.
            let (respond, receiver) = oneshot::channel();
            let _ = respond.send(Err(Error::Socket(std::io::Error::other(
                "client actor task is not running",
            ))));
            return receiver;
        }
        receiver
    }

    /// Forces the current send (if any) to fail with a close error, fails
    /// every job still queued behind it with the same error, and tears the
    /// connection down — spec §5's only explicit termination besides idle
    /// timeout. Jobs are never silently dropped: each gets a reply.
    pub async fn close(&self) {
        let _ = self.closing.send(true);
        let (ack, ack_rx) = oneshot::channel();
        if self.tx.send(Job::Close(ack)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// `async` convenience wrapper over [`Client::send`].
    ///
    /// # Errors
    ///
    /// Returns whatever error aborted the send.
    pub async fn send_async(&self, message: Message) -> Result<Message> {
        match self.send(message).await {
            Ok(result) => result,
            Err(_) => Err(Error::Socket(std::io::Error::other(
                "client actor task dropped the send without responding",
            ))),
        }
    }

    /// Whether the underlying connection is currently open and authorized.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.status.borrow().ready
    }

    /// Whether a send is currently driving the connection.
    #[must_use]
    pub fn sending(&self) -> bool {
        self.status.borrow().sending
    }

    /// The connection's lifecycle state (spec §4.3), or 0 if never opened.
    #[must_use]
    pub fn state(&self) -> u8 {
        self.status.borrow().state
    }
}

async fn run_actor(
    options: ConnectionOptions,
    mut rx: mpsc::UnboundedReceiver<Job>,
    status: watch::Sender<ClientStatus>,
    mut closing: watch::Receiver<bool>,
) {
    let mut connection: Option<Connection> = None;

    loop {
        let job = match tokio::time::timeout(options.timeout, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                if let Some(mut conn) = connection.take() {
                    debug!("client idle past timeout, closing connection");
                    conn.close(false).await;
                }
                let _ = status.send(ClientStatus::default());
                continue;
            }
        };

        let send_job = match job {
            Job::Send(send_job) => send_job,
            Job::Close(ack) => {
                drain_and_close(&mut rx, &mut connection, &status, ack).await;
                return;
            }
        };

        let _ = status.send(ClientStatus {
            ready: connection.is_some(),
            sending: true,
            state: connection.as_ref().map_or(0, |c| c.state()),
        });

        let outcome = tokio::select! {
            biased;
            () = closed(&mut closing) => Err(closed_error()),
            outcome = process_send(&options, &mut connection, send_job.message) => outcome,
        };

        if outcome.is_err() && *closing.borrow() {
            // A close was requested mid-send; tear the connection down
            // immediately rather than leaving it half-authorized.
            if let Some(mut conn) = connection.take() {
                conn.close(true).await;
            }
        }

        let state = connection.as_ref().map_or(0, |c| c.state());
        let _ = status.send(ClientStatus { ready: connection.is_some(), sending: false, state });

        let _ = send_job.respond.send(outcome);

        if *closing.borrow() {
            drain_remaining(&mut rx);
            break;
        }
    }

    if let Some(mut conn) = connection.take() {
        conn.close(false).await;
    }
}

/// Resolves once a close has been requested, used as the losing branch in a
/// `select!` race against an in-flight send.
async fn closed(closing: &mut watch::Receiver<bool>) {
    if *closing.borrow() {
        return;
    }
    let _ = closing.changed().await;
}

/// Fails every [`SendJob`] still sitting in the queue with a close error and
/// acknowledges any further close requests found among them, without
/// touching `connection` — the caller closes it once, afterward.
fn drain_remaining(rx: &mut mpsc::UnboundedReceiver<Job>) {
    while let Ok(job) = rx.try_recv() {
        match job {
            Job::Send(send_job) => {
                let _ = send_job.respond.send(Err(closed_error()));
            }
            Job::Close(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn drain_and_close(
    rx: &mut mpsc::UnboundedReceiver<Job>,
    connection: &mut Option<Connection>,
    status: &watch::Sender<ClientStatus>,
    ack: oneshot::Sender<()>,
) {
    drain_remaining(rx);
    if let Some(mut conn) = connection.take() {
        conn.close(true).await;
    }
    let _ = status.send(ClientStatus::default());
    let _ = ack.send(());
}

async fn process_send(
    options: &ConnectionOptions,
    connection: &mut Option<Connection>,
    message: Message,
) -> Result<Message> {
    let validation = message.check_validity();
    if !validation.is_valid {
        return Err(Error::InvalidMessage(
            validation.validation_error.unwrap_or_default(),
        ));
    }

    let stack = create_message_stack(message)?;

    if connection.is_none() {
        *connection = Some(Connection::connect(options.clone()).await?);
    }
    let conn = connection.as_mut().expect("just ensured Some");

    let from = Address::new(stack.from.clone())?;
    let recipients = stack
        .to
        .iter()
        .map(|addr| Address::new(addr.clone()))
        .collect::<Result<Vec<_>>>()?;

    let result = send_over(conn, &from, &recipients, &stack.message).await;

    if let Err(err) = &result {
        if err.is_connection_fatal() {
            warn!(error = %err, "connection fatal, dropping it for the next send");
            *connection = None;
        }
    }

    result.map(|()| stack.message)
}

async fn send_over(
    conn: &mut Connection,
    from: &Address,
    recipients: &[Address],
    message: &Message,
) -> Result<()> {
    conn.start_transaction(from, recipients).await?;
    let mut encoder = Encoder::new(message.clone())?;
    conn.send_body(&mut encoder).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;

    #[test]
    fn new_rejects_password_without_user() {
        let options = ConnectionOptions::builder("smtp.example.com")
            .timeout(std::time::Duration::from_millis(10))
            .build();
        // `build()` (unvalidated) lets a password-without-user config through;
        // `Client::new` re-checks it so the actor task never gets spawned with
        // a configuration the connection would reject mid-handshake anyway.
        let mut options = options;
        options.password = Some("secret".to_string());
        let result = Client::new(options);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn new_accepts_anonymous_config() {
        let options = ConnectionOptions::builder("smtp.example.com").build();
        let client = Client::new(options);
        assert!(client.is_ok());
    }

    #[test]
    fn default_status_is_not_ready() {
        let status = ClientStatus::default();
        assert!(!status.ready);
        assert!(!status.sending);
        assert_eq!(status.state, 0);
    }

    #[tokio::test]
    async fn fresh_client_is_not_ready_or_sending() {
        let options = ConnectionOptions::builder("smtp.example.com").build();
        let client = Client::new(options).unwrap();
        assert!(!client.ready());
        assert!(!client.sending());
        assert_eq!(client.state(), 0);
    }

    #[tokio::test]
    async fn close_on_idle_client_resets_status_and_stops_the_actor() {
        let options = ConnectionOptions::builder("smtp.example.com").build();
        let client = Client::new(options).unwrap();
        client.close().await;
        assert!(!client.ready());
        assert_eq!(client.state(), 0);

        // The actor task has exited; a job enqueued afterward must still
        // get exactly one reply rather than hang forever.
        let reply = client.send(Message::builder().from("a@x").to("b@x").text("hi").build());
        assert!(reply.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn queued_jobs_fail_with_close_error_when_close_is_called() {
        let options = ConnectionOptions::builder("unreachable.invalid")
            .timeout(std::time::Duration::from_secs(30))
            .build();
        let client = Client::new(options).unwrap();

        let queued = client.send(Message::builder().from("a@x").to("b@x").text("hi").build());
        client.close().await;

        let outcome = queued.await.unwrap();
        assert!(outcome.is_err());
    }
}
