//! Integration tests driving [`Connection`] against a scripted, in-process
//! SMTP server over a real loopback TCP socket.
//!
//! Mirrors the approach this workspace's `mailsend-mime` sibling and its
//! original IMAP ancestor use for client tests: rather than mocking the
//! `AsyncRead`/`AsyncWrite` traits, spin up a `TcpListener` on `127.0.0.1`
//! and drive a tiny scripted server task against it.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use mailsend_mime::{Encoder, Message};
use mailsend_smtp::{Address, Connection, ConnectionOptions, Error};

/// One step of a scripted server exchange.
enum Step {
    /// Write raw bytes (already CRLF-terminated) to the client.
    Send(String),
    /// Read and discard one line from the client.
    Recv,
}

fn send(text: impl Into<String>) -> Step {
    Step::Send(text.into())
}

/// Starts a listener on an ephemeral port and plays `script` against the
/// first connection it accepts. Returns the bound port and a handle that
/// resolves to every line the server received, in order.
async fn spawn_script(script: Vec<Step>) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        run_script(stream, script).await
    });

    (port, handle)
}

async fn run_script(stream: TcpStream, script: Vec<Step>) -> Vec<String> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut received = Vec::new();

    for step in script {
        match step {
            Step::Send(text) => {
                write_half.write_all(text.as_bytes()).await.unwrap();
                write_half.flush().await.unwrap();
            }
            Step::Recv => {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                received.push(line.trim_end().to_string());
            }
        }
    }

    received
}

fn base_options(port: u16) -> ConnectionOptions {
    ConnectionOptions::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_secs(2))
        .domain("client.example.com")
        .build()
}

#[tokio::test]
async fn ehlo_falls_back_to_helo_on_5xx() {
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("500 command not recognized\r\n"),
        Step::Recv, // HELO
        send("250 mail.example.com\r\n"),
    ];
    let (port, server) = spawn_script(script).await;

    let conn = Connection::connect(base_options(port)).await.unwrap();
    assert_eq!(conn.state(), 4); // Authorized: no credentials configured.

    let received = server.await.unwrap();
    assert!(received[0].starts_with("EHLO"));
    assert!(received[1].starts_with("HELO"));
}

#[tokio::test]
async fn plain_auth_success() {
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("250-mail.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 8BITMIME\r\n"),
        Step::Recv, // AUTH PLAIN <b64>
        send("235 Authentication successful\r\n"),
    ];
    let (port, server) = spawn_script(script).await;

    let options = ConnectionOptions::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_secs(2))
        .domain("client.example.com")
        .credentials("user@example.com", "hunter2")
        .authentication(vec![mailsend_smtp::AuthMechanism::Plain])
        .build();

    let conn = Connection::connect(options).await.unwrap();
    assert_eq!(conn.state(), 4);
    assert!(conn.server_info().supports(&mailsend_smtp::Extension::EightBitMime));

    let received = server.await.unwrap();
    assert!(received[1].starts_with("AUTH PLAIN "));
    let payload = received[1].trim_start_matches("AUTH PLAIN ");
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload).unwrap();
    assert_eq!(decoded, b"\0user@example.com\0hunter2");
}

#[tokio::test]
async fn cram_md5_auth_matches_known_vector() {
    // RFC 2195 worked example.
    let challenge_b64 =
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "<1896.697170952@postoffice.reston.mci.net>");
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("250-mail.example.com\r\n250 AUTH CRAM-MD5\r\n"),
        Step::Recv, // AUTH CRAM-MD5
        send(format!("334 {challenge_b64}\r\n")),
        Step::Recv, // base64(user + " " + hex digest)
        send("235 Authentication successful\r\n"),
    ];
    let (port, server) = spawn_script(script).await;

    let options = ConnectionOptions::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_secs(2))
        .domain("client.example.com")
        .credentials("tim", "tanstaaftanstaaf")
        .authentication(vec![mailsend_smtp::AuthMechanism::CramMd5])
        .build();

    let conn = Connection::connect(options).await.unwrap();
    assert_eq!(conn.state(), 4);

    let received = server.await.unwrap();
    let response_b64 = &received[2];
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, response_b64).unwrap();
    assert_eq!(
        String::from_utf8(decoded).unwrap(),
        "tim b913a602c7eda7a495b4e6e7334d3890"
    );
}

#[tokio::test]
async fn greylisted_rcpt_succeeds_after_one_retry() {
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("250 mail.example.com\r\n"),
        Step::Recv, // MAIL FROM
        send("250 OK\r\n"),
        Step::Recv, // RCPT TO (first attempt)
        send("450 greylisted, try again shortly\r\n"),
        Step::Recv, // RCPT TO (retry)
        send("250 OK\r\n"),
    ];
    let (port, server) = spawn_script(script).await;

    let mut conn = Connection::connect(base_options(port)).await.unwrap();
    let from = Address::new("sender@example.com").unwrap();
    let to = Address::new("recipient@example.com").unwrap();

    let result = conn.start_transaction(&from, &[to]).await;
    assert!(result.is_ok());

    let received = server.await.unwrap();
    assert_eq!(received.iter().filter(|l| l.starts_with("RCPT")).count(), 2);
}

#[tokio::test]
async fn greylisted_rcpt_fails_after_second_450() {
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("250 mail.example.com\r\n"),
        Step::Recv, // MAIL FROM
        send("250 OK\r\n"),
        Step::Recv, // RCPT TO (first attempt)
        send("450 greylisted\r\n"),
        Step::Recv, // RCPT TO (retry)
        send("450 still greylisted\r\n"),
    ];
    let (port, _server) = spawn_script(script).await;

    let mut conn = Connection::connect(base_options(port)).await.unwrap();
    let from = Address::new("sender@example.com").unwrap();
    let to = Address::new("recipient@example.com").unwrap();

    let err = conn.start_transaction(&from, &[to]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad response on command 'RCPT': still greylisted"
    );
    assert!(matches!(err, Error::ProtocolReply { code: 450, .. }));
}

#[tokio::test]
async fn data_phase_dot_stuffs_leading_dot_lines() {
    let script = vec![
        send("220 mail.example.com ESMTP ready\r\n"),
        Step::Recv, // EHLO
        send("250 mail.example.com\r\n"),
        Step::Recv, // MAIL FROM
        send("250 OK\r\n"),
        Step::Recv, // RCPT TO
        send("250 OK\r\n"),
        Step::Recv, // DATA
        send("354 Start mail input\r\n"),
    ];
    let (port, server) = spawn_script_with_data_read(script).await;

    let mut conn = Connection::connect(base_options(port)).await.unwrap();
    let from = Address::new("sender@example.com").unwrap();
    let to = Address::new("recipient@example.com").unwrap();
    conn.start_transaction(&from, &[to]).await.unwrap();

    let message = Message::builder()
        .from("sender@example.com")
        .to("recipient@example.com")
        .subject("Dot stuffing")
        .text("Hello\n.Leading dot line\nBye")
        .build();
    let mut encoder = Encoder::new(message).unwrap();

    conn.send_body(&mut encoder).await.unwrap();
    assert_eq!(conn.state(), 4);

    let body_lines = server.await.unwrap();
    assert!(body_lines.contains(&"..Leading dot line".to_string()));
    assert!(!body_lines.iter().any(|l| l == ".Leading dot line"));
    assert_eq!(body_lines.last().map(String::as_str), Some("."));
}

/// Like [`spawn_script`], but after the scripted exchange keeps reading
/// lines (the DATA payload) until the terminating bare `.` and a final
/// `250 OK`, returning every line received during DATA including the dot.
async fn spawn_script_with_data_read(
    script: Vec<Step>,
) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for step in script {
            match step {
                Step::Send(text) => {
                    write_half.write_all(text.as_bytes()).await.unwrap();
                    write_half.flush().await.unwrap();
                }
                Step::Recv => {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                }
            }
        }

        let mut body_lines = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            let is_terminator = line == ".";
            body_lines.push(line);
            if is_terminator {
                break;
            }
        }
        write_half.write_all(b"250 OK\r\n").await.unwrap();
        write_half.flush().await.unwrap();
        body_lines
    });

    (port, handle)
}

#[tokio::test]
async fn connect_rejects_non_220_greeting() {
    let script = vec![send("421 Service not available\r\n")];
    let (port, _server) = spawn_script(script).await;

    let err = Connection::connect(base_options(port)).await.unwrap_err();
    assert!(matches!(err, Error::ProtocolReply { code: 421, .. }));
}
