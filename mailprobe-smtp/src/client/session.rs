//! One SMTP session against the ingestion port, with optional STARTTLS.

use std::{future::Future, sync::Arc, time::Duration};

use mailprobe_common::{config::ClientTimeouts, tracing, wire};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    reply::Reply,
};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 4096;

/// Replies larger than this are treated as a protocol error.
const MAX_BUFFER_SIZE: usize = 256 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade(self, server_name: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError("Session is already encrypted".to_string()));
        };

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            roots
                .add(cert)
                .map_err(|e| ClientError::TlsError(format!("Failed to add certificate: {e}")))?;
        }
        if !native.errors.is_empty() {
            tracing::warn!(errors = ?native.errors, "Some native certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid server name: {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// Accepts any certificate. Only installed with `accept_invalid_certs`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// Runs `fut` under the budget for `step`.
async fn within<T>(
    step: &'static str,
    budget: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| ClientError::Timeout {
            step,
            secs: budget.as_secs(),
        })?
}

/// A client session with every step bounded by [`ClientTimeouts`].
///
/// Replies outside the expected class surface as [`ClientError::Rejected`]
/// naming the step, so callers never need to inspect codes themselves.
pub struct SmtpSession {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    host: String,
    timeouts: ClientTimeouts,
    extensions: Vec<String>,
}

impl SmtpSession {
    /// Connects to `host:port` and reads the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established in time or
    /// the server does not greet with `220`.
    pub async fn connect(host: &str, port: u16, timeouts: ClientTimeouts) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = within("connect", timeouts.connect(), async {
            Ok(TcpStream::connect(&addr).await?)
        })
        .await?;

        wire!(level = DEBUG, "Connected to {addr}");

        let mut session = Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            host: host.to_string(),
            timeouts,
            extensions: Vec::new(),
        };

        let greeting = within("greeting", session.timeouts.command(), session.read_reply()).await?;
        if greeting.code != 220 {
            return Err(ClientError::Rejected {
                step: "greeting",
                code: greeting.code,
                message: greeting.message(),
            });
        }

        Ok(session)
    }

    /// Extension keywords advertised in the last EHLO reply.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.split_whitespace().next().is_some_and(|k| k.eq_ignore_ascii_case(keyword)))
    }

    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self.connection, Some(Connection::Tls(_)))
    }

    /// # Errors
    ///
    /// Returns an error if the server rejects EHLO or does not answer in time.
    pub async fn ehlo(&mut self, name: &str) -> Result<Reply> {
        let reply = self.step("EHLO", &format!("EHLO {name}"), false).await?;
        self.extensions = reply.lines.iter().skip(1).cloned().collect();
        Ok(reply)
    }

    /// Issues STARTTLS and upgrades the connection. EHLO must be sent again
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake fails.
    pub async fn starttls(&mut self, accept_invalid_certs: bool) -> Result<Reply> {
        let reply = self.step("STARTTLS", "STARTTLS", false).await?;

        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
        let host = self.host.clone();
        let upgraded = within(
            "STARTTLS",
            self.timeouts.command(),
            connection.upgrade(&host, accept_invalid_certs),
        )
        .await?;

        self.connection = Some(upgraded);
        self.buffer_pos = 0;
        self.extensions.clear();

        wire!(level = DEBUG, "Session upgraded to TLS");
        Ok(reply)
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the sender is refused.
    pub async fn mail_from(&mut self, sender: &str) -> Result<Reply> {
        self.step("MAIL FROM", &format!("MAIL FROM:<{sender}>"), false)
            .await
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] if the recipient is refused.
    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<Reply> {
        self.step("RCPT TO", &format!("RCPT TO:<{recipient}>"), false)
            .await
    }

    /// Sends `DATA`, the dot-stuffed `message` and the terminating dot.
    ///
    /// # Errors
    ///
    /// Returns an error if either the `354` or the final acceptance is
    /// missing, or the transfer exceeds the data budget.
    pub async fn data(&mut self, message: &str) -> Result<Reply> {
        let budget = self.timeouts.data();

        within("DATA", budget, async {
            self.send_line("DATA").await?;
            self.read_reply().await?.expect("DATA", true)?;

            let mut payload = dot_stuff(message);
            if !payload.ends_with("\r\n") {
                payload.push_str("\r\n");
            }
            payload.push_str(".\r\n");

            wire!("C: <{} bytes of message data>", payload.len());
            self.connection_mut()?.send(payload.as_bytes()).await?;

            self.read_reply().await?.expect("DATA", false)
        })
        .await
    }

    /// Ends the session. Errors are logged, not returned: a message accepted
    /// before QUIT stays accepted.
    pub async fn quit(mut self) {
        let budget = self.timeouts.quit();
        let result = within("QUIT", budget, async {
            self.send_line("QUIT").await?;
            self.read_reply().await
        })
        .await;

        if let Err(e) = result {
            tracing::debug!(error = %e, "QUIT did not complete cleanly");
        }
    }

    async fn step(&mut self, step: &'static str, command: &str, intermediate_ok: bool) -> Result<Reply> {
        let budget = self.timeouts.command();
        within(step, budget, async {
            self.send_line(command).await?;
            self.read_reply().await
        })
        .await?
        .expect(step, intermediate_ok)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        wire!("C: {line}");
        let data = format!("{line}\r\n");
        self.connection_mut()?.send(data.as_bytes()).await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                wire!("S: {} {}", reply.code, reply.message());
                return Ok(reply);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let pos = self.buffer_pos;
            let connection = self.connection.as_mut().ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Doubles a leading `.` on every line and normalises bare `\n` to CRLF.
#[must_use]
pub fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 16);
    for (i, line) in message.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out
}
