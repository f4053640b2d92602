//! In-process SMTP listener standing in for the ingestion port.
//!
//! Accepts any number of sessions, records every completed transaction and
//! can be told to refuse specific recipients, fail the n-th transaction or
//! stall before replying.
#![allow(dead_code)]

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};

/// One completed MAIL/RCPT/DATA transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub helo: String,
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    /// Message content with dot-stuffing undone.
    pub data: String,
}

impl Transaction {
    /// Raw value of the `Subject` header, if any.
    pub fn subject(&self) -> Option<&str> {
        self.data
            .lines()
            .take_while(|line| !line.is_empty())
            .find_map(|line| line.strip_prefix("Subject: "))
    }
}

#[derive(Clone, Default)]
struct Behaviour {
    refuse_recipient: Option<String>,
    fail_transaction: Option<usize>,
    reply_delay: Option<Duration>,
    advertise: Vec<String>,
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    transactions: Arc<Mutex<Vec<Transaction>>>,
    sessions: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::default()
    }

    pub async fn start() -> Self {
        Self::builder().build().await
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.transactions.lock().await.clone()
    }

    /// Number of TCP sessions accepted so far.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }

    async fn handle_client(
        stream: TcpStream,
        behaviour: Arc<Behaviour>,
        transactions: Arc<Mutex<Vec<Transaction>>>,
        attempts: Arc<AtomicUsize>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        let mut helo = String::new();
        let mut mail_from = String::new();
        let mut rcpt_to = Vec::new();

        writer.write_all(b"220 mock.ingest ESMTP ready\r\n").await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let command = line.trim_end();
            let (verb, argument) = command.split_once(' ').unwrap_or((command, ""));

            if let Some(delay) = behaviour.reply_delay {
                tokio::time::sleep(delay).await;
            }

            let reply = match verb.to_ascii_uppercase().as_str() {
                "EHLO" | "HELO" => {
                    helo = argument.to_string();
                    let mut reply = String::from("250-mock.ingest\r\n");
                    for ext in &behaviour.advertise {
                        let _ = write!(reply, "250-{ext}\r\n");
                    }
                    reply.push_str("250 8BITMIME\r\n");
                    reply
                }
                "MAIL" => {
                    mail_from = strip_path(argument, "FROM:");
                    rcpt_to.clear();
                    "250 OK\r\n".to_string()
                }
                "RCPT" => {
                    let recipient = strip_path(argument, "TO:");
                    if behaviour.refuse_recipient.as_deref() == Some(recipient.as_str()) {
                        "550 5.1.1 No such mailbox\r\n".to_string()
                    } else {
                        rcpt_to.push(recipient);
                        "250 OK\r\n".to_string()
                    }
                }
                "DATA" => {
                    writer.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
                    let data = read_data(&mut reader).await?;
                    let index = attempts.fetch_add(1, Ordering::Relaxed);

                    if behaviour.fail_transaction == Some(index) {
                        "451 4.3.0 Temporary failure\r\n".to_string()
                    } else {
                        transactions.lock().await.push(Transaction {
                            helo: helo.clone(),
                            mail_from: mail_from.clone(),
                            rcpt_to: rcpt_to.clone(),
                            data,
                        });
                        "250 OK queued\r\n".to_string()
                    }
                }
                "QUIT" => {
                    writer.write_all(b"221 Bye\r\n").await?;
                    return Ok(());
                }
                _ => "502 Command not implemented\r\n".to_string(),
            };

            writer.write_all(reply.as_bytes()).await?;
        }
    }
}

fn strip_path(argument: &str, prefix: &str) -> String {
    argument
        .get(prefix.len()..)
        .unwrap_or_default()
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

async fn read_data<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut data = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(data);
        }
        if line == ".\r\n" || line == ".\n" {
            return Ok(data);
        }
        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        data.push_str(&unstuffed.replace("\r\n", "\n"));
    }
}

#[derive(Default)]
pub struct MockSmtpServerBuilder {
    behaviour: Behaviour,
}

impl MockSmtpServerBuilder {
    /// Replies `550` to `RCPT TO` for this address.
    #[must_use]
    pub fn refuse_recipient(mut self, address: impl Into<String>) -> Self {
        self.behaviour.refuse_recipient = Some(address.into());
        self
    }

    /// Replies `451` to the end of the n-th (0-based) DATA transfer.
    #[must_use]
    pub const fn fail_transaction(mut self, index: usize) -> Self {
        self.behaviour.fail_transaction = Some(index);
        self
    }

    #[must_use]
    pub const fn reply_delay(mut self, delay: Duration) -> Self {
        self.behaviour.reply_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn advertise(mut self, extension: impl Into<String>) -> Self {
        self.behaviour.advertise.push(extension.into());
        self
    }

    pub async fn build(self) -> MockSmtpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let behaviour = Arc::new(self.behaviour);
        let transactions = Arc::new(Mutex::new(Vec::new()));
        let sessions = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));

        let handle = {
            let transactions = Arc::clone(&transactions);
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    sessions.fetch_add(1, Ordering::Relaxed);
                    let behaviour = Arc::clone(&behaviour);
                    let transactions = Arc::clone(&transactions);
                    let attempts = Arc::clone(&attempts);
                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(
                            stream,
                            behaviour,
                            transactions,
                            attempts,
                        )
                        .await;
                    });
                }
            })
        };

        MockSmtpServer {
            addr,
            transactions,
            sessions,
            handle,
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
