//! Client connections.
//!
//! A [`Client`] is the shared handle to one connected socket: the outbound
//! send queue, the peer identity, and an idempotent close. The daemon and
//! every room the client joins enqueue lines through it; only the
//! connection task started by [`run`] touches the socket itself.
//!
//! The connection task is a single `select!` loop over the read half, the
//! send queue, and the cancellation token. It emits `New` when it starts,
//! one `Msg` event per non-empty inbound line, and exactly one `Del` when
//! it ends, whatever ended it.

use crate::daemon::ClientEvent;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tinyirc_proto::{LineBuffer, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

/// Shared handle to one connected client.
pub struct Client {
    id: ClientId,
    addr: SocketAddr,
    host: String,
    hostname: String,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl Client {
    /// Create a client handle plus the consuming end of its send queue.
    pub fn new(hostname: &str, addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            id: ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)),
            addr,
            host: addr.ip().to_string(),
            hostname: hostname.to_string(),
            tx,
            cancel: CancellationToken::new(),
        });
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The peer's host as used in `nick!user@host` prefixes.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Queue a raw line, without the server prefix. Used for server PING
    /// and for forwarded messages whose prefix is already the sender's.
    pub fn msg(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }

    /// Queue a server-prefixed line.
    pub fn reply(&self, line: &str) {
        self.msg(format!(":{} {}", self.hostname, line));
    }

    /// Queue `code arg1 arg2 … :last` with the server prefix.
    pub fn reply_parts(&self, code: Response, params: &[&str]) {
        let mut line = code.to_string();
        if let Some((last, init)) = params.split_last() {
            for param in init {
                line.push(' ');
                line.push_str(param);
            }
            line.push_str(" :");
            line.push_str(last);
        }
        self.reply(&line);
    }

    /// Queue `code nick arg1 … :last` with the server prefix.
    pub fn reply_nicknamed(&self, nick: &str, code: Response, params: &[&str]) {
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(nick);
        all.extend_from_slice(params);
        self.reply_parts(code, &all);
    }

    pub fn reply_not_enough_parameters(&self, nick: &str, command: &str) {
        self.reply_nicknamed(
            nick,
            Response::ERR_NEEDMOREPARAMS,
            &[command, "Not enough parameters"],
        );
    }

    pub fn reply_no_channel(&self, nick: &str, name: &str) {
        self.reply_nicknamed(nick, Response::ERR_NOSUCHCHANNEL, &[name, "No such channel"]);
    }

    pub fn reply_no_nick_chan(&self, nick: &str, name: &str) {
        self.reply_nicknamed(
            nick,
            Response::ERR_NOSUCHNICK,
            &[name, "No such nick/channel"],
        );
    }

    /// Close the connection. Idempotent, callable from any task; the
    /// connection task observes the cancellation and winds down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Drive one connection to completion.
pub async fn run<S>(
    client: Arc<Client>,
    stream: S,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ClientEvent>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    if events.send(ClientEvent::New(Arc::clone(&client))).await.is_err() {
        return;
    }

    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; 1024];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        lines.extend(&chunk[..n]);
                        if !pump_lines(&client, &mut lines, &events).await {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(addr = %client.addr, error = %e, "read error");
                        break;
                    }
                }
            }
            line = outbound.recv() => {
                match line {
                    Some(line) => {
                        if write_line(&mut writer, &line).await.is_err() {
                            client.close();
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = client.cancel.cancelled() => {
                // Best-effort flush of replies queued just before the close
                // (a 462, for instance) so the peer sees why it was dropped.
                while let Ok(line) = outbound.try_recv() {
                    if write_line(&mut writer, &line).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    client.close();
    let _ = events.send(ClientEvent::Del(client)).await;
}

/// Feed every completed line to the daemon. Returns false when the
/// connection must end (framing violation or daemon gone).
async fn pump_lines(
    client: &Arc<Client>,
    lines: &mut LineBuffer,
    events: &mpsc::Sender<ClientEvent>,
) -> bool {
    loop {
        match lines.next_line() {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                let event = ClientEvent::Msg {
                    client: Arc::clone(client),
                    line,
                };
                if events.send(event).await.is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                warn!(addr = %client.addr, error = %e, "dropping connection");
                return false;
            }
        }
    }
}

async fn write_line<S>(writer: &mut WriteHalf<S>, line: &str) -> std::io::Result<()>
where
    S: AsyncWrite,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}
