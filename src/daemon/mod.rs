//! The daemon arbiter.
//!
//! One task owns the client registry and the room registry; every global
//! mutation flows through its event channel. Per-connection tasks produce
//! `New`/`Msg`/`Del`, a ticker produces `Tick`, and the signal handlers
//! produce `Rehash` and `Term`. Because the arbiter is the only task that
//! touches these maps, they need no locks.
//!
//! Room state is owned by the room actors; where the arbiter needs to see
//! it (key checks on JOIN, LIST, WHOIS membership, empty-room GC) it asks
//! for a [`RoomInfo`] snapshot over a oneshot channel.

mod commands;
mod registration;


use crate::client::{Client, ClientId};
use crate::config::Config;
use crate::persist::{LogEvent, StateEvent};
use crate::room::{self, Member, RoomEvent, RoomHandle, RoomInfo};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tinyirc_proto::{Prefix, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A client is closed after this much silence.
pub const PING_TIMEOUT: Duration = Duration::from_secs(180);
/// An idle registered client is PINGed after this much silence; an idle
/// unregistered one is closed.
pub const PING_THRESHOLD: Duration = Duration::from_secs(90);

const TICK_PERIOD: Duration = Duration::from_secs(10);

/// Events consumed by the daemon arbiter.
pub enum ClientEvent {
    /// A connection task started.
    New(Arc<Client>),
    /// A connection task ended; forwarded to every room as a part.
    Del(Arc<Client>),
    /// One inbound IRC line.
    Msg { client: Arc<Client>, line: String },
    /// Liveness and GC heartbeat.
    Tick,
    /// Reload the passwords file (SIGHUP).
    Rehash,
    /// Graceful shutdown.
    Term,
}

/// Per-connection state, owned exclusively by the arbiter.
pub(crate) struct Session {
    client: Arc<Client>,
    nickname: String,
    username: String,
    realname: String,
    password: Option<String>,
    away: Option<String>,
    registered: bool,
    recv_at: Instant,
    ping_at: Instant,
}

impl Session {
    fn new(client: Arc<Client>, now: Instant) -> Self {
        Self {
            client,
            nickname: "*".to_string(),
            username: String::new(),
            realname: String::new(),
            password: None,
            away: None,
            registered: false,
            recv_at: now,
            ping_at: now,
        }
    }

    fn prefix(&self) -> Prefix {
        Prefix::new(&self.nickname, &self.username, self.client.host())
    }

    /// Snapshot handed to room actors; they never read shared identity.
    fn member(&self) -> Member {
        Member {
            client: Arc::clone(&self.client),
            nick: self.nickname.clone(),
            user: self.username.clone(),
            host: self.client.host().to_string(),
            realname: self.realname.clone(),
        }
    }

    fn reply_nicknamed(&self, code: Response, params: &[&str]) {
        self.client.reply_nicknamed(&self.nickname, code, params);
    }
}

/// The arbiter: single owner of the client and room registries.
pub struct Daemon {
    hostname: String,
    verbose: bool,
    motd: Option<PathBuf>,
    passwords_path: Option<PathBuf>,
    passwords: HashMap<String, String>,
    statedir_configured: bool,
    clients: HashMap<ClientId, Session>,
    rooms: HashMap<String, RoomHandle>,
    log_tx: mpsc::Sender<LogEvent>,
    state_tx: mpsc::Sender<StateEvent>,
}

impl Daemon {
    pub fn new(
        config: &Config,
        log_tx: mpsc::Sender<LogEvent>,
        state_tx: mpsc::Sender<StateEvent>,
    ) -> Self {
        Self {
            hostname: config.hostname.clone(),
            verbose: config.verbose,
            motd: config.motd.clone(),
            passwords_path: config.passwords.clone(),
            passwords: HashMap::new(),
            statedir_configured: config.statedir.is_some(),
            clients: HashMap::new(),
            rooms: HashMap::new(),
            log_tx,
            state_tx,
        }
    }

    /// Register a room and start its actor. Used for statedir preloads and
    /// for JOINs naming a fresh room.
    pub fn register_room(&mut self, name: &str, topic: String, key: String) -> mpsc::Sender<RoomEvent> {
        let handle = room::spawn(
            name,
            topic,
            key,
            self.hostname.clone(),
            self.log_tx.clone(),
            self.state_tx.clone(),
        );
        let tx = handle.tx.clone();
        self.rooms.insert(name.to_string(), handle);
        info!(room = %name, "room registered");
        tx
    }

    /// Load (or reload) the passwords file. A read failure leaves the
    /// table empty, which disables nick-specific checks but still requires
    /// clients to have sent PASS.
    pub fn reload_passwords(&mut self) {
        let path = match &self.passwords_path {
            Some(path) => path,
            None => return,
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut table = HashMap::new();
                for entry in contents.lines() {
                    if entry.is_empty() {
                        continue;
                    }
                    match entry.split_once(':') {
                        Some((nick, password)) => {
                            table.insert(nick.to_string(), password.to_string());
                        }
                        None => warn!("malformed passwords entry, skipping"),
                    }
                }
                info!(entries = table.len(), "passwords loaded");
                self.passwords = table;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read passwords file");
                self.passwords.clear();
            }
        }
    }

    /// Run the event loop until `Term`, then stop every room actor and
    /// wait for it. Completion of this future is the "finished" signal.
    pub async fn run(mut self, mut events: mpsc::Receiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(event, Instant::now()).await {
                break;
            }
        }
        let handles: Vec<RoomHandle> = self.rooms.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            let _ = handle.tx.send(RoomEvent::Term).await;
        }
        for handle in handles {
            let _ = handle.task.await;
        }
        info!("daemon finished");
    }

    /// Process one event. Returns false on `Term`.
    async fn handle_event(&mut self, event: ClientEvent, now: Instant) -> bool {
        match event {
            ClientEvent::Tick => self.handle_tick(now).await,
            ClientEvent::Term => return false,
            ClientEvent::Rehash => self.reload_passwords(),
            ClientEvent::New(client) => {
                debug!(addr = %client.addr(), "client registered with daemon");
                self.clients.insert(client.id(), Session::new(client, now));
            }
            ClientEvent::Del(client) => {
                if let Some(session) = self.clients.remove(&client.id()) {
                    info!(addr = %client.addr(), nick = %session.nickname, "client removed");
                    let prefix = session.prefix().to_string();
                    for handle in self.rooms.values() {
                        let event = RoomEvent::Part {
                            id: client.id(),
                            prefix: prefix.clone(),
                            reason: String::new(),
                        };
                        let _ = handle.tx.send(event).await;
                    }
                }
            }
            ClientEvent::Msg { client, line } => {
                self.dispatch(&client, &line).await;
                if let Some(session) = self.clients.get_mut(&client.id()) {
                    session.recv_at = now;
                }
            }
        }
        true
    }

    /// Split a line into its command and dispatch it.
    async fn dispatch(&mut self, client: &Arc<Client>, line: &str) {
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd.to_ascii_uppercase(), Some(rest)),
            None => (line.to_ascii_uppercase(), None),
        };
        if self.verbose {
            debug!(addr = %client.addr(), command = %cmd, "command");
        }
        if cmd == "QUIT" {
            info!(addr = %client.addr(), "quit");
            client.close();
            return;
        }
        let registered = match self.clients.get(&client.id()) {
            Some(session) => session.registered,
            None => return,
        };
        if registered {
            self.handle_command(client.id(), &cmd, rest).await;
        } else {
            self.handle_registration(client.id(), &cmd, rest).await;
        }
    }

    /// Liveness and empty-room GC, driven by the 10-second tick.
    async fn handle_tick(&mut self, now: Instant) {
        let hostname = self.hostname.clone();
        for session in self.clients.values_mut() {
            if now.duration_since(session.recv_at) > PING_TIMEOUT {
                info!(addr = %session.client.addr(), nick = %session.nickname, "ping timeout");
                session.client.close();
            } else if now.duration_since(session.ping_at) > PING_THRESHOLD {
                if session.registered {
                    session.client.msg(format!("PING :{}", hostname));
                    session.ping_at = now;
                } else {
                    info!(addr = %session.client.addr(), "ping timeout");
                    session.client.close();
                }
            }
        }

        // Rooms persist while a state directory is configured; otherwise
        // an emptied room is collected here.
        if self.statedir_configured {
            return;
        }
        let mut emptied = Vec::new();
        for (name, handle) in &self.rooms {
            if let Some(info) = room_info(&handle.tx).await {
                if info.members.is_empty() {
                    emptied.push(name.clone());
                }
            }
        }
        for name in emptied {
            info!(room = %name, "emptied room");
            self.rooms.remove(&name);
        }
    }

    fn send_lusers(&self, id: ClientId) {
        let count = self.clients.values().filter(|s| s.registered).count();
        if let Some(session) = self.clients.get(&id) {
            session.reply_nicknamed(
                Response::RPL_LUSERCLIENT,
                &[&format!(
                    "There are {} users and 0 invisible on 1 servers",
                    count
                )],
            );
        }
    }

    async fn send_motd(&self, id: ClientId) {
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        let path = match &self.motd {
            Some(path) => path,
            None => {
                session.reply_nicknamed(Response::ERR_NOMOTD, &["MOTD File is missing"]);
                return;
            }
        };
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                session.reply_nicknamed(
                    Response::RPL_MOTDSTART,
                    &[&format!("- {} Message of the day -", self.hostname)],
                );
                let text = text.strip_suffix('\n').unwrap_or(&text);
                for line in text.split('\n') {
                    session.reply_nicknamed(Response::RPL_MOTD, &[&format!("- {}", line)]);
                }
                session.reply_nicknamed(Response::RPL_ENDOFMOTD, &["End of /MOTD command"]);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read motd");
                session.reply_nicknamed(Response::ERR_NOMOTD, &["Error reading MOTD File"]);
            }
        }
    }
}

/// Ask a room actor for a state snapshot.
async fn room_info(tx: &mpsc::Sender<RoomEvent>) -> Option<RoomInfo> {
    let (reply, rx) = oneshot::channel();
    tx.send(RoomEvent::Info { reply }).await.ok()?;
    rx.await.ok()
}

/// Spawn the tick producer. It stops once the daemon channel closes.
pub fn spawn_ticker(tx: mpsc::Sender<ClientEvent>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(ClientEvent::Tick).await.is_err() {
                break;
            }
        }
    });
}
