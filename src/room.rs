//! Room actors.
//!
//! One task per channel owns that channel's member set, topic and key, and
//! processes its events strictly in arrival order. Nothing else ever
//! mutates room state; the daemon (and only the daemon) observes it
//! through [`RoomEvent::Info`] snapshots answered over a oneshot channel.
//!
//! Members are stored as snapshots taken by the daemon when it dispatched
//! the join, so broadcasts never read identity fields shared with other
//! tasks.

use crate::client::{Client, ClientId};
use crate::persist::{LogEvent, LogKind, StateEvent};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tinyirc_proto::Response;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Daemon-side handle to a room actor. Dropping it closes the event
/// channel, which stops the actor.
pub struct RoomHandle {
    pub tx: mpsc::Sender<RoomEvent>,
    pub task: JoinHandle<()>,
}

/// A client snapshot taken by the daemon at dispatch time.
#[derive(Clone)]
pub struct Member {
    pub client: Arc<Client>,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub realname: String,
}

impl Member {
    pub fn prefix(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    fn reply_nicknamed(&self, code: Response, params: &[&str]) {
        self.client.reply_nicknamed(&self.nick, code, params);
    }
}

/// Events processed by a room actor.
pub enum RoomEvent {
    /// A join already vetted by the daemon (channel key checked).
    Join(Member),
    /// Part or disconnect; ignored when the client is not a member.
    Part {
        id: ClientId,
        prefix: String,
        reason: String,
    },
    /// PRIVMSG or NOTICE addressed to the channel.
    Message {
        id: ClientId,
        prefix: String,
        nick: String,
        notice: bool,
        text: String,
    },
    /// Topic query (empty text) or topic change.
    Topic { member: Member, text: String },
    /// Mode query (empty text) or mode change.
    Mode { member: Member, text: String },
    /// WHO listing.
    Who { member: Member },
    /// State snapshot for the daemon (LIST, WHOIS, key checks, GC).
    Info { reply: oneshot::Sender<RoomInfo> },
    /// Cooperative shutdown.
    Term,
}

/// Point-in-time view of a room.
pub struct RoomInfo {
    pub topic: String,
    pub key: String,
    pub members: Vec<ClientId>,
}

struct Room {
    name: String,
    hostname: String,
    topic: String,
    key: String,
    members: HashMap<ClientId, Member>,
    log_tx: mpsc::Sender<LogEvent>,
    state_tx: mpsc::Sender<StateEvent>,
}

/// Spawn a room actor with the given initial topic and key.
pub fn spawn(
    name: &str,
    topic: String,
    key: String,
    hostname: String,
    log_tx: mpsc::Sender<LogEvent>,
    state_tx: mpsc::Sender<StateEvent>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(64);
    let room = Room {
        name: name.to_string(),
        hostname,
        topic,
        key,
        members: HashMap::new(),
        log_tx,
        state_tx,
    };
    let task = tokio::spawn(room.run(rx));
    RoomHandle { tx, task }
}

impl Room {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                RoomEvent::Join(member) => self.handle_join(member).await,
                RoomEvent::Part { id, prefix, reason } => {
                    self.handle_part(id, &prefix, &reason).await
                }
                RoomEvent::Message {
                    id,
                    prefix,
                    nick,
                    notice,
                    text,
                } => self.handle_message(id, &prefix, &nick, notice, &text).await,
                RoomEvent::Topic { member, text } => self.handle_topic(member, &text).await,
                RoomEvent::Mode { member, text } => self.handle_mode(member, &text).await,
                RoomEvent::Who { member } => self.handle_who(&member),
                RoomEvent::Info { reply } => {
                    let _ = reply.send(RoomInfo {
                        topic: self.topic.clone(),
                        key: self.key.clone(),
                        members: self.members.keys().copied().collect(),
                    });
                }
                RoomEvent::Term => {
                    self.save_state().await;
                    break;
                }
            }
        }
        debug!(room = %self.name, "room actor stopped");
    }

    async fn handle_join(&mut self, member: Member) {
        let id = member.client.id();
        let nick = member.nick.clone();
        let joined = format!(":{} JOIN :{}", member.prefix(), self.name);
        self.members.insert(id, member);
        self.broadcast(&joined);

        let member = match self.members.get(&id) {
            Some(member) => member,
            None => return,
        };
        if self.topic.is_empty() {
            member.reply_nicknamed(Response::RPL_NOTOPIC, &[&self.name, "No topic is set"]);
        } else {
            member.reply_nicknamed(Response::RPL_TOPIC, &[&self.name, &self.topic]);
        }
        let mut nicks: Vec<&str> = self.members.values().map(|m| m.nick.as_str()).collect();
        nicks.sort_unstable();
        member.reply_nicknamed(Response::RPL_NAMREPLY, &["=", &self.name, &nicks.join(" ")]);
        member.reply_nicknamed(Response::RPL_ENDOFNAMES, &[&self.name, "End of NAMES list"]);

        self.log(LogKind::Meta, &nick, "joined").await;
    }

    async fn handle_part(&mut self, id: ClientId, prefix: &str, reason: &str) {
        let member = match self.members.remove(&id) {
            Some(member) => member,
            None => return,
        };
        self.broadcast(&format!(":{} PART {} :{}", prefix, self.name, reason));
        self.log(LogKind::Meta, &member.nick, "left").await;
    }

    async fn handle_message(&mut self, id: ClientId, prefix: &str, nick: &str, notice: bool, text: &str) {
        let command = if notice { "NOTICE" } else { "PRIVMSG" };
        let line = format!(":{} {} {} :{}", prefix, command, self.name, text);
        for member in self.members.values() {
            if member.client.id() != id {
                member.client.msg(line.clone());
            }
        }
        self.log(LogKind::Message, nick, text).await;
    }

    async fn handle_topic(&mut self, member: Member, text: &str) {
        if text.is_empty() {
            if self.topic.is_empty() {
                member.reply_nicknamed(Response::RPL_NOTOPIC, &[&self.name, "No topic is set"]);
            } else {
                member.reply_nicknamed(Response::RPL_TOPIC, &[&self.name, &self.topic]);
            }
            return;
        }
        self.topic = text.strip_prefix(':').unwrap_or(text).to_string();
        self.broadcast(&format!(
            ":{} TOPIC {} :{}",
            member.prefix(),
            self.name,
            self.topic
        ));
        let what = format!("changed topic to {}", self.topic);
        self.log(LogKind::Meta, &member.nick, &what).await;
        self.save_state().await;
    }

    async fn handle_mode(&mut self, member: Member, text: &str) {
        if text.is_empty() {
            let flags = if self.key.is_empty() { "+" } else { "+k" };
            member.client.msg(format!(
                "{} {} {} {}",
                Response::RPL_CHANNELMODEIS,
                member.nick,
                self.name,
                flags
            ));
            member.client.msg(format!(
                "{} {} {} 0",
                Response::RPL_CREATIONTIME,
                member.nick,
                self.name
            ));
            return;
        }
        let mut cols = text.split(' ');
        let flag = cols.next().unwrap_or("");
        let arg = cols.next();
        match (flag, arg) {
            ("+k", Some(key)) if !key.is_empty() => {
                self.key = key.to_string();
                self.save_state().await;
            }
            ("-k", _) => {
                self.key.clear();
                self.save_state().await;
            }
            ("+b", _) => {
                member.reply_nicknamed(
                    Response::RPL_ENDOFBANLIST,
                    &[&self.name, "End of channel ban list"],
                );
            }
            _ => {
                member.reply_nicknamed(Response::ERR_UNKNOWNMODE, &[flag, "Unknown MODE flag"]);
            }
        }
    }

    fn handle_who(&self, asker: &Member) {
        for member in self.members.values() {
            asker.reply_nicknamed(
                Response::RPL_WHOREPLY,
                &[
                    &self.name,
                    &member.user,
                    &member.host,
                    &self.hostname,
                    &member.nick,
                    "H",
                    &format!("0 {}", member.realname),
                ],
            );
        }
        asker.reply_nicknamed(Response::RPL_ENDOFWHO, &[&self.name, "End of /WHO list"]);
    }

    fn broadcast(&self, line: &str) {
        for member in self.members.values() {
            member.client.msg(line.to_string());
        }
    }

    async fn log(&self, kind: LogKind, who: &str, what: &str) {
        let event = LogEvent {
            room: self.name.clone(),
            who: who.to_string(),
            what: what.to_string(),
            timestamp: Utc::now(),
            kind,
        };
        let _ = self.log_tx.send(event).await;
    }

    async fn save_state(&self) {
        let event = StateEvent {
            room: self.name.clone(),
            topic: self.topic.clone(),
            key: self.key.clone(),
        };
        let _ = self.state_tx.send(event).await;
    }
}
