//! The registered-client command table.

use super::{ClientId, Daemon, Response, room_info};
use crate::persist::StateEvent;
use crate::room::RoomEvent;
use std::sync::Arc;
use tinyirc_proto::ChannelExt;

/// Owned snapshot of a WHOIS target, so replies can be built while room
/// snapshots are collected.
struct WhoisTarget {
    id: ClientId,
    nick: String,
    user: String,
    host: String,
    realname: String,
    away: Option<String>,
}

impl Daemon {
    pub(super) async fn handle_command(&mut self, id: ClientId, cmd: &str, rest: Option<&str>) {
        match cmd {
            "AWAY" => self.cmd_away(id, rest),
            "JOIN" => self.cmd_join(id, rest).await,
            "LIST" => self.cmd_list(id, rest).await,
            "LUSERS" => self.send_lusers(id),
            "MODE" => self.cmd_mode(id, rest).await,
            "MOTD" => self.send_motd(id).await,
            "PART" => self.cmd_part(id, rest).await,
            "PING" => self.cmd_ping(id, rest),
            "PONG" => {}
            "NOTICE" | "PRIVMSG" => self.cmd_message(id, cmd, rest).await,
            "TOPIC" => self.cmd_topic(id, rest).await,
            "WHO" => self.cmd_who(id, rest).await,
            "WHOIS" => self.cmd_whois(id, rest).await,
            "ISON" => self.cmd_ison(id, rest),
            "VERSION" => self.cmd_version(id),
            _ => {
                if let Some(session) = self.clients.get(&id) {
                    session
                        .reply_nicknamed(Response::ERR_UNKNOWNCOMMAND, &[cmd, "Unknown command"]);
                }
            }
        }
    }

    fn cmd_away(&mut self, id: ClientId, rest: Option<&str>) {
        let session = match self.clients.get_mut(&id) {
            Some(session) => session,
            None => return,
        };
        match rest {
            None => {
                session.away = None;
                session.reply_nicknamed(
                    Response::RPL_UNAWAY,
                    &["You are no longer marked as being away"],
                );
            }
            Some(text) => {
                session.away = Some(text.strip_prefix(':').unwrap_or(text).to_string());
                session.reply_nicknamed(
                    Response::RPL_NOWAWAY,
                    &["You have been marked as being away"],
                );
            }
        }
    }

    async fn cmd_join(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick, member) = match self.clients.get(&id) {
            Some(s) => (Arc::clone(&s.client), s.nickname.clone(), s.member()),
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "JOIN"),
        };
        let mut words = arg.split(' ');
        let names = words.next().unwrap_or("");
        let keys: Vec<&str> = words
            .next()
            .map(|keys| keys.split(',').collect())
            .unwrap_or_default();

        for (n, name) in names.split(',').enumerate() {
            if !name.is_channel_name() {
                client.reply_no_channel(&nick, name);
                continue;
            }
            let key = keys.get(n).copied().unwrap_or("");
            if let Some(handle) = self.rooms.get(name) {
                let info = match room_info(&handle.tx).await {
                    Some(info) => info,
                    None => continue,
                };
                if !info.key.is_empty() && info.key != key {
                    client.reply_nicknamed(
                        &nick,
                        Response::ERR_BADCHANNELKEY,
                        &[name, "Cannot join channel (+k) - bad key"],
                    );
                    continue;
                }
                let _ = handle.tx.send(RoomEvent::Join(member.clone())).await;
            } else {
                let tx = self.register_room(name, String::new(), key.to_string());
                if !key.is_empty() {
                    let event = StateEvent {
                        room: name.to_string(),
                        topic: String::new(),
                        key: key.to_string(),
                    };
                    let _ = self.state_tx.send(event).await;
                }
                let _ = tx.send(RoomEvent::Join(member.clone())).await;
            }
        }
    }

    async fn cmd_list(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick) = match self.clients.get(&id) {
            Some(s) => (Arc::clone(&s.client), s.nickname.clone()),
            None => return,
        };
        let mut names: Vec<String> = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg
                .split(' ')
                .next()
                .unwrap_or("")
                .split(',')
                .map(str::to_string)
                .collect(),
            None => self.rooms.keys().cloned().collect(),
        };
        names.sort_unstable();
        for name in &names {
            if let Some(handle) = self.rooms.get(name) {
                if let Some(info) = room_info(&handle.tx).await {
                    client.reply_nicknamed(
                        &nick,
                        Response::RPL_LIST,
                        &[name, &info.members.len().to_string(), &info.topic],
                    );
                }
            }
        }
        client.reply_nicknamed(&nick, Response::RPL_LISTEND, &["End of /LIST"]);
    }

    async fn cmd_mode(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick, username, member) = match self.clients.get(&id) {
            Some(s) => (
                Arc::clone(&s.client),
                s.nickname.clone(),
                s.username.clone(),
                s.member(),
            ),
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "MODE"),
        };
        let (target, modeargs) = match arg.split_once(' ') {
            Some((target, modeargs)) => (target, Some(modeargs)),
            None => (arg, None),
        };
        if target == username {
            match modeargs {
                None => client.msg(format!("{} {} +", Response::RPL_UMODEIS, nick)),
                Some(_) => {
                    client.reply_nicknamed(
                        &nick,
                        Response::ERR_UMODEUNKNOWNFLAG,
                        &["Unknown MODE flag"],
                    );
                }
            }
            return;
        }
        match self.rooms.get(target) {
            Some(handle) => {
                let event = RoomEvent::Mode {
                    member,
                    text: modeargs.unwrap_or("").to_string(),
                };
                let _ = handle.tx.send(event).await;
            }
            None => client.reply_no_channel(&nick, target),
        }
    }

    async fn cmd_part(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick, prefix) = match self.clients.get(&id) {
            Some(s) => (
                Arc::clone(&s.client),
                s.nickname.clone(),
                s.prefix().to_string(),
            ),
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "PART"),
        };
        let names = arg.split(' ').next().unwrap_or("");
        for name in names.split(',') {
            match self.rooms.get(name) {
                Some(handle) => {
                    let event = RoomEvent::Part {
                        id,
                        prefix: prefix.clone(),
                        reason: String::new(),
                    };
                    let _ = handle.tx.send(event).await;
                }
                None => client.reply_no_channel(&nick, name),
            }
        }
    }

    fn cmd_ping(&self, id: ClientId, rest: Option<&str>) {
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        match rest {
            None => session.reply_nicknamed(Response::ERR_NOORIGIN, &["No origin specified"]),
            Some(arg) => session
                .client
                .reply(&format!("PONG {} :{}", self.hostname, arg)),
        }
    }

    async fn cmd_message(&mut self, id: ClientId, cmd: &str, rest: Option<&str>) {
        let (client, nick, prefix) = match self.clients.get(&id) {
            Some(s) => (
                Arc::clone(&s.client),
                s.nickname.clone(),
                s.prefix().to_string(),
            ),
            None => return,
        };
        let arg = match rest {
            Some(arg) => arg,
            None => {
                return client.reply_nicknamed(
                    &nick,
                    Response::ERR_NORECIPIENT,
                    &[&format!("No recipient given ({})", cmd)],
                );
            }
        };
        let (target, text) = match arg.split_once(' ') {
            Some((target, text)) => (target, text),
            None => {
                return client.reply_nicknamed(&nick, Response::ERR_NOTEXTTOSEND, &["No text to send"]);
            }
        };
        let target = target.to_ascii_lowercase();

        if let Some(peer) = self.clients.values().find(|s| s.nickname == target) {
            peer.client
                .msg(format!(":{} {} {} {}", prefix, cmd, peer.nickname, text));
            if let Some(away) = &peer.away {
                client.reply_nicknamed(&nick, Response::RPL_AWAY, &[&peer.nickname, away]);
            }
            return;
        }

        match self.rooms.get(&target) {
            Some(handle) => {
                let event = RoomEvent::Message {
                    id,
                    prefix,
                    nick: nick.clone(),
                    notice: cmd == "NOTICE",
                    text: text.strip_prefix(':').unwrap_or(text).to_string(),
                };
                let _ = handle.tx.send(event).await;
            }
            None => client.reply_no_nick_chan(&nick, &target),
        }
    }

    async fn cmd_topic(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick, member) = match self.clients.get(&id) {
            Some(s) => (Arc::clone(&s.client), s.nickname.clone(), s.member()),
            None => return,
        };
        let arg = match rest {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "TOPIC"),
        };
        let (name, text) = match arg.split_once(' ') {
            Some((name, text)) => (name, text),
            None => (arg, ""),
        };
        match self.rooms.get(name) {
            Some(handle) => {
                let event = RoomEvent::Topic {
                    member,
                    text: text.to_string(),
                };
                let _ = handle.tx.send(event).await;
            }
            None => client.reply_no_channel(&nick, name),
        }
    }

    async fn cmd_who(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick, member) = match self.clients.get(&id) {
            Some(s) => (Arc::clone(&s.client), s.nickname.clone(), s.member()),
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "WHO"),
        };
        let name = arg.split(' ').next().unwrap_or("");
        match self.rooms.get(name) {
            Some(handle) => {
                let _ = handle.tx.send(RoomEvent::Who { member }).await;
            }
            None => client.reply_no_channel(&nick, name),
        }
    }

    async fn cmd_whois(&mut self, id: ClientId, rest: Option<&str>) {
        let (client, nick) = match self.clients.get(&id) {
            Some(s) => (Arc::clone(&s.client), s.nickname.clone()),
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => return client.reply_not_enough_parameters(&nick, "WHOIS"),
        };
        let queries = match arg.split(' ').next_back() {
            Some(last) => last.split(','),
            None => return,
        };
        for query in queries {
            let query = query.to_ascii_lowercase();
            let target = self
                .clients
                .values()
                .find(|s| s.nickname == query)
                .map(|s| WhoisTarget {
                    id: s.client.id(),
                    nick: s.nickname.clone(),
                    user: s.username.clone(),
                    host: s.client.host().to_string(),
                    realname: s.realname.clone(),
                    away: s.away.clone(),
                });
            let target = match target {
                Some(target) => target,
                None => {
                    client.reply_no_nick_chan(&nick, &query);
                    continue;
                }
            };
            client.reply_nicknamed(
                &nick,
                Response::RPL_WHOISUSER,
                &[&target.nick, &target.user, &target.host, "*", &target.realname],
            );
            client.reply_nicknamed(
                &nick,
                Response::RPL_WHOISSERVER,
                &[&target.nick, &self.hostname, &self.hostname],
            );
            if let Some(away) = &target.away {
                client.reply_nicknamed(&nick, Response::RPL_AWAY, &[&target.nick, away]);
            }
            let mut channels = Vec::new();
            for (name, handle) in &self.rooms {
                if let Some(info) = room_info(&handle.tx).await {
                    if info.members.contains(&target.id) {
                        channels.push(name.clone());
                    }
                }
            }
            channels.sort_unstable();
            client.reply_nicknamed(
                &nick,
                Response::RPL_WHOISCHANNELS,
                &[&target.nick, &channels.join(" ")],
            );
            client.reply_nicknamed(
                &nick,
                Response::RPL_ENDOFWHOIS,
                &[&target.nick, "End of /WHOIS list"],
            );
        }
    }

    fn cmd_ison(&self, id: ClientId, rest: Option<&str>) {
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        let arg = match rest.filter(|r| !r.is_empty()) {
            Some(arg) => arg,
            None => {
                return session
                    .client
                    .reply_not_enough_parameters(&session.nickname, "ISON");
            }
        };
        let present: Vec<&str> = arg
            .split(' ')
            .filter(|query| {
                self.clients
                    .values()
                    .any(|s| s.registered && s.nickname == *query)
            })
            .collect();
        session.reply_nicknamed(Response::RPL_ISON, &[&present.join(" ")]);
    }

    fn cmd_version(&self, id: ClientId) {
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        let debug = if self.verbose { "debug" } else { "" };
        session.reply_nicknamed(
            Response::RPL_VERSION,
            &[&format!(
                "{}.{} {} :",
                env!("CARGO_PKG_VERSION"),
                debug,
                self.hostname
            )],
        );
    }
}
