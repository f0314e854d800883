//! The registration sub-machine.
//!
//! Unregistered clients get PASS, NICK and USER (in either order) and
//! nothing else; every other command is silently dropped. Once both a
//! nickname and a username are present — and the password file, if
//! configured, agrees — the client is registered and receives the welcome
//! burst: 001–004, LUSERS, MOTD.

use super::{ClientId, Daemon, Response};
use tinyirc_proto::NickExt;
use tracing::info;

impl Daemon {
    pub(super) async fn handle_registration(&mut self, id: ClientId, cmd: &str, rest: Option<&str>) {
        match cmd {
            "PASS" => self.reg_pass(id, rest),
            "NICK" => self.reg_nick(id, rest),
            "USER" => self.reg_user(id, rest),
            _ => {}
        }
        self.try_complete_registration(id).await;
    }

    fn reg_pass(&mut self, id: ClientId, rest: Option<&str>) {
        let rest = rest.filter(|r| !r.is_empty());
        let session = match self.clients.get_mut(&id) {
            Some(session) => session,
            None => return,
        };
        match rest {
            Some(password) => session.password = Some(password.to_string()),
            None => session
                .client
                .reply_not_enough_parameters(&session.nickname, "PASS"),
        }
    }

    fn reg_nick(&mut self, id: ClientId, rest: Option<&str>) {
        let raw = match rest.filter(|r| !r.is_empty()) {
            Some(raw) => raw,
            None => {
                if let Some(session) = self.clients.get(&id) {
                    session
                        .client
                        .reply_parts(Response::ERR_NONICKNAMEGIVEN, &["No nickname given"]);
                }
                return;
            }
        };
        // Some clients prepend a colon to the nickname.
        let nickname = raw.strip_prefix(':').unwrap_or(raw).to_ascii_lowercase();
        if self.clients.values().any(|s| s.nickname == nickname) {
            if let Some(session) = self.clients.get(&id) {
                session.client.reply_parts(
                    Response::ERR_NICKNAMEINUSE,
                    &["*", &nickname, "Nickname is already in use"],
                );
            }
            return;
        }
        if !nickname.is_valid_nick() {
            if let Some(session) = self.clients.get(&id) {
                session.client.reply_parts(
                    Response::ERR_ERRONEUSNICKNAME,
                    &["*", raw, "Erroneous nickname"],
                );
            }
            return;
        }
        if let Some(session) = self.clients.get_mut(&id) {
            session.nickname = nickname;
        }
    }

    fn reg_user(&mut self, id: ClientId, rest: Option<&str>) {
        let session = match self.clients.get_mut(&id) {
            Some(session) => session,
            None => return,
        };
        let args: Vec<&str> = match rest {
            Some(rest) => rest.splitn(4, ' ').collect(),
            None => Vec::new(),
        };
        if args.len() < 4 {
            session
                .client
                .reply_not_enough_parameters(&session.nickname, "USER");
            return;
        }
        session.username = args[0].to_string();
        session.realname = args[3].trim_start_matches(':').to_string();
    }

    /// Complete registration once NICK and USER have both landed.
    async fn try_complete_registration(&mut self, id: ClientId) {
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        if session.registered || session.nickname == "*" || session.username.is_empty() {
            return;
        }

        if self.passwords_path.is_some() {
            let allowed = match (&session.password, self.passwords.get(&session.nickname)) {
                (None, _) => false,
                (Some(given), Some(expected)) => given == expected,
                (Some(_), None) => true,
            };
            if !allowed {
                session
                    .client
                    .reply_parts(Response::ERR_PASSWDMISMATCH, &["You may not register"]);
                session.client.close();
                return;
            }
        }

        if let Some(session) = self.clients.get_mut(&id) {
            session.registered = true;
        }
        let hostname = self.hostname.clone();
        let session = match self.clients.get(&id) {
            Some(session) => session,
            None => return,
        };
        session.reply_nicknamed(Response::RPL_WELCOME, &["Hi, welcome to IRC"]);
        session.reply_nicknamed(
            Response::RPL_YOURHOST,
            &[&format!(
                "Your host is {}, running tinyircd {}",
                hostname,
                env!("CARGO_PKG_VERSION")
            )],
        );
        session.reply_nicknamed(
            Response::RPL_CREATED,
            &["This server was created sometime"],
        );
        session.reply_nicknamed(
            Response::RPL_MYINFO,
            &[&format!("{} tinyircd o o", hostname)],
        );
        info!(addr = %session.client.addr(), nick = %session.nickname, "logged in");
        self.send_lusers(id);
        self.send_motd(id).await;
    }
}
