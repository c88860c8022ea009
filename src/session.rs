//! The state machine: dispatch table, command handlers, and the public
//! [`Session`] surface.
//!
//! Handlers are free functions registered in [`HANDLERS`], a compile-time
//! table mapping a command word to the (possibly several) handler
//! functions that run for it. [`Session::parse_tokens`] looks up every
//! entry whose command matches, runs it, and prepends `Emit::Command` to
//! its result; [`Session::recv`] drives a [`StatefulDecoder`] to turn bytes
//! into [`Line`]s and feeds each one through `parse_tokens` for its side
//! effects.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{TimeZone, Utc};

use crate::caps::CapState;
use crate::casemap::casefold;
use crate::emit::Emit;
use crate::entity::{Channel, ChannelUser, User};
use crate::error::{Result, TrackerError};
use crate::isupport::ISupport;
use crate::line::{Hostmask, Line, StatefulDecoder};

/// The IRC client-side session state tracker.
///
/// Holds everything the state model needs: the local identity, the
/// visible users and joined channels (and the indices between them), the
/// negotiated `ISUPPORT`/capability sets, and the byte-stream decoder.
/// Construct with [`Session::new`], feed it bytes with [`Session::recv`],
/// and read state back through the accessor methods below.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Session {
    name: String,

    nickname: String,
    nickname_lower: String,
    username: Option<String>,
    hostname: Option<String>,
    realname: Option<String>,
    account: Option<String>,
    away: Option<String>,

    modes: HashSet<char>,
    motd: Vec<String>,

    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    /// folded nickname -> set of folded channel names it is a member of.
    user_channels: HashMap<String, HashSet<String>>,
    /// folded channel name -> (folded nickname -> membership record).
    channel_users: HashMap<String, HashMap<String, ChannelUser>>,

    isupport: ISupport,
    caps_state: CapState,

    #[cfg_attr(feature = "serde", serde(skip))]
    decoder: StatefulDecoder,
}

impl Session {
    /// Construct a fresh session with no identity yet (`nickname` is empty
    /// until `001`). `name` is a caller-chosen label for this session, not
    /// itself part of the protocol state (e.g. a bouncer network name).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nickname: String::new(),
            nickname_lower: String::new(),
            username: None,
            hostname: None,
            realname: None,
            account: None,
            away: None,
            modes: HashSet::new(),
            motd: Vec::new(),
            users: HashMap::new(),
            channels: HashMap::new(),
            user_channels: HashMap::new(),
            channel_users: HashMap::new(),
            isupport: ISupport::new(),
            caps_state: CapState::default(),
            decoder: StatefulDecoder::new(),
        }
    }

    /// The label passed to [`Session::new`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The local user's current nickname; empty until `001`.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// User-mode chars currently set on the local user.
    pub fn modes(&self) -> &HashSet<char> {
        &self.modes
    }

    /// MOTD text lines accumulated since the most recent `375`.
    pub fn motd(&self) -> &[String] {
        &self.motd
    }

    /// Every tracked user, keyed by folded nickname.
    pub fn users(&self) -> &HashMap<String, User> {
        &self.users
    }

    /// Every joined channel, keyed by folded name.
    pub fn channels(&self) -> &HashMap<String, Channel> {
        &self.channels
    }

    /// Roster of each channel: folded channel name -> (folded nickname -> membership).
    pub fn channel_users(&self) -> &HashMap<String, HashMap<String, ChannelUser>> {
        &self.channel_users
    }

    /// Membership index: folded nickname -> set of folded channel names.
    pub fn user_channels(&self) -> &HashMap<String, HashSet<String>> {
        &self.user_channels
    }

    /// Accumulated `ISUPPORT` state.
    pub fn isupport(&self) -> &ISupport {
        &self.isupport
    }

    /// Advertised capability set; `None` until the first complete `CAP LS`.
    pub fn caps(&self) -> Option<&HashMap<String, Option<String>>> {
        self.caps_state.caps.as_ref()
    }

    /// Capabilities currently acknowledged, in `ACK` order.
    pub fn agreed_caps(&self) -> &[String] {
        &self.caps_state.agreed_caps
    }

    /// Local username (ident), learned opportunistically.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Local hostname, learned opportunistically.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Local real name (GECOS), learned opportunistically.
    pub fn realname(&self) -> Option<&str> {
        self.realname.as_deref()
    }

    /// Local services account name, learned opportunistically.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Local away message, if currently away.
    pub fn away(&self) -> Option<&str> {
        self.away.as_deref()
    }

    /// Fold `s` under the currently negotiated casemapping.
    pub fn casefold(&self, s: &str) -> String {
        casefold(self.isupport.casemapping, s)
    }

    /// `true` if `a` and `b` fold to the same value.
    pub fn casefold_equals(&self, a: &str, b: &str) -> bool {
        self.casefold(a) == self.casefold(b)
    }

    /// `true` if `target`'s first character is a known channel-type prefix.
    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .is_some_and(|c| self.isupport.chantypes.contains(c))
    }

    /// `true` if `nickname` is currently tracked.
    pub fn has_user(&self, nickname: &str) -> bool {
        self.users.contains_key(&self.casefold(nickname))
    }

    /// `true` if `name` is a currently joined channel.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(&self.casefold(name))
    }

    /// The joined channel named `name`, if any.
    pub fn get_channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.casefold(name))
    }

    /// Register membership of `user_lower` in `channel_lower`, always
    /// creating a fresh [`ChannelUser`] (no prior mode state carried over,
    /// even if a membership already existed for this pair). Returns the new
    /// membership for the caller to populate with discovered prefix modes.
    fn user_join(&mut self, channel_lower: &str, user_lower: &str) -> &mut ChannelUser {
        self.user_channels
            .entry(user_lower.to_string())
            .or_default()
            .insert(channel_lower.to_string());
        let roster = self.channel_users.entry(channel_lower.to_string()).or_default();
        roster.insert(
            user_lower.to_string(),
            ChannelUser::new(channel_lower.to_string(), user_lower.to_string()),
        );
        roster.get_mut(user_lower).expect("just inserted")
    }

    /// Drop every user, channel and the indices between them (self
    /// `QUIT`/`ERROR`).
    fn clear_all(&mut self) {
        self.users.clear();
        self.channels.clear();
        self.user_channels.clear();
        self.channel_users.clear();
    }

    /// Advance a single already-tokenized line through the handler table,
    /// mutating state and returning the batches of emits the matching
    /// handlers produced (one batch per handler, each already carrying its
    /// leading `Emit::Command`).
    pub fn parse_tokens(&mut self, line: &Line) -> Vec<Vec<Emit>> {
        let mut batches = Vec::new();
        for (command, handler) in HANDLERS {
            if *command == line.command {
                let mut emits = handler(self, line);
                emits.insert(0, Emit::Command(line.command.clone()));
                batches.push(emits);
            }
        }
        batches
    }

    /// Feed newly received bytes, segmenting them into whole lines and
    /// dispatching each one for its side effects. Returns the lines the
    /// decoder extracted; fails with [`TrackerError::Disconnected`] once
    /// the decoder signals graceful stream end.
    pub fn recv(&mut self, data: &[u8]) -> Result<Vec<Line>> {
        match self.decoder.push(data) {
            None => Err(TrackerError::Disconnected),
            Some(lines) => {
                for line in &lines {
                    self.parse_tokens(line);
                }
                Ok(lines)
            }
        }
    }
}

type HandlerFn = fn(&mut Session, &Line) -> Vec<Emit>;

/// The compile-time command-word dispatch table. `375` is deliberately
/// registered twice: once to clear the MOTD buffer, once sharing the `372`
/// handler that appends text — both run, in this order, for every `375`
/// line, since a server's MOTD start line also carries its first line of
/// text.
const HANDLERS: &[(&str, HandlerFn)] = &[
    ("001", handle_welcome),
    ("005", handle_isupport),
    ("375", handle_motd_start),
    ("375", handle_motd_line),
    ("372", handle_motd_line),
    ("NICK", handle_nick),
    ("JOIN", handle_join),
    ("PART", handle_part),
    ("KICK", handle_kick),
    ("QUIT", handle_quit),
    ("ERROR", handle_error),
    ("353", handle_names),
    ("329", handle_creation_time),
    ("TOPIC", handle_topic),
    ("332", handle_topic_text),
    ("333", handle_topic_setby),
    ("MODE", handle_mode),
    ("324", handle_channel_modes_reply),
    ("211", handle_user_modes_reply),
    ("PRIVMSG", handle_message),
    ("NOTICE", handle_message),
    ("TAGMSG", handle_message),
    ("396", handle_hostname),
    ("352", handle_who),
    ("311", handle_whois),
    ("CHGHOST", handle_chghost),
    ("SETNAME", handle_setname),
    ("AWAY", handle_away),
    ("ACCOUNT", handle_account),
    ("CAP", handle_cap),
];

fn handle_welcome(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(nick) = line.params.first() else {
        return Vec::new();
    };
    session.nickname = nick.clone();
    session.nickname_lower = session.casefold(nick);
    Vec::new()
}

fn handle_isupport(session: &mut Session, line: &Line) -> Vec<Emit> {
    let n = line.params.len();
    if n >= 2 {
        session.isupport.apply(&line.params[1..n - 1]);
    }
    Vec::new()
}

fn handle_motd_start(session: &mut Session, _line: &Line) -> Vec<Emit> {
    session.motd.clear();
    Vec::new()
}

fn handle_motd_line(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(text) = line.params.get(1) else {
        return Vec::new();
    };
    session.motd.push(text.clone());
    vec![Emit::Text(text.clone())]
}

fn handle_nick(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(new_nickname) = line.params.first() else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let old_lower = session.casefold(&hostmask.nickname);
    let mut emits = Vec::new();

    if session.users.contains_key(&old_lower) {
        let new_lower = session.casefold(new_nickname);
        let mut user = session.users.remove(&old_lower).expect("just checked");
        user.set_nickname(new_nickname.clone(), new_lower.clone());

        if let Some(memberships) = session.user_channels.remove(&old_lower) {
            for channel_lower in &memberships {
                if let Some(roster) = session.channel_users.get_mut(channel_lower) {
                    if let Some(mut channel_user) = roster.remove(&old_lower) {
                        channel_user.user = new_lower.clone();
                        roster.insert(new_lower.clone(), channel_user);
                    }
                }
            }
            session.user_channels.insert(new_lower.clone(), memberships);
        }

        emits.push(Emit::SourceUser(user.clone()));
        session.users.insert(new_lower, user);
    }
    if old_lower == session.nickname_lower {
        emits.push(Emit::SourceSelf);
        session.nickname = new_nickname.clone();
        session.nickname_lower = session.casefold(new_nickname);
    }
    emits
}

fn handle_join(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.first() else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let extended = line.params.len() == 3;
    let account = if extended {
        Some(line.params[1].trim_matches('*').to_string())
    } else {
        None
    };
    let realname = if extended { Some(line.params[2].clone()) } else { None };

    let mut emits = Vec::new();
    let channel_lower = session.casefold(channel_raw);
    let nickname_lower = session.casefold(&hostmask.nickname);

    if nickname_lower == session.nickname_lower {
        emits.push(Emit::SourceSelf);
        if !session.channels.contains_key(&channel_lower) {
            session
                .channels
                .insert(channel_lower.clone(), Channel::new(channel_raw.clone(), channel_lower.clone()));
            session.channel_users.insert(channel_lower.clone(), HashMap::new());
        }
        if let Some(username) = &hostmask.username {
            session.username = Some(username.clone());
        }
        if let Some(hostname) = &hostmask.hostname {
            session.hostname = Some(hostname.clone());
        }
        if extended {
            session.account = account.clone();
            session.realname = realname.clone();
        }
    }

    if session.channels.contains_key(&channel_lower) {
        if !session.users.contains_key(&nickname_lower) {
            session
                .users
                .insert(nickname_lower.clone(), User::new(hostmask.nickname.clone(), nickname_lower.clone()));
        }
        {
            let user = session.users.get_mut(&nickname_lower).expect("just inserted");
            if let Some(username) = &hostmask.username {
                user.username = Some(username.clone());
            }
            if let Some(hostname) = &hostmask.hostname {
                user.hostname = Some(hostname.clone());
            }
            if extended {
                user.account = account;
                user.realname = realname;
            }
        }
        emits.push(Emit::Channel(session.channels[&channel_lower].clone()));
        emits.push(Emit::SourceUser(session.users[&nickname_lower].clone()));
        session.user_join(&channel_lower, &nickname_lower);
    }
    emits
}

/// Shared `PART`/`KICK` routine: both remove one membership and differ
/// only in which params carry the actor and the reason.
fn part_or_kick(session: &mut Session, nickname: &str, channel_name: &str, reason: Option<&str>) -> Vec<Emit> {
    let mut emits = Vec::new();
    if let Some(reason) = reason {
        emits.push(Emit::Text(reason.to_string()));
    }
    let channel_lower = session.casefold(channel_name);
    let nickname_lower = session.casefold(nickname);
    if let Some(channel) = session.channels.get(&channel_lower).cloned() {
        emits.push(Emit::Channel(channel));
        if nickname_lower == session.nickname_lower {
            emits.push(Emit::SourceSelf);
            session.channels.remove(&channel_lower);
            if let Some(roster) = session.channel_users.remove(&channel_lower) {
                for user_lower in roster.keys() {
                    if let Some(memberships) = session.user_channels.get_mut(user_lower) {
                        memberships.remove(&channel_lower);
                        if memberships.is_empty() {
                            session.user_channels.remove(user_lower);
                            session.users.remove(user_lower);
                        }
                    }
                }
            }
        } else if let Some(user) = session.users.get(&nickname_lower).cloned() {
            emits.push(Emit::SourceUser(user));
            if let Some(memberships) = session.user_channels.get_mut(&nickname_lower) {
                memberships.remove(&channel_lower);
                if memberships.is_empty() {
                    session.user_channels.remove(&nickname_lower);
                    session.users.remove(&nickname_lower);
                }
            }
            if let Some(roster) = session.channel_users.get_mut(&channel_lower) {
                roster.remove(&nickname_lower);
            }
        }
    }
    emits
}

fn handle_part(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let Some(channel) = line.params.first() else {
        return Vec::new();
    };
    let reason = line.params.get(1).map(String::as_str);
    let nickname = hostmask.nickname.clone();
    part_or_kick(session, &nickname, channel, reason)
}

fn handle_kick(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel) = line.params.first() else {
        return Vec::new();
    };
    let Some(nickname) = line.params.get(1) else {
        return Vec::new();
    };
    let reason = line.params.get(2).map(String::as_str);
    part_or_kick(session, nickname, channel, reason)
}

fn handle_quit(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let mut emits = Vec::new();
    let nickname_lower = session.casefold(&hostmask.nickname);
    if let Some(reason) = line.params.first() {
        emits.push(Emit::Text(reason.clone()));
    }
    if nickname_lower == session.nickname_lower {
        emits.push(Emit::SourceSelf);
        session.clear_all();
    } else if let Some(user) = session.users.remove(&nickname_lower) {
        emits.push(Emit::SourceUser(user));
        if let Some(memberships) = session.user_channels.remove(&nickname_lower) {
            for channel_lower in memberships {
                if let Some(roster) = session.channel_users.get_mut(&channel_lower) {
                    roster.remove(&nickname_lower);
                }
            }
        }
    }
    emits
}

fn handle_error(session: &mut Session, _line: &Line) -> Vec<Emit> {
    session.clear_all();
    Vec::new()
}

fn handle_names(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.get(2) else {
        return Vec::new();
    };
    let Some(names) = line.params.get(3) else {
        return Vec::new();
    };
    let channel_lower = session.casefold(channel_raw);
    let mut emits = Vec::new();
    if !session.channels.contains_key(&channel_lower) {
        return emits;
    }
    emits.push(Emit::Channel(session.channels[&channel_lower].clone()));

    for token in names.split(' ').filter(|s| !s.is_empty()) {
        let mut rest = token;
        let mut prefix_modes = Vec::new();
        while let Some(c) = rest.chars().next() {
            match session.isupport.prefix.mode_from_sigil(c) {
                Some(mode) => {
                    prefix_modes.push(mode);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        let hostmask = Hostmask::from_source(rest);
        let nickname_lower = session.casefold(&hostmask.nickname);
        if !session.users.contains_key(&nickname_lower) {
            session
                .users
                .insert(nickname_lower.clone(), User::new(hostmask.nickname.clone(), nickname_lower.clone()));
        }
        {
            let user = session.users.get_mut(&nickname_lower).expect("just inserted");
            if let Some(username) = &hostmask.username {
                user.username = Some(username.clone());
            }
            if let Some(hostname) = &hostmask.hostname {
                user.hostname = Some(hostname.clone());
            }
        }
        if let Some(username) = &hostmask.username {
            if nickname_lower == session.nickname_lower {
                session.username = Some(username.clone());
            }
        }
        if let Some(hostname) = &hostmask.hostname {
            if nickname_lower == session.nickname_lower {
                session.hostname = Some(hostname.clone());
            }
        }
        emits.push(Emit::User(session.users[&nickname_lower].clone()));

        let channel_user = session.user_join(&channel_lower, &nickname_lower);
        for &mode in &prefix_modes {
            channel_user.add_mode(mode);
        }
    }
    emits
}

fn handle_creation_time(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(ts) = line.params.get(2).and_then(|s| s.parse::<i64>().ok()) else {
        return Vec::new();
    };
    let channel_lower = session.casefold(channel_raw);
    let mut emits = Vec::new();
    if let Some(channel) = session.channels.get_mut(&channel_lower) {
        channel.created = Utc.timestamp_opt(ts, 0).single();
        emits.push(Emit::Channel(channel.clone()));
    }
    emits
}

fn handle_topic(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.first() else {
        return Vec::new();
    };
    let Some(topic_text) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let channel_lower = session.casefold(channel_raw);
    let setter = hostmask.to_string();
    let mut emits = Vec::new();
    if let Some(channel) = session.channels.get_mut(&channel_lower) {
        channel.topic = Some(topic_text.clone());
        channel.topic_setter = Some(setter);
        channel.topic_time = Some(Utc::now());
        emits.push(Emit::Channel(channel.clone()));
    }
    emits
}

fn handle_topic_text(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(topic_text) = line.params.get(2) else {
        return Vec::new();
    };
    let channel_lower = session.casefold(channel_raw);
    let mut emits = Vec::new();
    if let Some(channel) = session.channels.get_mut(&channel_lower) {
        channel.topic = Some(topic_text.clone());
        emits.push(Emit::Channel(channel.clone()));
    }
    emits
}

fn handle_topic_setby(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(setter) = line.params.get(2) else {
        return Vec::new();
    };
    let Some(ts) = line.params.get(3).and_then(|s| s.parse::<i64>().ok()) else {
        return Vec::new();
    };
    let channel_lower = session.casefold(channel_raw);
    let mut emits = Vec::new();
    if let Some(channel) = session.channels.get_mut(&channel_lower) {
        channel.topic_setter = Some(setter.clone());
        channel.topic_time = Utc.timestamp_opt(ts, 0).single();
        emits.push(Emit::Channel(channel.clone()));
    }
    emits
}

/// Parse a `MODE`-style modifier string into `(adding, char)` pairs; the
/// modifier in effect before the first explicit `+`/`-` is `+`.
fn parse_mode_string(modes_str: &str) -> Vec<(bool, char)> {
    let mut adding = true;
    let mut out = Vec::new();
    for c in modes_str.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            other => out.push((adding, other)),
        }
    }
    out
}

/// Apply a parsed `(adding, char)` sequence to a known channel, consuming
/// parameters from `params` per mode class. A mode whose parameter is
/// missing is skipped without mutating state for that mode.
fn apply_channel_modes(session: &mut Session, channel_lower: &str, modes: &[(bool, char)], params: &mut VecDeque<String>) {
    for &(add, ch) in modes {
        if session.isupport.prefix.is_prefix_mode(ch) {
            let Some(nick_raw) = params.pop_front() else {
                continue;
            };
            let nickname_lower = session.casefold(&nick_raw);
            if session.users.contains_key(&nickname_lower) {
                if let Some(channel_user) = session
                    .channel_users
                    .get_mut(channel_lower)
                    .and_then(|roster| roster.get_mut(&nickname_lower))
                {
                    if add {
                        channel_user.add_mode(ch);
                    } else {
                        channel_user.remove_mode(ch);
                    }
                }
            }
            continue;
        }

        let list_mode = session.isupport.chanmodes.list_modes.contains(&ch);
        let b_mode = session.isupport.chanmodes.setting_b_modes.contains(&ch);
        let c_mode = session.isupport.chanmodes.setting_c_modes.contains(&ch);

        if add && (list_mode || b_mode || c_mode) {
            let Some(param) = params.pop_front() else {
                continue;
            };
            if let Some(channel) = session.channels.get_mut(channel_lower) {
                channel.add_mode(ch, Some(param), list_mode);
            }
        } else if !add && (list_mode || b_mode) {
            let Some(param) = params.pop_front() else {
                continue;
            };
            if let Some(channel) = session.channels.get_mut(channel_lower) {
                channel.remove_mode(ch, Some(param));
            }
        } else if add {
            if let Some(channel) = session.channels.get_mut(channel_lower) {
                channel.add_mode(ch, None, false);
            }
        } else if let Some(channel) = session.channels.get_mut(channel_lower) {
            channel.remove_mode(ch, None);
        }
    }
}

fn handle_mode(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(target) = line.params.first() else {
        return Vec::new();
    };
    let Some(modes_str) = line.params.get(1) else {
        return Vec::new();
    };
    let mut params: VecDeque<String> = line.params.get(2..).unwrap_or_default().iter().cloned().collect();
    let modes = parse_mode_string(modes_str);
    let target_lower = session.casefold(target);

    let mut emits = Vec::new();
    if target_lower == session.nickname_lower {
        emits.push(Emit::TargetSelf);
        for (add, ch) in modes {
            if add {
                session.modes.insert(ch);
            } else {
                session.modes.remove(&ch);
            }
        }
    } else if session.channels.contains_key(&target_lower) {
        apply_channel_modes(session, &target_lower, &modes, &mut params);
        emits.push(Emit::Channel(session.channels[&target_lower].clone()));
    }
    emits
}

fn handle_channel_modes_reply(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(channel_raw) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(modes_str) = line.params.get(2) else {
        return Vec::new();
    };
    let mut params: VecDeque<String> = line.params.get(3..).unwrap_or_default().iter().cloned().collect();
    let modes: Vec<(bool, char)> = modes_str.trim_start_matches('+').chars().map(|c| (true, c)).collect();
    let channel_lower = session.casefold(channel_raw);

    let mut emits = Vec::new();
    if session.channels.contains_key(&channel_lower) {
        apply_channel_modes(session, &channel_lower, &modes, &mut params);
        emits.push(Emit::Channel(session.channels[&channel_lower].clone()));
    }
    emits
}

fn handle_user_modes_reply(session: &mut Session, line: &Line) -> Vec<Emit> {
    if let Some(modes_str) = line.params.get(1) {
        for ch in modes_str.trim_start_matches('+').chars() {
            session.modes.insert(ch);
        }
    }
    Vec::new()
}

fn handle_message(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let Some(target_raw) = line.params.first() else {
        return Vec::new();
    };
    let mut emits = Vec::new();
    if let Some(text) = line.params.get(1) {
        emits.push(Emit::Text(text.clone()));
    }

    let nickname_lower = session.casefold(&hostmask.nickname);
    if nickname_lower == session.nickname_lower {
        emits.push(Emit::SourceSelf);
        if let Some(username) = &hostmask.username {
            session.username = Some(username.clone());
        }
        if let Some(hostname) = &hostmask.hostname {
            session.hostname = Some(hostname.clone());
        }
    }

    let source_user = if let Some(user) = session.users.get_mut(&nickname_lower) {
        if let Some(username) = &hostmask.username {
            user.username = Some(username.clone());
        }
        if let Some(hostname) = &hostmask.hostname {
            user.hostname = Some(hostname.clone());
        }
        user.clone()
    } else {
        let mut user = User::new(hostmask.nickname.clone(), nickname_lower.clone());
        user.username = hostmask.username.clone();
        user.hostname = hostmask.hostname.clone();
        user
    };
    emits.push(Emit::SourceUser(source_user));

    let mut target = target_raw.as_str();
    while let Some(c) = target.chars().next() {
        if session.isupport.statusmsg.contains(c) {
            target = &target[c.len_utf8()..];
        } else {
            break;
        }
    }
    emits.push(Emit::Target(target_raw.clone()));

    let target_lower = session.casefold(target);
    if session.is_channel(target) {
        if let Some(channel) = session.channels.get(&target_lower) {
            emits.push(Emit::Channel(channel.clone()));
        }
    } else if target_lower == session.nickname_lower {
        emits.push(Emit::TargetSelf);
    }
    emits
}

fn handle_hostname(session: &mut Session, line: &Line) -> Vec<Emit> {
    if let Some(value) = line.params.get(1) {
        match value.rsplit_once('@') {
            Some((username, hostname)) => {
                session.hostname = Some(hostname.to_string());
                if !username.is_empty() {
                    session.username = Some(username.to_string());
                }
            }
            None => session.hostname = Some(value.clone()),
        }
    }
    Vec::new()
}

fn handle_who(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(target) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(nickname) = line.params.get(5) else {
        return Vec::new();
    };
    let Some(username) = line.params.get(2) else {
        return Vec::new();
    };
    let Some(hostname) = line.params.get(3) else {
        return Vec::new();
    };
    let Some(realname_field) = line.params.get(7) else {
        return Vec::new();
    };
    let realname = realname_field
        .split_once(' ')
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_default();

    let mut emits = vec![Emit::Target(target.clone())];
    let nickname_lower = session.casefold(nickname);
    if nickname_lower == session.nickname_lower {
        session.username = Some(username.clone());
        session.hostname = Some(hostname.clone());
        session.realname = Some(realname.clone());
        emits.push(Emit::Self_);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.username = Some(username.clone());
        user.hostname = Some(hostname.clone());
        user.realname = Some(realname.clone());
        emits.push(Emit::User(user.clone()));
    }
    emits
}

fn handle_whois(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(nickname) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(username) = line.params.get(2) else {
        return Vec::new();
    };
    let Some(hostname) = line.params.get(3) else {
        return Vec::new();
    };
    let Some(realname) = line.params.get(5) else {
        return Vec::new();
    };

    let mut emits = Vec::new();
    let nickname_lower = session.casefold(nickname);
    if nickname_lower == session.nickname_lower {
        session.username = Some(username.clone());
        session.hostname = Some(hostname.clone());
        session.realname = Some(realname.clone());
        emits.push(Emit::Self_);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.username = Some(username.clone());
        user.hostname = Some(hostname.clone());
        user.realname = Some(realname.clone());
        emits.push(Emit::User(user.clone()));
    }
    emits
}

fn handle_chghost(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(username) = line.params.first() else {
        return Vec::new();
    };
    let Some(hostname) = line.params.get(1) else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };

    let mut emits = Vec::new();
    let nickname_lower = session.casefold(&hostmask.nickname);
    if nickname_lower == session.nickname_lower {
        session.username = Some(username.clone());
        session.hostname = Some(hostname.clone());
        emits.push(Emit::SourceSelf);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.username = Some(username.clone());
        user.hostname = Some(hostname.clone());
        emits.push(Emit::SourceUser(user.clone()));
    }
    emits
}

fn handle_setname(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(realname) = line.params.first() else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };

    let mut emits = Vec::new();
    let nickname_lower = session.casefold(&hostmask.nickname);
    if nickname_lower == session.nickname_lower {
        session.realname = Some(realname.clone());
        emits.push(Emit::SourceSelf);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.realname = Some(realname.clone());
        emits.push(Emit::SourceUser(user.clone()));
    }
    emits
}

fn handle_away(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let away = line.params.first().cloned();

    let mut emits = Vec::new();
    let nickname_lower = session.casefold(&hostmask.nickname);
    if nickname_lower == session.nickname_lower {
        session.away = away.clone();
        emits.push(Emit::SourceSelf);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.away = away;
        emits.push(Emit::SourceUser(user.clone()));
    }
    emits
}

fn handle_account(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(raw) = line.params.first() else {
        return Vec::new();
    };
    let Some(hostmask) = &line.hostmask else {
        return Vec::new();
    };
    let account = raw.trim_matches('*').to_string();

    let mut emits = Vec::new();
    let nickname_lower = session.casefold(&hostmask.nickname);
    if nickname_lower == session.nickname_lower {
        session.account = Some(account.clone());
        emits.push(Emit::SourceSelf);
    }
    if let Some(user) = session.users.get_mut(&nickname_lower) {
        user.account = Some(account);
        emits.push(Emit::SourceUser(user.clone()));
    }
    emits
}

fn handle_cap(session: &mut Session, line: &Line) -> Vec<Emit> {
    let Some(subcommand) = line.params.get(1) else {
        return Vec::new();
    };
    let subcommand = subcommand.to_uppercase();
    let multiline = line.params.get(2).map(String::as_str) == Some("*");
    let index = if multiline { 3 } else { 2 };
    let Some(caps_str) = line.params.get(index) else {
        return Vec::new();
    };

    match subcommand.as_str() {
        "LS" => session.caps_state.ls(caps_str, multiline),
        "NEW" => session.caps_state.new_caps(caps_str),
        "DEL" => session.caps_state.del(caps_str),
        "ACK" => session.caps_state.ack(caps_str),
        _ => {}
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(session: &mut Session, raw: &str) -> Vec<Vec<Emit>> {
        let line = Line::parse(raw).expect("valid test line");
        session.parse_tokens(&line)
    }

    #[test]
    fn welcome_then_isupport_sets_identity_and_casemap() {
        let mut session = Session::new("test");
        feed(&mut session, ":irc.example.com 001 nick :hi");
        feed(
            &mut session,
            ":irc.example.com 005 nick CASEMAPPING=ascii :are supported",
        );
        assert_eq!(session.nickname(), "nick");
        assert_eq!(session.isupport().casemapping, crate::casemap::Casemapping::Ascii);
    }

    #[test]
    fn cap_ls_continuation_then_fresh_ls_with_values() {
        let mut session = Session::new("test");
        feed(&mut session, "CAP * LS * :a b");
        feed(&mut session, "CAP * LS :c");
        let caps = session.caps().unwrap();
        assert_eq!(caps.len(), 3);
        assert!(caps.contains_key("a"));
        assert!(caps.contains_key("c"));

        let mut fresh = Session::new("test");
        feed(&mut fresh, "CAP * LS :a b= c=1");
        let caps = fresh.caps().unwrap();
        assert_eq!(caps.get("a"), Some(&None));
        assert_eq!(caps.get("b"), Some(&None));
        assert_eq!(caps.get("c"), Some(&Some("1".to_string())));
    }

    #[test]
    fn join_and_names_populate_roster_with_prefix_modes() {
        let mut session = Session::new("test");
        feed(&mut session, ":me!u@h 001 me :x");
        feed(&mut session, ":me!u@h JOIN #ch");
        feed(&mut session, ":irc.example.com 353 me = #ch :@me +bob");

        assert!(session.has_channel("#ch"));
        let channel_lower = session.casefold("#ch");
        let roster = &session.channel_users()[&channel_lower];
        let me_lower = session.casefold("me");
        let bob_lower = session.casefold("bob");
        assert_eq!(roster[&me_lower].modes, vec!['o']);
        assert_eq!(roster[&bob_lower].modes, vec!['v']);
        assert!(session.has_user("me"));
        assert!(session.has_user("bob"));
    }

    #[test]
    fn self_part_clears_channel_and_empties_both_indices() {
        let mut session = Session::new("test");
        feed(&mut session, ":me!u@h 001 me :x");
        feed(&mut session, ":me!u@h JOIN #ch");
        feed(&mut session, ":irc.example.com 353 me = #ch :@me +bob");
        feed(&mut session, ":me!u@h PART #ch");

        assert!(session.channels().is_empty());
        assert!(session.users().is_empty());
        assert!(session.user_channels().is_empty());
        assert!(session.channel_users().is_empty());
    }

    #[test]
    fn nick_change_rekeys_user_and_local_identity() {
        let mut session = Session::new("test");
        feed(&mut session, ":me!u@h 001 me :x");
        feed(&mut session, ":me!u@h JOIN #ch");
        feed(&mut session, ":me!u@h NICK :me2");

        assert_eq!(session.nickname(), "me2");
        let me2_lower = session.casefold("me2");
        assert!(session.users().contains_key(&me2_lower));
        assert!(session.user_channels().contains_key(&me2_lower));
    }

    #[test]
    fn cap_ack_then_del_leaves_only_surviving_capability() {
        let mut session = Session::new("test");
        feed(&mut session, "CAP * LS :a b");
        feed(&mut session, "CAP * ACK :a b");
        feed(&mut session, "CAP * DEL :a");
        let caps = session.caps().unwrap();
        assert!(!caps.contains_key("a"));
        assert_eq!(session.agreed_caps(), &["b".to_string()]);
    }

    #[test]
    fn mode_on_known_channel_sets_flag_and_prefix_mode() {
        let mut session = Session::new("test");
        feed(&mut session, ":me!u@h 001 me :x");
        feed(&mut session, ":me!u@h JOIN #ch");
        feed(&mut session, ":irc.example.com 353 me = #ch :me bob");
        feed(&mut session, ":op!u@h MODE #ch +ov bob bob");

        let channel_lower = session.casefold("#ch");
        let bob_lower = session.casefold("bob");
        let roster = &session.channel_users()[&channel_lower];
        assert_eq!(roster[&bob_lower].modes, vec!['o', 'v']);
    }

    #[test]
    fn malformed_short_join_is_skipped_without_mutation() {
        let mut session = Session::new("test");
        let line = Line {
            command: "JOIN".to_string(),
            params: Vec::new(),
            hostmask: Some(Hostmask::from_source("me!u@h")),
        };
        let batches = session.parse_tokens(&line);
        assert_eq!(batches, vec![vec![Emit::Command("JOIN".to_string())]]);
        assert!(session.channels().is_empty());
    }
}
