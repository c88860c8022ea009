//! Tracked entities: [`User`], [`Channel`] and [`ChannelUser`].
//!
//! Entities are identified by their case-folded form;
//! [`Session`](crate::session::Session) owns them in `HashMap`s keyed by
//! that folded string. [`ChannelUser`] does not hold owning references to
//! its channel or user — only their folded keys — so the two entity maps
//! stay the sole owners and no ownership cycle can form.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

/// A tracked IRC user.
///
/// Identity is the folded nickname. A user exists in
/// [`Session::users`](crate::session::Session::users) iff it is visible
/// through at least one joined channel, or is the local user after
/// registration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
    /// Nickname as last seen on the wire.
    pub nickname: String,
    /// Case-folded nickname; the map key.
    pub nickname_lower: String,
    /// Ident/username, learned opportunistically.
    pub username: Option<String>,
    /// Hostname, learned opportunistically.
    pub hostname: Option<String>,
    /// Real name (GECOS), learned opportunistically.
    pub realname: Option<String>,
    /// Services account name, learned opportunistically.
    pub account: Option<String>,
    /// Away message, if currently away.
    pub away: Option<String>,
}

impl User {
    /// Construct a fresh user with only its nickname known.
    pub fn new(nickname: impl Into<String>, nickname_lower: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            nickname_lower: nickname_lower.into(),
            username: None,
            hostname: None,
            realname: None,
            account: None,
            away: None,
        }
    }

    /// Rekey this user to a new nickname (display + folded form together).
    pub fn set_nickname(&mut self, nickname: impl Into<String>, nickname_lower: impl Into<String>) {
        self.nickname = nickname.into();
        self.nickname_lower = nickname_lower.into();
    }
}

/// A value associated with a non-prefix channel mode that takes a parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeValue {
    /// Class A (list) mode: every set parameter accumulates, unordered
    /// removal by value, no deduplication.
    List(Vec<String>),
    /// Class B/C mode currently set with this single parameter.
    Single(String),
}

/// A tracked IRC channel.
///
/// Identity is the folded channel name. Created only by a self `JOIN`;
/// destroyed on self `PART`/`KICK`/`QUIT`/`ERROR`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    /// Channel name as last seen on the wire.
    pub name: String,
    /// Case-folded channel name; the map key.
    pub name_lower: String,
    /// Current topic text, if known.
    pub topic: Option<String>,
    /// Raw setter string (nick or hostmask) for the current topic.
    pub topic_setter: Option<String>,
    /// When the current topic was set.
    pub topic_time: Option<DateTime<Utc>>,
    /// Channel creation time, from `329`.
    pub created: Option<DateTime<Utc>>,
    /// Class-D flag modes currently set (no parameter).
    pub flags: HashSet<char>,
    /// Class A/B/C modes currently set, with their parameter(s).
    pub params: HashMap<char, ModeValue>,
}

impl Channel {
    /// Construct a fresh, mode-less channel record.
    pub fn new(name: impl Into<String>, name_lower: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_lower: name_lower.into(),
            topic: None,
            topic_setter: None,
            topic_time: None,
            created: None,
            flags: HashSet::new(),
            params: HashMap::new(),
        }
    }

    /// Apply a `+`-side mode set. `list` selects class-A (accumulating)
    /// semantics; otherwise this is a plain flag (no `param`) or a single
    /// stored parameter (class B/C).
    pub fn add_mode(&mut self, mode: char, param: Option<String>, list: bool) {
        match param {
            Some(param) if list => match self.params.entry(mode).or_insert_with(|| ModeValue::List(Vec::new())) {
                ModeValue::List(values) => values.push(param),
                slot => *slot = ModeValue::List(vec![param]),
            },
            Some(param) => {
                self.params.insert(mode, ModeValue::Single(param));
            }
            None => {
                self.flags.insert(mode);
            }
        }
    }

    /// Apply a `-`-side mode unset. With a `param`, removes that entry from
    /// a list mode or clears a single-valued one; without a `param`, clears
    /// the flag.
    pub fn remove_mode(&mut self, mode: char, param: Option<String>) {
        match param {
            Some(param) => {
                if let Some(ModeValue::List(values)) = self.params.get_mut(&mode) {
                    values.retain(|v| v != &param);
                } else {
                    self.params.remove(&mode);
                }
            }
            None => {
                self.flags.remove(&mode);
                self.params.remove(&mode);
            }
        }
    }
}

/// A user's membership in a channel: which prefix modes they hold there.
///
/// Holds folded keys rather than owning references, so [`Session`](crate::session::Session)'s
/// `channels`/`users` maps remain the sole owners of the entities
/// themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelUser {
    /// Folded channel key this membership belongs to.
    pub channel: String,
    /// Folded user key this membership belongs to.
    pub user: String,
    /// Prefix-mode chars currently held, in first-seen order, no duplicates.
    pub modes: Vec<char>,
}

impl ChannelUser {
    /// Construct a membership record with no modes.
    pub fn new(channel: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user: user.into(),
            modes: Vec::new(),
        }
    }

    /// Add `mode` if not already held.
    pub fn add_mode(&mut self, mode: char) {
        if !self.modes.contains(&mode) {
            self.modes.push(mode);
        }
    }

    /// Remove `mode` if held.
    pub fn remove_mode(&mut self, mode: char) {
        self.modes.retain(|&m| m != mode);
    }
}
