//! The [`Emit`] sequence a handled line produces.
//!
//! Every handled line yields a flat, ordered `Vec<Emit>` describing what the
//! line meant in terms of the state model. Order within a single handler is
//! fixed and documented on the handler itself in [`crate::session`].

use crate::entity::{Channel, User};

/// One element of a handled line's emission sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Emit {
    /// Always first for any command that produced output: the command word.
    Command(String),
    /// The line refers to the local user (used by response lines such as
    /// `WHO`/`WHOIS`, which are not source-attributed).
    Self_,
    /// The line's prefix source is the local user.
    SourceSelf,
    /// The line's prefix source resolves to this user.
    SourceUser(User),
    /// A user mentioned by the line, not necessarily its source.
    User(User),
    /// The channel the line is about.
    Channel(Channel),
    /// The raw target string as received, before stripping `STATUSMSG` prefixes.
    Target(String),
    /// The (possibly status-stripped) target resolves to the local user.
    TargetSelf,
    /// Carried human-readable text (message body, part/kick reason, MOTD line).
    Text(String),
}
