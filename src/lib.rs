//! # slirc-state
//!
//! A passive, deterministic IRC client-side session state tracker: it
//! consumes a byte stream of server-originated protocol lines and
//! maintains a coherent in-memory model of the connected server, the
//! local user's identity, the channels the local user has joined, the
//! users visible through those channels, and the negotiated capability
//! set. For each line it also produces a structured sequence of
//! [`emit::Emit`] records describing what the line meant in terms of the
//! state model, for any outer client UI, bot, or bouncer to react to
//! server activity without re-parsing.
//!
//! This crate is sans-IO: it does not open sockets, does not construct
//! outbound commands, and does not log its own business logic. It
//! consumes already-tokenized [`line::Line`]s (or raw bytes through the
//! bundled [`line::StatefulDecoder`]) and hands back state plus emits.
//!
//! ## Quick start
//!
//! ```rust
//! use slirc_state::Session;
//!
//! let mut session = Session::new("example-net");
//! session.recv(b":irc.example.com 001 nick :Welcome\r\n").unwrap();
//! assert_eq!(session.nickname(), "nick");
//!
//! session.recv(b":nick!user@host JOIN #rust\r\n").unwrap();
//! assert!(session.has_channel("#rust"));
//! ```

#![deny(clippy::all)]

pub mod caps;
pub mod casemap;
pub mod emit;
pub mod entity;
pub mod error;
pub mod isupport;
pub mod line;
pub mod session;

pub use self::caps::CapState;
pub use self::casemap::{casefold, casefold_eq, Casemapping};
pub use self::emit::Emit;
pub use self::entity::{Channel, ChannelUser, ModeValue, User};
pub use self::error::{LineParseError, Result, TrackerError};
pub use self::isupport::{ChanModes, ISupport, Prefix};
pub use self::line::{Hostmask, Line, StatefulDecoder};
pub use self::session::Session;
