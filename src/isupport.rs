//! Accumulating view of `RPL_ISUPPORT` (`005`) tokens.
//!
//! An IRC session usually receives its `ISUPPORT` set across several
//! numerics and must keep whatever it has already learned: [`ISupport`] is
//! an owned struct that [`ISupport::apply`] updates incrementally, token by
//! token, with later values for the same key winning.

use std::collections::HashSet;

use crate::casemap::Casemapping;

/// `PREFIX=(modes)sigils` — parallel mode-char/sigil strings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Prefix {
    /// Mode characters, in the order the server listed them (e.g. `o`, `v`).
    pub modes: Vec<char>,
    /// Sigils, parallel to `modes` (e.g. `@`, `+`).
    pub sigils: Vec<char>,
}

impl Default for Prefix {
    fn default() -> Self {
        Self {
            modes: vec!['o', 'v'],
            sigils: vec!['@', '+'],
        }
    }
}

impl Prefix {
    fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('(')?;
        let (modes, sigils) = s.split_once(')')?;
        if modes.len() != sigils.len() {
            return None;
        }
        Some(Self {
            modes: modes.chars().collect(),
            sigils: sigils.chars().collect(),
        })
    }

    /// The mode char a sigil decodes to, if any.
    pub fn mode_from_sigil(&self, sigil: char) -> Option<char> {
        self.sigils
            .iter()
            .position(|&s| s == sigil)
            .map(|i| self.modes[i])
    }

    /// `true` if `mode` is one of the prefix (per-membership) modes.
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }
}

/// `CHANMODES=A,B,C,D` — the four parameter-taking classes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChanModes {
    /// Class A: list-type, always takes a parameter (set or unset).
    pub list_modes: HashSet<char>,
    /// Class B: always takes a parameter (set or unset).
    pub setting_b_modes: HashSet<char>,
    /// Class C: takes a parameter only when being set.
    pub setting_c_modes: HashSet<char>,
    /// Class D: never takes a parameter.
    pub d_modes: HashSet<char>,
}

impl ChanModes {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',');
        let a = parts.next()?;
        let b = parts.next()?;
        let c = parts.next()?;
        let d = parts.next()?;
        Some(Self {
            list_modes: a.chars().collect(),
            setting_b_modes: b.chars().collect(),
            setting_c_modes: c.chars().collect(),
            d_modes: d.chars().collect(),
        })
    }
}

/// Accumulated server capability set, as conveyed by one or more `005` lines.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ISupport {
    /// Selected casemapping; default `rfc1459` until `CASEMAPPING=` says otherwise.
    pub casemapping: Casemapping,
    /// Valid channel-name first characters; default `#&`.
    pub chantypes: String,
    /// Prefixes accepted before a channel name in a message target; default empty.
    pub statusmsg: String,
    /// Mode &harr; sigil mapping.
    pub prefix: Prefix,
    /// `CHANMODES` parameter classes.
    pub chanmodes: ChanModes,
}

impl Default for ISupport {
    fn default() -> Self {
        Self {
            casemapping: Casemapping::default(),
            chantypes: "#&".to_string(),
            statusmsg: String::new(),
            prefix: Prefix::default(),
            chanmodes: ChanModes::default(),
        }
    }
}

impl ISupport {
    /// Create a fresh `ISupport` at IRC defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `005` line's tokens (already stripped of the leading target
    /// nickname and the trailing human-readable text) into the accumulated
    /// state. Unknown keys are ignored; recognized keys overwrite whatever
    /// was previously stored.
    pub fn apply<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (token, None),
            };
            self.apply_one(key, value);
        }
    }

    fn apply_one(&mut self, key: &str, value: Option<&str>) {
        match key {
            "CASEMAPPING" => {
                if let Some(v) = value {
                    self.casemapping = Casemapping::parse(v);
                }
            }
            "CHANTYPES" => {
                if let Some(v) = value {
                    self.chantypes = v.to_string();
                }
            }
            "STATUSMSG" => {
                self.statusmsg = value.unwrap_or("").to_string();
            }
            "PREFIX" => {
                if let Some(prefix) = value.and_then(Prefix::parse) {
                    self.prefix = prefix;
                }
            }
            "CHANMODES" => {
                if let Some(chanmodes) = value.and_then(ChanModes::parse) {
                    self.chanmodes = chanmodes;
                }
            }
            _ => {}
        }
    }
}
