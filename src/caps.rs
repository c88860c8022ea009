//! IRCv3 capability negotiation state (`CAP LS`/`NEW`/`DEL`/`ACK`).
//!
//! This tracker treats capability names as opaque strings — exactly what a
//! passive observer of `CAP` lines can do, since it never requests
//! capabilities itself and has no outbound command construction of its own.

use std::collections::HashMap;

/// Capability negotiation state held by [`crate::session::Session`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapState {
    /// Buffer accumulating a multi-line `CAP * LS *`.
    temp_caps: HashMap<String, Option<String>>,
    /// Advertised capability set; `None` until the first complete `LS`.
    pub caps: Option<HashMap<String, Option<String>>>,
    /// Capabilities currently acknowledged, in `ACK` order.
    pub agreed_caps: Vec<String>,
}

/// Parse a space-separated `key[=value]` token list, as found in the last
/// parameter of a `CAP` line, preserving wire order. An empty value
/// (`key=`) is stored as `None`, same as a bare `key` with no `=` at all.
fn parse_tokens(s: &str) -> Vec<(String, Option<String>)> {
    let mut tokens = Vec::new();
    for cap in s.split(' ').filter(|c| !c.is_empty()) {
        let (key, value) = match cap.split_once('=') {
            Some((k, v)) if !v.is_empty() => (k.to_string(), Some(v.to_string())),
            Some((k, _)) => (k.to_string(), None),
            None => (cap.to_string(), None),
        };
        tokens.push((key, value));
    }
    tokens
}

impl CapState {
    /// Handle one `CAP LS` line. `multiline` is `true` when this line's
    /// second parameter was `*` (more `LS` lines to come).
    pub fn ls(&mut self, caps_str: &str, multiline: bool) {
        self.temp_caps.extend(parse_tokens(caps_str));
        if !multiline {
            self.caps = Some(std::mem::take(&mut self.temp_caps));
        }
    }

    /// Handle one `CAP NEW` line. No-op while `caps` is still `None`.
    pub fn new_caps(&mut self, caps_str: &str) {
        if let Some(caps) = self.caps.as_mut() {
            caps.extend(parse_tokens(caps_str));
        }
    }

    /// Handle one `CAP DEL` line. No-op while `caps` is still `None`.
    /// Order-insensitive: every listed key is simply removed.
    pub fn del(&mut self, caps_str: &str) {
        if let Some(caps) = self.caps.as_mut() {
            for (key, _) in parse_tokens(caps_str) {
                if caps.remove(&key).is_some() {
                    self.agreed_caps.retain(|k| k != &key);
                }
            }
        }
    }

    /// Handle one `CAP ACK` line. Tokens are applied in wire order so that
    /// `agreed_caps` reflects `ACK` order, not `HashMap` iteration order.
    pub fn ack(&mut self, caps_str: &str) {
        for (key, _) in parse_tokens(caps_str) {
            if let Some(removed) = key.strip_prefix('-') {
                self.agreed_caps.retain(|k| k != removed);
            } else if !self.agreed_caps.contains(&key)
                && self.caps.as_ref().is_some_and(|c| c.contains_key(&key))
            {
                self.agreed_caps.push(key);
            }
        }
    }
}
