//! Raw line tokenizing and byte-stream decoding: turning bytes off the wire
//! into [`Line`]s the session state machine can dispatch on. Kept thin and
//! self-contained, with owned fields throughout — no zero-copy lifetimes,
//! no message tags retained, no outbound serialization beyond [`Line::to_raw`]
//! for round-tripping.

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::LineParseError;

/// A hostmask (`nick[!user][@host]`), decomposed from a line's prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hostmask {
    /// Nickname portion; always present.
    pub nickname: String,
    /// Username/ident portion, if the source included a `!user`.
    pub username: Option<String>,
    /// Hostname portion, if the source included an `@host`.
    pub hostname: Option<String>,
}

impl Hostmask {
    /// Decompose a raw prefix/source string into its nickname, username and
    /// hostname parts. Missing parts are simply absent; this never fails —
    /// a bare string with no `!`/`@` is treated as a nickname-only mask.
    pub fn from_source(source: &str) -> Self {
        match source.split_once('!') {
            Some((nick, rest)) => {
                let (username, hostname) = match rest.split_once('@') {
                    Some((user, host)) => (Some(user.to_string()), Some(host.to_string())),
                    None => (Some(rest.to_string()), None),
                };
                Self {
                    nickname: nick.to_string(),
                    username,
                    hostname,
                }
            }
            // A bare "nick@host" (no "!") is unusual but still decomposes.
            None => match source.split_once('@') {
                Some((nick, host)) => Self {
                    nickname: nick.to_string(),
                    username: None,
                    hostname: Some(host.to_string()),
                },
                None => Self {
                    nickname: source.to_string(),
                    username: None,
                    hostname: None,
                },
            },
        }
    }
}

impl std::fmt::Display for Hostmask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.nickname)?;
        if let Some(username) = &self.username {
            write!(f, "!{username}")?;
        }
        if let Some(hostname) = &self.hostname {
            write!(f, "@{hostname}")?;
        }
        Ok(())
    }
}

/// One tokenized server line: command word, ordered parameters, and the
/// decomposed prefix source (if the line had one).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Line {
    /// Command word (e.g. `"PRIVMSG"`, `"001"`), as received — not uppercased.
    pub command: String,
    /// Ordered parameter list, including the trailing (`:`-prefixed) one.
    pub params: Vec<String>,
    /// The line's prefix source, decomposed, if present.
    pub hostmask: Option<Hostmask>,
}

impl Line {
    /// Render this line back to its wire form (without a trailing CRLF).
    pub fn to_raw(&self) -> String {
        let mut out = String::new();
        if let Some(hostmask) = &self.hostmask {
            out.push(':');
            out.push_str(&hostmask.to_string());
            out.push(' ');
        }
        out.push_str(&self.command);
        for (i, param) in self.params.iter().enumerate() {
            out.push(' ');
            let is_last = i == self.params.len() - 1;
            if is_last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                out.push(':');
            }
            out.push_str(param);
        }
        out
    }

    /// Parse one raw, already-unframed line (no trailing CR/LF) into a [`Line`].
    pub fn parse(raw: &str) -> Result<Self, LineParseError> {
        let (rest, (_tags, prefix, command)) =
            parse_head(raw).map_err(|_| LineParseError::EmptyLine)?;
        if command.is_empty() {
            return Err(LineParseError::EmptyLine);
        }
        let params = parse_params(rest);
        Ok(Line {
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            hostmask: prefix.map(Hostmask::from_source),
        })
    }
}

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric())(input)
}

fn parse_head(input: &str) -> IResult<&str, (Option<&str>, Option<&str>, &str)> {
    let (input, tags) = opt(parse_tags)(input)?;
    let (input, _) = space0(input)?;
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;
    let (input, command) = parse_command(input)?;
    Ok((input, (tags, prefix, command)))
}

fn parse_params(input: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut rest = input;

    while let Some(b' ') = rest.as_bytes().first().copied() {
        while rest.as_bytes().first() == Some(&b' ') {
            rest = &rest[1..];
        }
        if rest.is_empty() {
            break;
        }
        if let Some(b':') = rest.as_bytes().first().copied() {
            params.push(&rest[1..]);
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

/// Segments an incoming byte stream into whole [`Line`]s, buffering partial
/// reads across calls (mirrors `irctokens.StatefulDecoder` from the
/// original implementation this spec was distilled from).
#[derive(Clone, Debug, Default)]
pub struct StatefulDecoder {
    buffer: Vec<u8>,
    closed: bool,
}

impl StatefulDecoder {
    /// Construct a fresh decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes, returning the whole lines now available.
    ///
    /// Returns `None` once the decoder has been closed (mirrors a graceful
    /// stream end); further calls after that also return `None`.
    pub fn push(&mut self, data: &[u8]) -> Option<Vec<Line>> {
        if self.closed {
            return None;
        }
        if data.is_empty() {
            self.closed = true;
            return None;
        }
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(line) = Line::parse(trimmed) {
                lines.push(line);
            }
        }
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostmask_decomposes_full_source() {
        let hm = Hostmask::from_source("nick!user@host");
        assert_eq!(hm.nickname, "nick");
        assert_eq!(hm.username.as_deref(), Some("user"));
        assert_eq!(hm.hostname.as_deref(), Some("host"));
    }

    #[test]
    fn hostmask_decomposes_nickname_only() {
        let hm = Hostmask::from_source("server.example.com");
        assert_eq!(hm.nickname, "server.example.com");
        assert!(hm.username.is_none());
        assert!(hm.hostname.is_none());
    }

    #[test]
    fn hostmask_displays_as_wire_form() {
        let hm = Hostmask::from_source("nick!user@host");
        assert_eq!(hm.to_string(), "nick!user@host");
    }

    #[test]
    fn line_parses_prefix_command_and_params() {
        let line = Line::parse(":nick!user@host PRIVMSG #chan :Hello, world!").unwrap();
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#chan", "Hello, world!"]);
        assert_eq!(line.hostmask.unwrap().nickname, "nick");
    }

    #[test]
    fn line_parses_numeric_with_no_prefix() {
        let line = Line::parse("PING :server").unwrap();
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, vec!["server"]);
        assert!(line.hostmask.is_none());
    }

    #[test]
    fn line_rejects_empty_command() {
        assert!(Line::parse("").is_err());
    }

    #[test]
    fn decoder_buffers_partial_reads() {
        let mut decoder = StatefulDecoder::new();
        assert_eq!(decoder.push(b"PING :ser").unwrap().len(), 0);
        let lines = decoder.push(b"ver\r\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].command, "PING");
    }

    #[test]
    fn decoder_splits_multiple_lines_in_one_push() {
        let mut decoder = StatefulDecoder::new();
        let lines = decoder.push(b"PING :a\r\nPING :b\r\n").unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn decoder_signals_close_with_empty_push() {
        let mut decoder = StatefulDecoder::new();
        assert!(decoder.push(b"").is_none());
        assert!(decoder.push(b"PING :x\r\n").is_none());
    }
}
