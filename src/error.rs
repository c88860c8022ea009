//! Error types for session tracking and line decoding.

use thiserror::Error;

/// Convenience alias for `Result`s returning [`TrackerError`].
pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::session::Session::recv`].
///
/// This is the only error this crate raises across its public surface:
/// malformed or short lines are dropped silently by the handler that would
/// have consumed them, never turned into an `Err`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    /// The byte decoder signalled graceful stream end.
    ///
    /// All state accumulated so far remains inspectable; no further lines
    /// can be produced from this session's decoder.
    #[error("disconnected")]
    Disconnected,
}

/// A single raw line could not be tokenized.
///
/// [`crate::line::StatefulDecoder`] never surfaces this: a line that fails
/// to parse is dropped from the decoded batch rather than propagated, so
/// one malformed line from the wire cannot take down the whole read. It is
/// exposed for callers parsing a single line directly via
/// [`crate::line::Line::parse`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineParseError {
    /// The line had no command word at all.
    #[error("line has no command")]
    EmptyLine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_displays() {
        assert_eq!(TrackerError::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn empty_line_displays() {
        assert_eq!(LineParseError::EmptyLine.to_string(), "line has no command");
    }
}
