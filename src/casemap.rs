//! IRC identifier case-folding.
//!
//! Folding depends on the casemapping the server advertises via
//! `ISUPPORT CASEMAPPING=`; see [`crate::isupport::ISupport`]. Default is
//! [`Casemapping::Rfc1459`] until a `005` says otherwise.

/// Casemapping scheme selected by `ISUPPORT CASEMAPPING=`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Casemapping {
    /// ASCII plus `{}|^` &harr; `[]\~`.
    #[default]
    Rfc1459,
    /// `rfc1459` without the `^` &harr; `~` mapping.
    Rfc1459Strict,
    /// Plain ASCII `A-Z` &harr; `a-z` only.
    Ascii,
}

impl Casemapping {
    /// Parse the value of an `ISUPPORT CASEMAPPING=` token.
    ///
    /// Unrecognized values are treated as `rfc1459`, the IRC default.
    pub fn parse(s: &str) -> Self {
        match s {
            "ascii" => Self::Ascii,
            "rfc1459-strict" => Self::Rfc1459Strict,
            _ => Self::Rfc1459,
        }
    }
}

/// Fold `s` to its canonical comparison form under `mapping`.
pub fn casefold(mapping: Casemapping, s: &str) -> String {
    s.chars().map(|c| fold_char(mapping, c)).collect()
}

fn fold_char(mapping: Casemapping, c: char) -> char {
    match c {
        'A'..='Z' => c.to_ascii_lowercase(),
        '{' if mapping != Casemapping::Ascii => '[',
        '}' if mapping != Casemapping::Ascii => ']',
        '|' if mapping != Casemapping::Ascii => '\\',
        '^' if mapping == Casemapping::Rfc1459 => '~',
        _ => c,
    }
}

/// `true` if `a` and `b` fold to the same value under `mapping`.
pub fn casefold_eq(mapping: Casemapping, a: &str, b: &str) -> bool {
    casefold(mapping, a) == casefold(mapping, b)
}
