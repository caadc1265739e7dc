//! The diff key: `(filepath, L1, L2, L3, L4)`, the position-independent
//! identifier for a leaf used throughout C3–C7.
//!
//! Each `Lᵢ` is either a structural `SECTION=KEY` pair or one of the fixed
//! markers (`#SINGLE#`, `#PARAM#`, `#PARAMS#`, `#CONTENTS#`, `#OVERWRITE#`,
//! `#NEW_METADATA#`). Unused levels are empty.

use std::fmt;

/// Default separator between diff key fields: ASCII Record Separator.
pub const DEFAULT_SEPARATOR: char = '\u{1E}';

/// Maximum nesting depth below the root section (L1..L4).
pub const MAX_LEVELS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LevelKey {
    /// Level unused (path shorter than 4 levels).
    Empty,
    /// `SECTION=VALUE` — a named, addressable entry.
    Structural { section: String, value: String },
    /// `#SINGLE#` — an Empty-section or whole-block identity marker.
    Single,
    /// `#PARAM#` — a Params-section primitive line.
    Param,
    /// `#PARAMS#` — the flat parameter region of a complex block.
    Params,
    /// `#CONTENTS#` — the whole raw text of a complex block.
    Contents,
    /// `#OVERWRITE#` — whole-file MD5 comparison (L1 only).
    Overwrite,
    /// `#NEW_METADATA#` — brand new artifact (L1 only).
    NewMetadata,
}

impl LevelKey {
    pub fn is_empty(&self) -> bool {
        matches!(self, LevelKey::Empty)
    }

    pub fn structural(section: impl Into<String>, value: impl Into<String>) -> Self {
        LevelKey::Structural {
            section: section.into(),
            value: value.into(),
        }
    }

    /// Render the canonical token for this level, as it appears in a diff
    /// key string and in the `L1..L4 Key` CSV columns.
    pub fn token(&self) -> String {
        match self {
            LevelKey::Empty => String::new(),
            LevelKey::Structural { section, value } => format!("{section}={value}"),
            LevelKey::Single => "#SINGLE#".to_string(),
            LevelKey::Param => "#PARAM#".to_string(),
            LevelKey::Params => "#PARAMS#".to_string(),
            LevelKey::Contents => "#CONTENTS#".to_string(),
            LevelKey::Overwrite => "#OVERWRITE#".to_string(),
            LevelKey::NewMetadata => "#NEW_METADATA#".to_string(),
        }
    }

    /// Parse a level token, accepting both the fully-qualified `SNAME=SVALUE`
    /// form and the bare `SVALUE` form used by the merger at leaf paths
    /// Both a literal marker and its fallback-hash form resolve the same way.
    pub fn parse(token: &str) -> Self {
        match token {
            "" => LevelKey::Empty,
            "#SINGLE#" => LevelKey::Single,
            "#PARAM#" => LevelKey::Param,
            "#PARAMS#" => LevelKey::Params,
            "#CONTENTS#" => LevelKey::Contents,
            "#OVERWRITE#" => LevelKey::Overwrite,
            "#NEW_METADATA#" => LevelKey::NewMetadata,
            other => match other.split_once('=') {
                Some((section, value)) => LevelKey::structural(section, value),
                None => LevelKey::structural("", other),
            },
        }
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// A fallback key is exactly 32 lowercase hex characters with no spaces.
/// Implementations must detect this with this exact rule to preserve the
/// insert/ordering behavior that callers may rely on.
pub fn is_fallback_key(key: &str) -> bool {
    key.len() == 32
        && !key.contains(' ')
        && key.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffKey {
    pub filepath: String,
    pub levels: [LevelKey; MAX_LEVELS],
}

impl DiffKey {
    pub fn new(filepath: impl Into<String>) -> Self {
        DiffKey {
            filepath: filepath.into(),
            levels: [
                LevelKey::Empty,
                LevelKey::Empty,
                LevelKey::Empty,
                LevelKey::Empty,
            ],
        }
    }

    pub fn with_level(mut self, index: usize, key: LevelKey) -> Self {
        self.levels[index] = key;
        self
    }

    pub fn l1(&self) -> &LevelKey {
        &self.levels[0]
    }

    /// True if any level carries the given marker — used by the differ to
    /// detect `#CONTENTS#` anywhere in the path.
    pub fn contains(&self, marker: &LevelKey) -> bool {
        self.levels.iter().any(|l| l == marker)
    }

    /// The deepest non-empty level index, or `None` if the path is empty.
    pub fn depth(&self) -> Option<usize> {
        self.levels.iter().rposition(|l| !l.is_empty())
    }

    pub fn to_string_with_sep(&self, sep: char) -> String {
        let mut parts = Vec::with_capacity(5);
        parts.push(self.filepath.clone());
        for level in &self.levels {
            parts.push(level.token());
        }
        parts.join(&sep.to_string())
    }

    pub fn from_str_with_sep(s: &str, sep: char) -> Self {
        let mut parts = s.split(sep);
        let filepath = parts.next().unwrap_or_default().to_string();
        let mut key = DiffKey::new(filepath);
        for i in 0..MAX_LEVELS {
            let token = parts.next().unwrap_or_default();
            key.levels[i] = LevelKey::parse(token);
        }
        key
    }
}

impl fmt::Display for DiffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_sep(DEFAULT_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let key = DiffKey::new("CustomObject/Account.object")
            .with_level(0, LevelKey::structural("fields", "Foo__c"))
            .with_level(1, LevelKey::Contents);
        let s = key.to_string_with_sep(DEFAULT_SEPARATOR);
        let back = DiffKey::from_str_with_sep(&s, DEFAULT_SEPARATOR);
        assert_eq!(key, back);
    }

    #[test]
    fn fallback_key_detection() {
        assert!(is_fallback_key("0123456789abcdef0123456789abcdef"));
        assert!(!is_fallback_key("0123456789ABCDEF0123456789abcdef"));
        assert!(!is_fallback_key("fields=Foo__c"));
        assert!(!is_fallback_key("0123456789abcdef0123456789abcde")); // 31 chars
    }

    #[test]
    fn bare_value_parses_as_structural_with_empty_section() {
        let lk = LevelKey::parse("Foo__c");
        assert_eq!(
            lk,
            LevelKey::Structural {
                section: String::new(),
                value: "Foo__c".to_string()
            }
        );
    }
}
