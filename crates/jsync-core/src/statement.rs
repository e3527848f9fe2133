//! Configuration statements and dump normalization
//!
//! A Junos device speaks in flat statements: `set <path> <value>` and
//! `delete <path>`. This module holds the tagged representation of those
//! lines and the single pure function that turns the raw text of a
//! `show configuration ... | display set` query into an ordered sequence of
//! lines the decoders can consume.
//!
//! ## Dump shape
//!
//! ```text
//! <configuration-output>
//! set description "uplink to core"
//! set ether-options 802.3ad ae1
//! </configuration-output>
//! ```
//!
//! A query that matched nothing returns exactly [`EMPTY_OUTPUT`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output returned by the device when a configuration query matched nothing
pub const EMPTY_OUTPUT: &str = "<configuration-output>\n</configuration-output>";

/// Opening framing marker of a configuration dump
pub const OUTPUT_OPEN: &str = "<configuration-output>";

/// Closing framing marker of a configuration dump
pub const OUTPUT_CLOSE: &str = "</configuration-output>";

const SET_LINE_START: &str = "set ";
const DELETE_LINE_START: &str = "delete ";

/// Characters that force a value to be quoted
const RESERVED_CHARS: &[char] = &['"', ';', '{', '}', '#', '[', ']', '\''];

/// Statement action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// `set <path>`
    Set,
    /// `delete <path>`
    Delete,
}

impl Action {
    /// Keyword used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Set => "set",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `set`/`delete` statement
///
/// `path` holds everything after the action keyword, value included, with
/// values already quoted where the device requires it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigStatement {
    /// Statement action
    pub action: Action,
    /// Configuration path (and value) the action applies to
    pub path: String,
}

impl ConfigStatement {
    /// Create a `set` statement
    pub fn set(path: impl Into<String>) -> Self {
        Self {
            action: Action::Set,
            path: path.into(),
        }
    }

    /// Create a `delete` statement
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            action: Action::Delete,
            path: path.into(),
        }
    }

    /// Parse a single line; `None` when it is not a `set`/`delete` statement
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(path) = line.strip_prefix(SET_LINE_START) {
            Some(Self::set(path.trim()))
        } else if let Some(path) = line.strip_prefix(DELETE_LINE_START) {
            Some(Self::delete(path.trim()))
        } else {
            None
        }
    }

    /// Whether this is a `set` statement
    pub fn is_set(&self) -> bool {
        self.action == Action::Set
    }

    /// Last whitespace-separated word of the path
    pub fn last_word(&self) -> Option<&str> {
        self.path.split_whitespace().last()
    }
}

impl fmt::Display for ConfigStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.action)
        } else {
            write!(f, "{} {}", self.action, self.path)
        }
    }
}

/// One normalized line of a configuration dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLine {
    /// A recognized `set`/`delete` statement
    Statement(ConfigStatement),
    /// Any other line, forwarded untouched
    Verbatim(String),
}

impl ConfigLine {
    /// Classify a single (non-empty) line
    pub fn parse(line: &str) -> Self {
        match ConfigStatement::parse(line) {
            Some(statement) => ConfigLine::Statement(statement),
            None => ConfigLine::Verbatim(line.trim().to_string()),
        }
    }

    /// The statement, if this line is one
    pub fn as_statement(&self) -> Option<&ConfigStatement> {
        match self {
            ConfigLine::Statement(statement) => Some(statement),
            ConfigLine::Verbatim(_) => None,
        }
    }

    /// Path of a `set` statement, `None` for anything else
    pub fn set_body(&self) -> Option<&str> {
        self.as_statement()
            .filter(|s| s.is_set())
            .map(|s| s.path.as_str())
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLine::Statement(statement) => statement.fmt(f),
            ConfigLine::Verbatim(text) => f.write_str(text),
        }
    }
}

/// Builder for statements sharing a common path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPrefix(String);

impl StatementPrefix {
    /// Create a prefix (e.g. `interfaces ge-0/0/1`)
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The prefix itself
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Extend the prefix with more path words
    pub fn extend(&self, words: &str) -> Self {
        Self(format!("{} {}", self.0, words))
    }

    /// `set <prefix>`
    pub fn set_bare(&self) -> ConfigStatement {
        ConfigStatement::set(self.0.clone())
    }

    /// `set <prefix> <field>` for presence flags
    pub fn set_flag(&self, field: &str) -> ConfigStatement {
        ConfigStatement::set(format!("{} {}", self.0, field))
    }

    /// `set <prefix> <field> <value>`, value quoted when needed
    pub fn set_value(&self, field: &str, value: impl fmt::Display) -> ConfigStatement {
        let value = value.to_string();
        ConfigStatement::set(format!("{} {} {}", self.0, field, quote_value(&value)))
    }

    /// `delete <prefix> <field>`
    pub fn delete(&self, field: &str) -> ConfigStatement {
        ConfigStatement::delete(format!("{} {}", self.0, field))
    }

    /// `delete <prefix>`
    pub fn delete_all(&self) -> ConfigStatement {
        ConfigStatement::delete(self.0.clone())
    }
}

/// Quote a value when it contains whitespace or reserved characters
pub fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.chars().any(|c| c.is_whitespace())
        || value.contains(RESERVED_CHARS);
    if needs_quotes {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}

/// Reverse [`quote_value`]; unquoted input is returned trimmed
pub fn unquote(value: &str) -> String {
    let value = value.trim();
    match value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => value.to_string(),
    }
}

/// Split a statement path into words, honouring double quotes
///
/// Quotes are removed from the returned words.
pub fn tokenize(path: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_quotes = false;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_word = true;
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }

    words
}

/// Join words back into a statement path, quoting where needed
pub fn render_tokens(words: &[String]) -> String {
    words
        .iter()
        .map(|w| quote_value(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `show configuration <path> | display set [relative]`
pub fn show_configuration_query(path: &str, relative: bool) -> String {
    let path = path.trim();
    let display = if relative {
        "display set relative"
    } else {
        "display set"
    };
    if path.is_empty() {
        format!("show configuration | {}", display)
    } else {
        format!("show configuration {} | {}", path, display)
    }
}

/// Inventory lookup for a single interface
pub fn show_interface_query(name: &str) -> String {
    format!("show interfaces {} terse", name)
}

/// Drop rule applied to statement paths during normalization
#[derive(Debug, Clone)]
struct DropRule {
    prefix: String,
    keep_marker: String,
}

impl DropRule {
    fn drops(&self, path: &str) -> bool {
        path.starts_with(&self.prefix) && !path.contains(&self.keep_marker)
    }
}

/// Turns raw dump text into normalized lines
///
/// Filtering is declared by the caller per entity. Normalization never
/// fails: lines it does not understand are kept as [`ConfigLine::Verbatim`].
///
/// # Example
///
/// ```
/// use jsync_core::statement::{ConfigLine, Normalizer};
///
/// let normalizer = Normalizer::new().drop_prefix_unless("unit ", "ethernet-switching");
/// let lines = normalizer.normalize(
///     "<configuration-output>\nset description NC\nset unit 0 family inet\n</configuration-output>\n",
/// );
/// assert_eq!(lines.len(), 1);
/// assert_eq!(lines[0].set_body(), Some("description NC"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    drop_rules: Vec<DropRule>,
}

impl Normalizer {
    /// Create a normalizer with no drop rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop statements whose path starts with `prefix` unless they also
    /// contain `keep_marker`
    pub fn drop_prefix_unless(
        mut self,
        prefix: impl Into<String>,
        keep_marker: impl Into<String>,
    ) -> Self {
        self.drop_rules.push(DropRule {
            prefix: prefix.into(),
            keep_marker: keep_marker.into(),
        });
        self
    }

    /// Normalize a raw dump
    pub fn normalize(&self, raw: &str) -> Vec<ConfigLine> {
        if raw.trim() == EMPTY_OUTPUT {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for item in raw.lines() {
            if item.contains(OUTPUT_OPEN) {
                continue;
            }
            if item.contains(OUTPUT_CLOSE) {
                break;
            }
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            let line = ConfigLine::parse(item);
            if let ConfigLine::Statement(statement) = &line {
                if self.drop_rules.iter().any(|r| r.drops(&statement.path)) {
                    continue;
                }
            }
            lines.push(line);
        }

        lines
    }
}
