//! Parameter patterns and converters.
//!
//! A [`PatternRegistry`] decides which regex fragment a `{name}`
//! placeholder expands to, and which converter turns the captured text
//! into a [`ParamValue`]. Entries are scanned in registration order and
//! the first matching rule wins.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::ConversionError;

/// Fragment used when no registry entry matches a parameter name.
pub const DEFAULT_FRAGMENT: &str = "[^/]+?";

/// A converted path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Raw captured text.
    Str(String),
    /// Decimal integer.
    Int(i64),
    /// Calendar date.
    Date(NaiveDate),
}

impl ParamValue {
    /// Returns the value if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value if it is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if it is a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

type ConvertFn = dyn Fn(&str) -> Result<ParamValue, ConversionError> + Send + Sync;

/// A named conversion from captured text to a [`ParamValue`].
#[derive(Clone)]
pub struct Converter {
    name: &'static str,
    f: Arc<ConvertFn>,
}

impl Converter {
    /// Wraps a conversion function.
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&str) -> Result<ParamValue, ConversionError> + Send + Sync + 'static,
    {
        Self {
            name,
            f: Arc::new(f),
        }
    }

    /// Decimal integer converter.
    pub fn int() -> Self {
        Self::new("int", |s| {
            s.parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| ConversionError::new(s, format!("invalid integer ({e}).")))
        })
    }

    /// `YYYY-MM-DD` date converter.
    pub fn date() -> Self {
        Self::new("date", |s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| ConversionError::new(s, "invalid date."))
        })
    }

    /// Converter name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Converts captured text.
    pub fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        (self.f)(raw)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.name).finish()
    }
}

/// Selects which parameter names a registry entry applies to.
#[derive(Debug, Clone)]
pub enum ParamRule {
    /// Exact name.
    Name(String),
    /// Regex tested against the name.
    Pattern(Regex),
}

impl ParamRule {
    /// Matches names ending in `suffix`.
    pub fn suffix(suffix: &str) -> Self {
        let re = Regex::new(&format!(r"{}\z", regex::escape(suffix)))
            .expect("escaped suffix is a valid regex");
        Self::Pattern(re)
    }

    /// Tests the rule against a parameter name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Name(n) => n == name,
            Self::Pattern(re) => re.is_match(name),
        }
    }
}

impl PartialEq for ParamRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Name(a), Self::Name(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for ParamRule {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<Regex> for ParamRule {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

#[derive(Debug, Clone)]
struct PatternEntry {
    rule: ParamRule,
    fragment: String,
    converter: Option<Converter>,
}

/// Ordered list of parameter patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    entries: Vec<PatternEntry>,
}

impl PatternRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in patterns:
    ///
    /// | rule | fragment | converter |
    /// |---|---|---|
    /// | `id`, `*_id` | `[0-9]+` | int |
    /// | `ext` | `(?:\.[0-9A-Za-z_]+)?` | none |
    /// | `date`, `*_date` | `[0-9]{4}-[0-9]{2}-[0-9]{2}` | date |
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("id", "[0-9]+", Some(Converter::int()))
            .register(ParamRule::suffix("_id"), "[0-9]+", Some(Converter::int()))
            .register("ext", EXT_FRAGMENT, None)
            .register("date", DATE_FRAGMENT, Some(Converter::date()))
            .register(ParamRule::suffix("_date"), DATE_FRAGMENT, Some(Converter::date()));
        registry
    }

    /// Appends an entry. Earlier entries keep priority.
    pub fn register(
        &mut self,
        rule: impl Into<ParamRule>,
        fragment: impl Into<String>,
        converter: Option<Converter>,
    ) -> &mut Self {
        self.entries.push(PatternEntry {
            rule: rule.into(),
            fragment: fragment.into(),
            converter,
        });
        self
    }

    /// Removes every entry whose rule equals `rule`.
    pub fn unregister(&mut self, rule: &ParamRule) -> &mut Self {
        self.entries.retain(|e| e.rule != *rule);
        self
    }

    /// Finds the fragment and converter for a parameter name.
    pub fn lookup(&self, name: &str) -> (&str, Option<&Converter>) {
        self.entries
            .iter()
            .find(|e| e.rule.matches(name))
            .map_or((DEFAULT_FRAGMENT, None), |e| {
                (e.fragment.as_str(), e.converter.as_ref())
            })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const DATE_FRAGMENT: &str = "[0-9]{4}-[0-9]{2}-[0-9]{2}";
// ASCII word characters only.
const EXT_FRAGMENT: &str = r"(?:\.[0-9A-Za-z_]+)?";
