//! Path template compilation.
//!
//! Template syntax:
//! - `{name}` - named parameter, fragment resolved via the [`PatternRegistry`]
//! - `{name:pattern}` - named parameter with an explicit fragment
//! - `{:pattern}` - unnamed, matched but not extracted
//!
//! An explicit pattern may itself contain `{...}` once, so `{year:\d{4}}`
//! is accepted. Everything outside placeholders matches literally.
//!
//! # Example
//!
//! ```
//! use trellis_router::{template, PatternRegistry};
//!
//! let registry = PatternRegistry::with_builtins();
//! let compiled = template::compile("/books/{id}", r"\A", r"\z", true, &registry).unwrap();
//! assert_eq!(compiled.fragment, r"\A/books/([0-9]+)\z");
//! assert_eq!(compiled.param_names, vec!["id".to_string()]);
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, RouterError};
use crate::params::{Converter, PatternRegistry};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.*?)\{(\w*)(?::([^{}]*?(?:\{[^{}]*?\}[^{}]*?)*))?\}")
        .expect("token regex is valid")
});

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{.*?\}").expect("placeholder regex is valid"));

/// A template compiled into a regex fragment.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// Regex source, including the requested anchors.
    pub fragment: String,
    /// Names of the named parameters, in template order.
    pub param_names: Vec<String>,
    /// One entry per name in `param_names`.
    pub converters: Vec<Option<Converter>>,
    /// Literal text after the last placeholder.
    pub remainder: String,
}

struct Token<'t> {
    literal: &'t str,
    name: &'t str,
    pattern: Option<&'t str>,
}

/// Splits a template into placeholder tokens and the trailing literal.
fn tokenize(template: &str) -> Result<(Vec<Token<'_>>, &str)> {
    let mut tokens = Vec::new();
    let mut end = 0;
    for caps in TOKEN_RE.captures_iter(template) {
        let literal = caps.get(1).map_or("", |m| m.as_str());
        check_literal(template, literal)?;
        tokens.push(Token {
            literal,
            name: caps.get(2).map_or("", |m| m.as_str()),
            pattern: caps.get(3).map(|m| m.as_str()).filter(|p| !p.is_empty()),
        });
        end = caps.get(0).map_or(end, |m| m.end());
    }
    let rest = &template[end..];
    check_literal(template, rest)?;
    Ok((tokens, rest))
}

fn check_literal(template: &str, literal: &str) -> Result<()> {
    if literal.contains(['{', '}']) {
        return Err(RouterError::InvalidTemplate {
            template: template.to_string(),
            reason: format!("unexpected brace in '{literal}'"),
        });
    }
    Ok(())
}

/// Compiles `template` into a regex fragment framed by `start` and `end`.
///
/// With `grouping`, every named parameter becomes a capturing group so
/// values can be extracted by position. Fragments containing `|` are
/// wrapped in a non-capturing group unless they are already grouped.
pub fn compile(
    template: &str,
    start: &str,
    end: &str,
    grouping: bool,
    registry: &PatternRegistry,
) -> Result<CompiledTemplate> {
    let (tokens, rest) = tokenize(template)?;
    let mut fragment = String::from(start);
    let mut param_names = Vec::new();
    let mut converters = Vec::new();

    for token in tokens {
        let (pattern, converter) = match token.pattern {
            Some(p) => (p, None),
            None => {
                let (p, c) = registry.lookup(token.name);
                (p, c.cloned())
            }
        };
        let named = !token.name.is_empty();
        if named {
            param_names.push(token.name.to_string());
            converters.push(converter);
        }

        fragment.push_str(&regex::escape(token.literal));
        if named && grouping {
            fragment.push('(');
            fragment.push_str(pattern);
            fragment.push(')');
        } else if pattern.contains('|') && !is_grouped(pattern) {
            fragment.push_str("(?:");
            fragment.push_str(pattern);
            fragment.push(')');
        } else {
            fragment.push_str(pattern);
        }
    }

    fragment.push_str(&regex::escape(rest));
    fragment.push_str(end);

    Ok(CompiledTemplate {
        fragment,
        param_names,
        converters,
        remainder: rest.to_string(),
    })
}

/// True when the template contains at least one placeholder.
pub fn has_placeholder(template: &str) -> bool {
    PLACEHOLDER_RE.is_match(template)
}

/// Checks template syntax without resolving any pattern.
pub fn validate(template: &str) -> Result<()> {
    tokenize(template).map(|_| ())
}

/// True when the whole pattern is one parenthesised group.
fn is_grouped(pattern: &str) -> bool {
    if !pattern.starts_with('(') || !pattern.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut in_class = false;
    let mut chars = pattern.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == pattern.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtins() -> PatternRegistry {
        PatternRegistry::with_builtins()
    }

    #[test]
    fn test_named_with_grouping() {
        let c = compile("/{id:\\d+}", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, r"/(\d+)");
        assert_eq!(c.param_names, vec!["id"]);
        assert!(c.converters[0].is_none());
    }

    #[test]
    fn test_unnamed_is_not_a_parameter() {
        let c = compile("/{:\\d+}", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, r"/\d+");
        assert!(c.param_names.is_empty());
    }

    #[test]
    fn test_alternation_is_wrapped() {
        let c = compile("/{:xx|yy}", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, "/(?:xx|yy)");

        let c = compile("/{id:xx|yy}", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, "/(xx|yy)");

        let c = compile("/{id:xx|yy}", "", "", false, &builtins()).unwrap();
        assert_eq!(c.fragment, "/(?:xx|yy)");

        let c = compile("/{:(?:xx|yy)}", "", "", false, &builtins()).unwrap();
        assert_eq!(c.fragment, "/(?:xx|yy)");

        let c = compile("/{:(a)|(b)}", "", "", false, &builtins()).unwrap();
        assert_eq!(c.fragment, "/(?:(a)|(b))");
    }

    #[test]
    fn test_registry_resolution_and_converters() {
        let c = compile(
            "/books/{book_id}/comments/{slug}",
            r"\A",
            r"\z",
            true,
            &builtins(),
        )
        .unwrap();
        assert_eq!(c.fragment, r"\A/books/([0-9]+)/comments/([^/]+?)\z");
        assert_eq!(c.param_names, vec!["book_id", "slug"]);
        assert_eq!(c.converters[0].as_ref().map(Converter::name), Some("int"));
        assert!(c.converters[1].is_none());
    }

    #[test]
    fn test_empty_pattern_falls_back_to_registry() {
        let c = compile("/{id:}", "", "", false, &builtins()).unwrap();
        assert_eq!(c.fragment, "/[0-9]+");
    }

    #[test]
    fn test_nested_braces_in_pattern() {
        let c = compile("/{year:\\d{4}}/{month:\\d{2}}", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, r"/(\d{4})/(\d{2})");
        assert_eq!(c.param_names, vec!["year", "month"]);
    }

    #[test]
    fn test_literals_are_escaped() {
        let c = compile("/api/v1.0/{id}.json", "", "", true, &builtins()).unwrap();
        assert_eq!(c.fragment, r"/api/v1\.0/([0-9]+)\.json");
        assert_eq!(c.remainder, ".json");

        let c = compile("/a+b", r"\A", r"\z", true, &builtins()).unwrap();
        assert_eq!(c.fragment, r"\A/a\+b\z");
        assert_eq!(c.remainder, "/a+b");
    }

    #[test]
    fn test_stray_braces_are_rejected() {
        for bad in ["/books/{id", "/books/id}", "/{foo-bar}", "/{a}}"] {
            assert!(
                matches!(validate(bad), Err(RouterError::InvalidTemplate { .. })),
                "{bad} should be rejected"
            );
        }
        assert!(validate("/books/{id}/{:\\d{2}}").is_ok());
    }

    #[test]
    fn test_has_placeholder() {
        assert!(has_placeholder("/books/{id}"));
        assert!(has_placeholder("/{:x}"));
        assert!(!has_placeholder("/books"));
    }

    #[test]
    fn test_is_grouped() {
        assert!(is_grouped("(a|b)"));
        assert!(is_grouped("(?:a|b)"));
        assert!(is_grouped(r"(a\)|b)"));
        assert!(!is_grouped("(a)|(b)"));
        assert!(!is_grouped("a|b"));
        assert!(!is_grouped("([)]|b"));
    }
}
