//! Settings and TOML route files.
//!
//! A route file declares handlers by name and mounts them:
//!
//! ```toml
//! [settings]
//! json_suffix = ".json"
//!
//! [[settings.patterns]]
//! name = "slug"
//! fragment = "[a-z0-9-]+"
//!
//! [[handlers]]
//! name = "BooksAction"
//! map = [
//!     { path = "", methods = { GET = "index", POST = "create" } },
//!     { path = "/{id}", methods = { GET = "show", PUT = "update", DELETE = "delete" } },
//! ]
//!
//! [[mount]]
//! path = "/api"
//!
//! [[mount.children]]
//! path = "/books"
//! handler = "BooksAction"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::action::{ActionId, HandlerRef, MethodMap};
use crate::app::Application;
use crate::error::RouterError;
use crate::mount::Mountable;
use crate::params::{Converter, ParamRule, PatternRegistry};
use crate::request::Method;

/// Errors raised while loading a route file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or does not fit the schema.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The routes it describes are invalid.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Register the built-in `id`, `*_id`, `ext`, `date` and `*_date`
    /// patterns.
    pub builtin_patterns: bool,

    /// Paths ending with this suffix get JSON error bodies.
    pub json_suffix: String,

    /// Extra patterns, registered after the built-ins.
    pub patterns: Vec<PatternConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            builtin_patterns: true,
            json_suffix: ".json".to_string(),
            patterns: Vec::new(),
        }
    }
}

impl Settings {
    /// Builds the pattern registry these settings describe.
    pub fn registry(&self) -> Result<PatternRegistry, RouterError> {
        let mut registry = if self.builtin_patterns {
            PatternRegistry::with_builtins()
        } else {
            PatternRegistry::new()
        };
        for pattern in &self.patterns {
            Regex::new(&pattern.fragment)?;
            registry.register(
                pattern.rule()?,
                pattern.fragment.clone(),
                pattern.converter.map(ConverterKind::converter),
            );
        }
        Ok(registry)
    }
}

/// A parameter pattern entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatternConfig {
    /// Exact parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Parameter name suffix, such as `_slug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Regex fragment.
    pub fragment: String,

    /// Converter applied to captured values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<ConverterKind>,
}

impl PatternConfig {
    fn rule(&self) -> Result<ParamRule, RouterError> {
        match (&self.name, &self.suffix) {
            (Some(name), None) => Ok(ParamRule::Name(name.clone())),
            (None, Some(suffix)) => Ok(ParamRule::suffix(suffix)),
            _ => Err(RouterError::InvalidSetting(format!(
                "pattern '{}' needs exactly one of `name` or `suffix`",
                self.fragment
            ))),
        }
    }
}

/// Built-in converters selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// Decimal integer.
    Int,
    /// `YYYY-MM-DD` date.
    Date,
}

impl ConverterKind {
    /// Returns the converter.
    pub fn converter(self) -> Converter {
        match self {
            Self::Int => Converter::int(),
            Self::Date => Converter::date(),
        }
    }
}

/// A handler declared in a route file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Handler name, referenced by mounts.
    pub name: String,

    /// Routes relative to the mount prefix.
    #[serde(default)]
    pub map: Vec<MappingConfig>,
}

/// One route of a declared handler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingConfig {
    /// Template relative to the mount prefix.
    #[serde(default)]
    pub path: String,

    /// Verb to action name.
    pub methods: BTreeMap<String, String>,
}

impl MappingConfig {
    fn method_map(&self) -> Result<MethodMap, RouterError> {
        self.methods
            .iter()
            .map(|(verb, action)| Ok((verb.parse::<Method>()?, ActionId::new(action))))
            .collect()
    }
}

/// A mount entry: a handler name or nested children.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MountConfig {
    /// Prefix template.
    pub path: String,

    /// Name of a declared or supplied handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    /// Nested mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<MountConfig>>,
}

impl MountConfig {
    fn mountable(&self, handlers: &HashMap<String, HandlerRef>) -> Result<Mountable, RouterError> {
        match (&self.handler, &self.children) {
            (Some(name), None) => handlers
                .get(name)
                .cloned()
                .map(Mountable::Handler)
                .ok_or_else(|| RouterError::InvalidMount {
                    path: self.path.clone(),
                    reason: format!("Action class expected but got: {name:?}"),
                }),
            (None, Some(children)) => children
                .iter()
                .map(|child| Ok((child.path.clone(), child.mountable(handlers)?)))
                .collect::<Result<Vec<_>, RouterError>>()
                .map(Mountable::Children),
            _ => Err(RouterError::InvalidMount {
                path: self.path.clone(),
                reason: "expected exactly one of `handler` or `children`".to_string(),
            }),
        }
    }
}

/// A parsed route file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteFile {
    /// Application settings.
    pub settings: Settings,

    /// Declared handlers.
    pub handlers: Vec<HandlerConfig>,

    /// Top-level mounts, in priority order.
    pub mount: Vec<MountConfig>,
}

impl RouteFile {
    /// Reads and parses a route file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading route file");
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses route file content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Builds an application from the declared handlers.
    ///
    /// Declared handlers carry routes but no implementation, which is
    /// enough for listings and lookups.
    pub fn build(&self) -> Result<Application, ConfigError> {
        self.build_with(Vec::new())
    }

    /// Builds an application, mounting `handlers` wherever their name is
    /// referenced. Supplied handlers take precedence over declared ones.
    pub fn build_with(&self, handlers: Vec<HandlerRef>) -> Result<Application, ConfigError> {
        let mut by_name = HashMap::new();
        for decl in &self.handlers {
            let mappings = decl
                .map
                .iter()
                .map(|m| Ok((m.path.clone(), m.method_map()?)))
                .collect::<Result<Vec<_>, RouterError>>()?;
            by_name.insert(decl.name.clone(), HandlerRef::declared(&decl.name, mappings));
        }
        let mut supplied = HashSet::new();
        for handler in handlers {
            let name = handler.name().to_string();
            if !supplied.insert(name.clone()) {
                return Err(RouterError::InvalidSetting(format!(
                    "handler name {name:?} is supplied twice"
                ))
                .into());
            }
            by_name.insert(name, handler);
        }

        let app = Application::with_settings(self.settings.clone())?;
        for entry in &self.mount {
            app.mount(&entry.path, entry.mountable(&by_name)?)?;
        }
        Ok(app)
    }
}
