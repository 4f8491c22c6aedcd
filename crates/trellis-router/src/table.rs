//! The compiled route table.
//!
//! Routes without placeholders go into a hash map keyed by their full
//! path. All other routes are fused into one combined regex whose
//! alternation mirrors the mount tree:
//!
//! ```text
//! \A(?:/api(?:/books(?:/[0-9]+(\z)|/[0-9]+/edit(\z))|/authors(?:/[0-9]+(\z))))
//! ```
//!
//! Every route arm ends in an empty `(\z)` group. After a match, the first
//! group that captured the empty string identifies the route, whose own
//! anchored regex is then run to extract the parameters.

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::action::{HandlerRef, MethodMap};
use crate::error::{ConversionError, Result};
use crate::mount::{MountEvent, MountTree};
use crate::params::{Converter, ParamValue, PatternRegistry};
use crate::template;

/// Compiled size allowed for the combined regex.
const COMBINED_SIZE_LIMIT: usize = 256 * (1 << 20);

/// A route without placeholders.
#[derive(Debug, Clone)]
pub struct FixedRoute {
    /// The serving handler.
    pub handler: HandlerRef,
    /// Position of the route among the handler's declarations.
    pub route: usize,
    /// Verbs served by the route.
    pub methods: Arc<MethodMap>,
}

/// A route with at least one placeholder.
#[derive(Debug, Clone)]
pub struct VariableRoute {
    /// Full template, anchored at both ends, one group per parameter.
    pub regex: Regex,
    /// Full path template.
    pub template: String,
    /// Parameter names in template order.
    pub param_names: Arc<[String]>,
    /// One converter slot per parameter.
    pub converters: Vec<Option<Converter>>,
    /// The serving handler.
    pub handler: HandlerRef,
    /// Position of the route among the handler's declarations.
    pub route: usize,
    /// Verbs served by the route.
    pub methods: Arc<MethodMap>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The serving handler.
    pub handler: HandlerRef,
    /// Position of the route among the handler's declarations.
    pub route: usize,
    /// Every verb served at the matched path.
    pub methods: Arc<MethodMap>,
    /// Parameter names in template order.
    pub param_names: Arc<[String]>,
    /// Converted parameter values, parallel to `param_names`.
    pub param_values: Vec<ParamValue>,
}

impl RouteMatch {
    /// Looks up a parameter value by name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.param_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.param_values.get(i))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Piece {
    Open,
    Alt,
    Text(String),
    Close,
}

struct Builder<'r> {
    registry: &'r PatternRegistry,
    pieces: Vec<Piece>,
    fixed: HashMap<String, FixedRoute>,
    variables: Vec<VariableRoute>,
}

impl Builder<'_> {
    fn at_group_start(&self) -> bool {
        self.pieces.last() == Some(&Piece::Open)
    }

    fn on_event(&mut self, event: MountEvent<'_>) -> Result<()> {
        match event {
            MountEvent::Enter { prefix, .. } => {
                if !self.at_group_start() {
                    self.pieces.push(Piece::Alt);
                }
                let compiled = template::compile(prefix, "", "", false, self.registry)?;
                self.pieces.push(Piece::Text(compiled.fragment));
                self.pieces.push(Piece::Open);
            }
            MountEvent::Leaf {
                base,
                template: leaf,
                handler,
                route,
                methods,
            } => {
                let full = format!("{base}{leaf}");
                if !template::has_placeholder(&full) {
                    // A later mount of the same fixed path replaces it.
                    self.fixed.insert(
                        full,
                        FixedRoute {
                            handler: handler.clone(),
                            route,
                            methods: methods.clone(),
                        },
                    );
                    return Ok(());
                }

                if !self.at_group_start() {
                    self.pieces.push(Piece::Alt);
                }
                let arm = template::compile(leaf, "", r"(\z)", false, self.registry)?;
                self.pieces.push(Piece::Text(arm.fragment));

                let compiled = template::compile(&full, r"\A", r"\z", true, self.registry)?;
                self.variables.push(VariableRoute {
                    regex: Regex::new(&compiled.fragment)?,
                    template: full,
                    param_names: compiled.param_names.into(),
                    converters: compiled.converters,
                    handler: handler.clone(),
                    route,
                    methods: methods.clone(),
                });
            }
            MountEvent::Exit { .. } => {
                if self.at_group_start() {
                    // Nothing variable below this prefix.
                    self.pieces.pop();
                    self.pieces.pop();
                    if self.pieces.last() == Some(&Piece::Alt) {
                        self.pieces.pop();
                    }
                } else {
                    self.pieces.push(Piece::Close);
                }
            }
        }
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::from(r"\A");
        for piece in &self.pieces {
            match piece {
                Piece::Open => out.push_str("(?:"),
                Piece::Alt => out.push('|'),
                Piece::Text(text) => out.push_str(text),
                Piece::Close => out.push(')'),
            }
        }
        out
    }
}

/// Immutable lookup structure compiled from a mount tree.
#[derive(Debug, Clone)]
pub struct RouteTable {
    fixed: HashMap<String, FixedRoute>,
    variables: Vec<VariableRoute>,
    combined: Option<Regex>,
    no_params: Arc<[String]>,
}

impl RouteTable {
    /// Compiles a table from the tree, resolving placeholders through
    /// `registry`.
    pub fn build(tree: &MountTree, registry: &PatternRegistry) -> Result<Self> {
        let mut builder = Builder {
            registry,
            pieces: vec![Piece::Open],
            fixed: HashMap::new(),
            variables: Vec::new(),
        };

        let mut failure = None;
        tree.traverse(&mut |event| {
            if failure.is_none() {
                if let Err(err) = builder.on_event(event) {
                    failure = Some(err);
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        builder.pieces.push(Piece::Close);

        let combined = if builder.variables.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&builder.render())
                    .size_limit(COMBINED_SIZE_LIMIT)
                    .build()?,
            )
        };

        Ok(Self {
            fixed: builder.fixed,
            variables: builder.variables,
            combined,
            no_params: Arc::from(Vec::new()),
        })
    }

    /// Finds the route for `path`.
    ///
    /// Fixed routes win over variable ones; among variable routes the
    /// first mounted wins. Returns an error when a parameter matched its
    /// pattern but its converter rejected it.
    pub fn find(&self, path: &str) -> std::result::Result<Option<RouteMatch>, ConversionError> {
        if let Some(route) = self.fixed.get(path) {
            return Ok(Some(RouteMatch {
                handler: route.handler.clone(),
                route: route.route,
                methods: route.methods.clone(),
                param_names: self.no_params.clone(),
                param_values: Vec::new(),
            }));
        }

        let Some(caps) = self.combined.as_ref().and_then(|re| re.captures(path)) else {
            return Ok(None);
        };
        // The first empty capture is the marker of the matched arm.
        let Some(index) = caps
            .iter()
            .skip(1)
            .position(|m| m.is_some_and(|m| m.as_str().is_empty()))
        else {
            return Ok(None);
        };
        let Some(route) = self.variables.get(index) else {
            return Ok(None);
        };
        let Some(caps) = route.regex.captures(path) else {
            return Ok(None);
        };

        let param_values = route
            .converters
            .iter()
            .enumerate()
            .map(|(i, converter)| {
                let raw = caps.get(i + 1).map_or("", |m| m.as_str());
                match converter {
                    Some(converter) => converter.convert(raw),
                    None => Ok(ParamValue::Str(raw.to_string())),
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(RouteMatch {
            handler: route.handler.clone(),
            route: route.route,
            methods: route.methods.clone(),
            param_names: route.param_names.clone(),
            param_values,
        }))
    }

    /// Number of fixed routes.
    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    /// Number of variable routes.
    pub fn variable_len(&self) -> usize {
        self.variables.len()
    }

    /// Variable routes in priority order.
    pub fn variables(&self) -> &[VariableRoute] {
        &self.variables
    }

    /// Source of the combined regex, if any route has a placeholder.
    pub fn combined_source(&self) -> Option<&str> {
        self.combined.as_ref().map(Regex::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionId;
    use crate::error::RouterError;
    use crate::mount::Mountable;
    use crate::request::Method;

    fn declared(name: &str, templates: &[&str]) -> Mountable {
        let mappings = templates
            .iter()
            .map(|t| {
                let mut methods = MethodMap::new();
                methods.insert(Method::Get, ActionId::new(t));
                ((*t).to_string(), methods)
            })
            .collect();
        HandlerRef::declared(name, mappings).into()
    }

    fn build(tree: &MountTree) -> RouteTable {
        RouteTable::build(tree, &PatternRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn test_combined_regex_mirrors_tree() {
        let mut tree = MountTree::new();
        tree.mount(
            "/api",
            Mountable::children([
                ("/books", declared("Books", &["", "/{id}", "/{id}/edit"])),
                ("/authors", declared("Authors", &["/{id}"])),
            ]),
        )
        .unwrap();

        let table = build(&tree);
        assert_eq!(
            table.combined_source(),
            Some(r"\A(?:/api(?:/books(?:/[0-9]+(\z)|/[0-9]+/edit(\z))|/authors(?:/[0-9]+(\z))))")
        );
        assert_eq!(table.fixed_len(), 1);
        assert_eq!(table.variable_len(), 3);
        assert_eq!(table.variables()[1].regex.as_str(), r"\A/api/books/([0-9]+)/edit\z");
    }

    #[test]
    fn test_dead_branches_are_pruned() {
        let mut tree = MountTree::new();
        tree.mount(
            "/api",
            Mountable::children([
                ("/books", declared("Books", &["/{id}"])),
                ("/static", declared("Static", &["/about", "/contact"])),
            ]),
        )
        .unwrap()
        .mount("/home", declared("Home", &[""]))
        .unwrap();

        let table = build(&tree);
        assert_eq!(
            table.combined_source(),
            Some(r"\A(?:/api(?:/books(?:/[0-9]+(\z))))")
        );
        assert_eq!(table.fixed_len(), 3);
    }

    #[test]
    fn test_no_variable_routes() {
        let mut tree = MountTree::new();
        tree.mount("/", declared("Home", &[""])).unwrap();

        let table = build(&tree);
        assert_eq!(table.combined_source(), None);
        assert!(table.find("/").unwrap().is_some());
        assert!(table.find("/x").unwrap().is_none());
    }

    #[test]
    fn test_find_converts_values() {
        let mut tree = MountTree::new();
        tree.mount(
            "/users/{user_id}",
            declared("Posts", &["/posts/{slug}", "/posts/{id}.json"]),
        )
        .unwrap();

        let table = build(&tree);
        let found = table.find("/users/7/posts/hello").unwrap().unwrap();
        assert_eq!(&*found.param_names, ["user_id", "slug"]);
        assert_eq!(
            found.param_values,
            vec![ParamValue::Int(7), ParamValue::from("hello")]
        );
        assert_eq!(found.param("slug"), Some(&ParamValue::from("hello")));

        // The first route already matches `12.json` as a slug.
        let found = table.find("/users/7/posts/12.json").unwrap().unwrap();
        assert_eq!(found.param("slug"), Some(&ParamValue::from("12.json")));
    }

    #[test]
    fn test_conversion_failure() {
        let mut tree = MountTree::new();
        tree.mount("/archive", declared("Archive", &["/{date}"])).unwrap();

        let table = build(&tree);
        let found = table.find("/archive/2012-02-29").unwrap().unwrap();
        assert_eq!(
            found.param_values[0].as_date(),
            chrono::NaiveDate::from_ymd_opt(2012, 2, 29)
        );

        let err = table.find("/archive/2012-02-30").unwrap_err();
        assert_eq!(err.value, "2012-02-30");
    }

    #[test]
    fn test_later_fixed_mount_replaces_earlier() {
        let mut tree = MountTree::new();
        tree.mount("/a", declared("First", &[""]))
            .unwrap()
            .mount("/a", declared("Second", &[""]))
            .unwrap();

        let table = build(&tree);
        assert_eq!(table.fixed_len(), 1);
        assert_eq!(table.find("/a").unwrap().unwrap().handler.name(), "Second");
    }

    #[test]
    fn test_route_position_is_kept() {
        let mut tree = MountTree::new();
        tree.mount("/t", declared("Shelf", &["", "/{id}"])).unwrap();

        let table = build(&tree);
        assert_eq!(table.find("/t").unwrap().unwrap().route, 0);
        assert_eq!(table.find("/t/3").unwrap().unwrap().route, 1);
    }

    #[test]
    fn test_many_ext_routes() {
        let mut tree = MountTree::new();
        for i in 0..1000 {
            tree.mount(&format!("/r{i}"), declared("Ext", &["/{id}{ext}"]))
                .unwrap();
        }

        let table = build(&tree);
        assert_eq!(table.variable_len(), 1000);
        let found = table.find("/r999/5.json").unwrap().unwrap();
        assert_eq!(
            found.param_values,
            vec![ParamValue::Int(5), ParamValue::from(".json")]
        );
        assert_eq!(table.find("/r0/5").unwrap().unwrap().param_values[1], ParamValue::from(""));
        // Extensions are ASCII word characters.
        assert!(table.find("/r0/5.\u{f1}").unwrap().is_none());
    }

    #[test]
    fn test_invalid_fragment_fails_build() {
        let mut tree = MountTree::new();
        tree.mount("/x", declared("X", &["/{n:[0-9}"])).unwrap();

        let err = RouteTable::build(&tree, &PatternRegistry::new()).unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern(_)));
    }
}
