//! Application: mounting, lookup and dispatch.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use tracing::{debug, error, info, warn};

use crate::action::{ActionContext, ActionId, MethodMap};
use crate::config::Settings;
use crate::error::{ActionError, DispatchError, HttpError, Result, RouterError};
use crate::mount::{MountNode, MountTree, Mountable, RouteEntry};
use crate::params::{Converter, ParamRule, PatternRegistry};
use crate::request::{Method, Request};
use crate::response::Response;
use crate::table::{RouteMatch, RouteTable};

/// Outcome of resolving a verb and path.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A route serves the verb.
    Matched {
        /// The matched route.
        route: RouteMatch,
        /// The action bound to the verb.
        action: ActionId,
    },
    /// No route matches the path.
    NotFound,
    /// A route matches the path but not the verb.
    MethodNotAllowed {
        /// Verbs the route serves.
        allowed: Vec<Method>,
    },
}

struct State {
    tree: MountTree,
    patterns: PatternRegistry,
}

/// A mount tree with its lazily compiled route table.
///
/// Mounting and pattern changes take a lock and drop the compiled table.
/// Lookups load the published table without locking; the next lookup
/// after a change compiles and publishes a fresh one.
///
/// # Example
///
/// ```
/// use trellis_router::{Application, HandlerRef, MethodMap, Method, Resolution};
///
/// let mut methods = MethodMap::new();
/// methods.insert(Method::Get, "show".into());
/// let books = HandlerRef::declared("BooksAction", vec![("/{id}".to_string(), methods)]);
///
/// let app = Application::new();
/// app.mount("/books", books).unwrap();
///
/// match app.resolve(Method::Get, "/books/42").unwrap() {
///     Resolution::Matched { route, action } => {
///         assert_eq!(action.as_str(), "show");
///         assert_eq!(route.param_values[0].as_int(), Some(42));
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub struct Application {
    state: Mutex<State>,
    table: ArcSwapOption<RouteTable>,
    generation: AtomicU64,
    settings: Settings,
}

impl Application {
    /// Creates an application with default settings.
    pub fn new() -> Self {
        Self::from_parts(PatternRegistry::with_builtins(), Settings::default())
    }

    /// Creates an application from settings.
    pub fn with_settings(settings: Settings) -> Result<Self> {
        let patterns = settings.registry()?;
        Ok(Self::from_parts(patterns, settings))
    }

    fn from_parts(patterns: PatternRegistry, settings: Settings) -> Self {
        Self {
            state: Mutex::new(State {
                tree: MountTree::new(),
                patterns,
            }),
            table: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the published table. Called with the state lock held.
    fn invalidate(&self) {
        self.table.store(None);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of changes made to the tree or the patterns so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mounts `target` at `prefix`.
    ///
    /// Every new route is compiled against the current patterns before it
    /// is added, so a bad template or fragment fails here.
    pub fn mount(&self, prefix: &str, target: impl Into<Mountable>) -> Result<&Self> {
        let node = MountNode::build(prefix, target.into())?;
        let routes = node.leaf_count();

        let mut state = self.lock();
        let mut probe = MountTree::new();
        probe.push(node.clone());
        RouteTable::build(&probe, &state.patterns)?;

        state.tree.push(node);
        self.invalidate();
        info!(prefix = %prefix, routes, "mounted");
        Ok(self)
    }

    /// Registers a parameter pattern after the existing ones.
    pub fn register_pattern(
        &self,
        rule: impl Into<ParamRule>,
        fragment: impl Into<String>,
        converter: Option<Converter>,
    ) -> &Self {
        let mut state = self.lock();
        state.patterns.register(rule, fragment, converter);
        self.invalidate();
        self
    }

    /// Removes every pattern registered under `rule`.
    pub fn unregister_pattern(&self, rule: &ParamRule) -> &Self {
        let mut state = self.lock();
        state.patterns.unregister(rule);
        self.invalidate();
        self
    }

    /// Returns the compiled table, compiling it first if needed.
    pub fn routes(&self) -> Result<Arc<RouteTable>> {
        if let Some(table) = self.table.load_full() {
            return Ok(table);
        }

        let state = self.lock();
        // Another thread may have compiled while we waited.
        if let Some(table) = self.table.load_full() {
            return Ok(table);
        }
        let table = Arc::new(RouteTable::build(&state.tree, &state.patterns)?);
        self.table.store(Some(Arc::clone(&table)));
        info!(
            fixed = table.fixed_len(),
            variable = table.variable_len(),
            generation = self.generation(),
            "compiled route table"
        );
        Ok(table)
    }

    /// Looks up a path, ignoring the verb.
    pub fn find(&self, path: &str) -> Result<Option<RouteMatch>> {
        Ok(self.routes()?.find(path)?)
    }

    /// Resolves a verb and path. `HEAD` is looked up as `GET`.
    pub fn resolve(&self, method: Method, path: &str) -> Result<Resolution> {
        let Some(route) = self.find(path)? else {
            return Ok(Resolution::NotFound);
        };
        match route.methods.get(&method.routing_method()).cloned() {
            Some(action) => Ok(Resolution::Matched { route, action }),
            None => Ok(Resolution::MethodNotAllowed {
                allowed: allowed_methods(&route.methods),
            }),
        }
    }

    /// Handles a request.
    ///
    /// Client errors become responses. A fatal handler error is returned
    /// as [`DispatchError::Unhandled`] for the host to report.
    pub fn dispatch(&self, req: &Request) -> std::result::Result<Response, DispatchError> {
        let mut resp = match self.resolve(req.method, &req.path) {
            Ok(Resolution::Matched { route, action }) => {
                debug!(
                    method = %req.method,
                    path = %req.path,
                    handler = route.handler.name(),
                    action = %action,
                    "matched"
                );
                self.invoke(req, &route, &action)?
            }
            Ok(Resolution::NotFound) => {
                debug!(method = %req.method, path = %req.path, "not found");
                self.error_response(req, &HttpError::not_found())
            }
            Ok(Resolution::MethodNotAllowed { allowed }) => {
                debug!(method = %req.method, path = %req.path, "method not allowed");
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.error_response(req, &HttpError::new(405).header("Allow", allow))
            }
            Err(RouterError::Conversion(err)) => {
                warn!(path = %req.path, error = %err, "bad path parameter");
                self.error_response(req, &err.into())
            }
            Err(err) => return Err(err.into()),
        };

        if req.method == Method::Head {
            resp.body.clear();
        }
        Ok(resp)
    }

    fn invoke(
        &self,
        req: &Request,
        route: &RouteMatch,
        action: &ActionId,
    ) -> std::result::Result<Response, DispatchError> {
        let mut resp = Response::ok();
        let result = {
            let mut cx = ActionContext::new(req, &mut resp);
            route.handler.invoke(
                &mut cx,
                route.route,
                req.method.routing_method(),
                &route.param_values,
            )
        };
        match result {
            Ok(content) => {
                resp.set_content(content);
                Ok(resp)
            }
            Err(ActionError::Http(err)) => {
                debug!(status = err.status, action = %action, "http error from action");
                Ok(self.error_response(req, &err))
            }
            Err(ActionError::Fatal(source)) => {
                error!(
                    handler = route.handler.name(),
                    action = %action,
                    error = %source,
                    "unhandled error"
                );
                Err(DispatchError::Unhandled {
                    handler: route.handler.name().to_string(),
                    action: action.clone(),
                    source,
                })
            }
        }
    }

    /// True when error bodies for `req` should be JSON.
    fn wants_json(&self, req: &Request) -> bool {
        let suffix = self.settings.json_suffix.as_str();
        (!suffix.is_empty() && req.path.ends_with(suffix)) || req.is_xhr()
    }

    /// Renders an HTTP error as a JSON or HTML response.
    pub fn error_response(&self, req: &Request, err: &HttpError) -> Response {
        let status = format!("{} {}", err.status, err.status_message());
        let (body, content_type) = if self.wants_json(req) {
            let body = serde_json::json!({
                "error": err.message,
                "status": status,
            });
            (body.to_string(), "application/json")
        } else {
            let message = err.message.as_deref().map(escape_html).unwrap_or_default();
            (
                format!("<div>\n<h2>{status}</h2>\n<p>{message}</p>\n</div>\n"),
                "text/html;charset=utf-8",
            )
        };

        let mut resp = Response::new(err.status)
            .header("Content-Type", content_type)
            .header("Content-Length", body.len().to_string())
            .body(body);
        for (key, value) in &err.headers {
            resp.headers.insert(key.clone(), value.clone());
        }
        resp
    }

    /// Every mounted route, in priority order.
    pub fn list_mappings(&self) -> Vec<RouteEntry> {
        self.lock().tree.mappings()
    }

    /// Every mounted route as a YAML-like listing.
    pub fn show_mappings(&self) -> String {
        let mut out = String::new();
        for entry in self.list_mappings() {
            let methods = entry
                .methods
                .iter()
                .map(|(method, action)| format!("{method}: {action}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(
                out,
                "- urlpath: {}\n  class:   {}\n  methods: {{{methods}}}\n\n",
                entry.path,
                entry.handler.name()
            );
        }
        out
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("generation", &self.generation())
            .field("compiled", &self.table.load().is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Verbs served by a method map, with `HEAD` wherever `GET` is.
pub fn allowed_methods(methods: &MethodMap) -> Vec<Method> {
    let mut allowed: Vec<Method> = methods.keys().copied().collect();
    if methods.contains_key(&Method::Get) && !methods.contains_key(&Method::Head) {
        allowed.push(Method::Head);
        allowed.sort();
    }
    allowed
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::HandlerRef;

    fn books() -> HandlerRef {
        let mut index = MethodMap::new();
        index.insert(Method::Get, ActionId::new("index"));
        index.insert(Method::Post, ActionId::new("create"));
        let mut item = MethodMap::new();
        item.insert(Method::Get, ActionId::new("show"));
        item.insert(Method::Put, ActionId::new("update"));
        item.insert(Method::Delete, ActionId::new("delete"));
        HandlerRef::declared(
            "BooksAction",
            vec![(String::new(), index), ("/{id}".to_string(), item)],
        )
    }

    #[test]
    fn test_table_is_cached_until_mount() {
        let app = Application::new();
        app.mount("/books", books()).unwrap();

        let first = app.routes().unwrap();
        let second = app.routes().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        app.mount("/novels", books()).unwrap();
        let third = app.routes().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.fixed_len(), 2);
        assert_eq!(app.generation(), 2);
    }

    #[test]
    fn test_pattern_change_invalidates() {
        let app = Application::new();
        app.mount("/books", books()).unwrap();
        assert!(app.find("/books/abc").unwrap().is_none());

        app.unregister_pattern(&ParamRule::from("id"));
        let found = app.find("/books/abc").unwrap().unwrap();
        assert_eq!(found.param_values[0].as_str(), Some("abc"));

        app.register_pattern("id", "[a-c]+", None);
        assert!(app.find("/books/abc").unwrap().is_some());
        assert!(app.find("/books/xyz").unwrap().is_none());
    }

    #[test]
    fn test_mount_rejects_bad_fragment() {
        let app = Application::new();
        let mut methods = MethodMap::new();
        methods.insert(Method::Get, ActionId::new("show"));
        let bad = HandlerRef::declared("Bad", vec![("/{n:(}".to_string(), methods)]);

        assert!(matches!(
            app.mount("/bad", bad),
            Err(RouterError::InvalidPattern(_))
        ));
        assert!(app.list_mappings().is_empty());
        assert_eq!(app.generation(), 0);
    }

    #[test]
    fn test_resolve() {
        let app = Application::new();
        app.mount("/books", books()).unwrap();

        assert!(matches!(
            app.resolve(Method::Head, "/books/1").unwrap(),
            Resolution::Matched { ref action, .. } if action.as_str() == "show"
        ));
        assert!(matches!(
            app.resolve(Method::Get, "/nope").unwrap(),
            Resolution::NotFound
        ));
        match app.resolve(Method::Patch, "/books/1").unwrap() {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(
                allowed,
                vec![Method::Get, Method::Put, Method::Delete, Method::Head]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_show_mappings() {
        let app = Application::new();
        app.mount("/books", books()).unwrap();
        assert_eq!(
            app.show_mappings(),
            "- urlpath: /books\n  class:   BooksAction\n  methods: {GET: index, POST: create}\n\n\
             - urlpath: /books/{id}\n  class:   BooksAction\n  methods: {GET: show, PUT: update, DELETE: delete}\n\n"
        );
    }

    #[test]
    fn test_error_rendering() {
        let app = Application::new();
        let err = HttpError::new(404).message("<b>gone</b>");

        let html = app.error_response(&Request::get("/x"), &err);
        assert_eq!(html.status, 404);
        assert_eq!(
            html.body_string().unwrap(),
            "<div>\n<h2>404 Not Found</h2>\n<p>&lt;b&gt;gone&lt;/b&gt;</p>\n</div>\n"
        );
        assert_eq!(html.content_type(), Some("text/html;charset=utf-8"));

        let json = app.error_response(&Request::get("/x.json"), &err);
        assert_eq!(
            json.body_string().unwrap(),
            r#"{"error":"<b>gone</b>","status":"404 Not Found"}"#
        );
        assert_eq!(json.content_type(), Some("application/json"));
        assert_eq!(
            json.get_header("Content-Length"),
            Some(json.body.len().to_string().as_str())
        );
    }

    #[test]
    fn test_allowed_methods() {
        let mut methods = MethodMap::new();
        methods.insert(Method::Post, ActionId::new("create"));
        assert_eq!(allowed_methods(&methods), vec![Method::Post]);
    }
}
