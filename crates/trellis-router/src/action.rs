//! Handlers and their actions.
//!
//! A handler type implements [`Action`] and declares its routes through an
//! explicit [`Routes`] table. [`HandlerRef::of`] turns that table into a
//! type-erased reference holding the method maps and an invoker that keeps
//! one function pointer per route and verb.
//!
//! # Example
//!
//! ```
//! use trellis_router::{Action, ActionContext, ActionError, Content, ParamValue, Request, Routes};
//!
//! struct BooksAction;
//!
//! impl BooksAction {
//!     fn index(&mut self, _cx: &mut ActionContext<'_>, _args: &[ParamValue]) -> Result<Content, ActionError> {
//!         Ok("<ul></ul>".into())
//!     }
//!
//!     fn show(&mut self, _cx: &mut ActionContext<'_>, args: &[ParamValue]) -> Result<Content, ActionError> {
//!         Ok(format!("book {}", args[0]).into())
//!     }
//! }
//!
//! impl Action for BooksAction {
//!     fn create(_req: &Request) -> Self {
//!         Self
//!     }
//!
//!     fn routes(routes: &mut Routes<Self>) {
//!         routes.map("").get("index", Self::index);
//!         routes.map("/{id}").get("show", Self::show);
//!     }
//! }
//! ```

use std::any::type_name;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::ActionError;
use crate::params::ParamValue;
use crate::request::{Method, Request};
use crate::response::{Content, Response};

/// Identifier of an action within a handler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(Arc<str>);

impl ActionId {
    /// Creates an identifier.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Borrow<str> for ActionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verb to action map of one route.
pub type MethodMap = BTreeMap<Method, ActionId>;

/// Request and response bound for one invocation.
pub struct ActionContext<'a> {
    /// The incoming request.
    pub req: &'a Request,
    /// The response being built.
    pub resp: &'a mut Response,
}

impl<'a> ActionContext<'a> {
    /// Binds a request/response pair.
    pub fn new(req: &'a Request, resp: &'a mut Response) -> Self {
        Self { req, resp }
    }
}

/// Signature of an action bound to handler type `A`.
pub type ActionFn<A> =
    fn(&mut A, &mut ActionContext<'_>, &[ParamValue]) -> Result<Content, ActionError>;

/// A handler type.
///
/// One value is created per request with [`Action::create`]; the selected
/// action then runs between [`Action::before_action`] and
/// [`Action::after_action`].
pub trait Action: Sized + 'static {
    /// Creates the handler for a request.
    fn create(req: &Request) -> Self;

    /// Declares the handler's routes.
    fn routes(routes: &mut Routes<Self>);

    /// Runs before the action. An error skips the action.
    fn before_action(&mut self, _cx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Runs after the action, including when it or `before_action` failed.
    fn after_action(&mut self, _cx: &mut ActionContext<'_>, _failed: bool) {}

    /// Name used in listings and logs.
    fn name() -> &'static str {
        let full = type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

struct RouteDecl<A> {
    template: String,
    methods: Vec<(Method, ActionId, ActionFn<A>)>,
}

/// Route declarations of handler type `A`.
pub struct Routes<A> {
    decls: Vec<RouteDecl<A>>,
}

impl<A: Action> Routes<A> {
    fn collect() -> Self {
        let mut routes = Self { decls: Vec::new() };
        A::routes(&mut routes);
        routes
    }

    /// Starts a route relative to the handler's mount prefix.
    pub fn map(&mut self, template: impl Into<String>) -> RouteMapping<'_, A> {
        self.decls.push(RouteDecl {
            template: template.into(),
            methods: Vec::new(),
        });
        let index = self.decls.len() - 1;
        RouteMapping {
            decl: &mut self.decls[index],
        }
    }
}

/// Builder for the verbs of one route.
pub struct RouteMapping<'r, A> {
    decl: &'r mut RouteDecl<A>,
}

impl<A> RouteMapping<'_, A> {
    /// Binds `method` to the action `name`. A later binding of the same
    /// method replaces the earlier one.
    pub fn on(self, method: Method, name: &str, f: ActionFn<A>) -> Self {
        self.decl.methods.push((method, ActionId::new(name), f));
        self
    }

    /// Binds GET.
    pub fn get(self, name: &str, f: ActionFn<A>) -> Self {
        self.on(Method::Get, name, f)
    }

    /// Binds POST.
    pub fn post(self, name: &str, f: ActionFn<A>) -> Self {
        self.on(Method::Post, name, f)
    }

    /// Binds PUT.
    pub fn put(self, name: &str, f: ActionFn<A>) -> Self {
        self.on(Method::Put, name, f)
    }

    /// Binds PATCH.
    pub fn patch(self, name: &str, f: ActionFn<A>) -> Self {
        self.on(Method::Patch, name, f)
    }

    /// Binds DELETE.
    pub fn delete(self, name: &str, f: ActionFn<A>) -> Self {
        self.on(Method::Delete, name, f)
    }
}

/// One route declared by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Template relative to the mount prefix.
    pub template: String,
    /// Verbs served by the route.
    pub methods: Arc<MethodMap>,
}

/// Runs the action bound to one route and verb.
///
/// `route` is the position of the route in [`HandlerRef::mapping`].
pub trait Invoke: Send + Sync {
    /// Runs the action with the converted path parameters.
    fn invoke(
        &self,
        cx: &mut ActionContext<'_>,
        route: usize,
        method: Method,
        args: &[ParamValue],
    ) -> Result<Content, ActionError>;
}

struct TypedInvoker<A> {
    routes: Vec<BTreeMap<Method, ActionFn<A>>>,
    _handler: PhantomData<fn() -> A>,
}

impl<A: Action> Invoke for TypedInvoker<A> {
    fn invoke(
        &self,
        cx: &mut ActionContext<'_>,
        route: usize,
        method: Method,
        args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        let f = self
            .routes
            .get(route)
            .and_then(|methods| methods.get(&method))
            .ok_or_else(|| {
                ActionError::fatal(format!(
                    "{}: no {method} action on route #{route}",
                    A::name()
                ))
            })?;
        let mut handler = A::create(cx.req);
        let result = handler.before_action(cx).and_then(|()| f(&mut handler, cx, args));
        handler.after_action(cx, result.is_err());
        result
    }
}

struct DeclaredInvoker {
    name: Arc<str>,
}

impl Invoke for DeclaredInvoker {
    fn invoke(
        &self,
        _cx: &mut ActionContext<'_>,
        _route: usize,
        method: Method,
        _args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        Err(ActionError::fatal(format!(
            "{}: handler has no implementation for {method}",
            self.name
        )))
    }
}

/// Type-erased, cheaply cloned reference to a handler.
#[derive(Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    type_name: Option<&'static str>,
    mapping: Arc<[MappingEntry]>,
    invoker: Arc<dyn Invoke>,
}

impl HandlerRef {
    /// Builds the reference and invoker table for handler type `A`.
    ///
    /// Each route keeps its own functions, so one action name may be bound
    /// to different functions on different routes.
    pub fn of<A: Action>() -> Self {
        let routes = Routes::<A>::collect();
        let mut table = Vec::with_capacity(routes.decls.len());
        let mapping = routes
            .decls
            .into_iter()
            .map(|decl| {
                let mut methods = MethodMap::new();
                let mut fns = BTreeMap::new();
                for (method, id, f) in decl.methods {
                    fns.insert(method, f);
                    methods.insert(method, id);
                }
                table.push(fns);
                MappingEntry {
                    template: decl.template,
                    methods: Arc::new(methods),
                }
            })
            .collect();
        Self {
            name: Arc::from(A::name()),
            type_name: Some(type_name::<A>()),
            mapping,
            invoker: Arc::new(TypedInvoker::<A> {
                routes: table,
                _handler: PhantomData,
            }),
        }
    }

    /// Builds a reference that only carries route declarations.
    ///
    /// Useful for listings and lookups; invoking it is a fatal error.
    pub fn declared(name: &str, mappings: Vec<(String, MethodMap)>) -> Self {
        let name: Arc<str> = Arc::from(name);
        Self {
            mapping: mappings
                .into_iter()
                .map(|(template, methods)| MappingEntry {
                    template,
                    methods: Arc::new(methods),
                })
                .collect(),
            invoker: Arc::new(DeclaredInvoker { name: name.clone() }),
            name,
            type_name: None,
        }
    }

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routes declared by the handler.
    pub fn mapping(&self) -> &[MappingEntry] {
        &self.mapping
    }

    /// Runs the action bound to `method` on the route at position `route`
    /// of [`HandlerRef::mapping`].
    pub fn invoke(
        &self,
        cx: &mut ActionContext<'_>,
        route: usize,
        method: Method,
        args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        self.invoker.invoke(cx, route, method, args)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef")
            .field("name", &self.name)
            .field("routes", &self.mapping.len())
            .finish()
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        // Typed handlers compare by full type path, declared ones by name.
        self.name == other.name && self.type_name == other.type_name
    }
}

impl Eq for HandlerRef {}
