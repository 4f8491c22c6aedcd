//! # trellis-router
//!
//! A request router built around a mount tree and a single combined
//! matcher.
//!
//! This crate provides:
//! - Path templates with `{name}`, `{name:pattern}` and `{:pattern}`
//!   placeholders
//! - A registry of parameter patterns and converters (`{id}` matches
//!   digits and converts to an integer)
//! - Nested mounts of handlers under prefix templates
//! - One compiled regex for all variable routes, plus a hash map for fixed
//!   ones
//! - A dispatcher producing 404, 405 and 400 responses and JSON or HTML
//!   error bodies
//! - TOML route files
//!
//! ## Quick Start
//!
//! ```
//! use trellis_router::{
//!     Action, ActionContext, ActionError, Application, Content, Mountable, ParamValue,
//!     Request, Routes,
//! };
//!
//! struct BooksAction;
//!
//! impl BooksAction {
//!     fn index(&mut self, _cx: &mut ActionContext<'_>, _args: &[ParamValue]) -> Result<Content, ActionError> {
//!         Ok(serde_json::json!({"books": []}).into())
//!     }
//!
//!     fn show(&mut self, _cx: &mut ActionContext<'_>, args: &[ParamValue]) -> Result<Content, ActionError> {
//!         Ok(serde_json::json!({"id": args[0].as_int()}).into())
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
//!
//! let app = Application::new();
//! app.mount("/api", Mountable::children([("/books", Mountable::handler::<BooksAction>())]))
//!     .unwrap();
//!
//! let resp = app.dispatch(&Request::get("/api/books/42")).unwrap();
//! assert_eq!(resp.status, 200);
//! assert_eq!(resp.body_string().unwrap(), r#"{"id":42}"#);
//!
//! let resp = app.dispatch(&Request::get("/api/books/abc")).unwrap();
//! assert_eq!(resp.status, 404);
//! ```
//!
//! ## Priority
//!
//! A route without placeholders always wins over variable routes that
//! could match the same path. Among variable routes the first mounted one
//! wins, whatever its specificity.
//! Mounting the same fixed path twice keeps the later mount.

mod action;
mod app;
mod config;
mod error;
mod mount;
mod params;
mod request;
mod response;
mod table;
pub mod template;

pub use action::{
    Action, ActionContext, ActionFn, ActionId, HandlerRef, Invoke, MappingEntry, MethodMap,
    RouteMapping, Routes,
};
pub use app::{allowed_methods, Application, Resolution};
pub use config::{
    ConfigError, ConverterKind, HandlerConfig, MappingConfig, MountConfig, PatternConfig,
    RouteFile, Settings,
};
pub use error::{
    ActionError, BoxError, ConversionError, DispatchError, HttpError, Result, RouterError,
};
pub use mount::{MountEvent, MountNode, MountTree, Mountable, RouteEntry};
pub use params::{Converter, ParamRule, ParamValue, PatternRegistry, DEFAULT_FRAGMENT};
pub use request::{Method, Request};
pub use response::{status_text, Content, Response};
pub use table::{FixedRoute, RouteMatch, RouteTable, VariableRoute};
pub use template::CompiledTemplate;
