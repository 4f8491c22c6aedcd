#![allow(dead_code)]

use trellis_router::{
    Action, ActionContext, ActionError, ActionId, Application, Content, HandlerRef, HttpError,
    Method, MethodMap, ParamValue, Request, RouteMatch, Routes,
};

/// Handler used across the dispatch tests.
///
/// Book 404 raises a not-found error, book 500 fails fatally, and a request
/// carrying `X-Block` is stopped in `before_action`.
pub struct BooksAction {
    blocked: bool,
}

impl BooksAction {
    fn index(
        &mut self,
        _cx: &mut ActionContext<'_>,
        _args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        Ok(serde_json::json!({"books": ["Dune", "Emma"]}).into())
    }

    fn create_book(
        &mut self,
        cx: &mut ActionContext<'_>,
        _args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        cx.resp.status = 201;
        Ok(serde_json::json!({"created": true}).into())
    }

    fn show(
        &mut self,
        _cx: &mut ActionContext<'_>,
        args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        match args[0].as_int() {
            Some(404) => Err(HttpError::not_found().message("book 404 not found").into()),
            Some(500) => Err(ActionError::fatal("database unavailable")),
            Some(id) => Ok(format!("<p>book {id}</p>").into()),
            None => Err(ActionError::fatal("id was not converted")),
        }
    }

    fn update(
        &mut self,
        _cx: &mut ActionContext<'_>,
        _args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        Ok(Content::Empty)
    }

    fn delete(
        &mut self,
        _cx: &mut ActionContext<'_>,
        _args: &[ParamValue],
    ) -> Result<Content, ActionError> {
        Err(HttpError::redirect("/books").into())
    }
}

impl Action for BooksAction {
    fn create(_req: &Request) -> Self {
        Self { blocked: false }
    }

    fn routes(routes: &mut Routes<Self>) {
        routes
            .map("")
            .get("index", Self::index)
            .post("create", Self::create_book);
        routes
            .map("/{id}")
            .get("show", Self::show)
            .put("update", Self::update)
            .delete("delete", Self::delete);
    }

    fn before_action(&mut self, cx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if cx.req.get_header("X-Block").is_some() {
            self.blocked = true;
            return Err(HttpError::new(403).message("blocked").into());
        }
        Ok(())
    }

    fn after_action(&mut self, cx: &mut ActionContext<'_>, failed: bool) {
        let state = match (self.blocked, failed) {
            (true, _) => "blocked",
            (false, true) => "failed",
            (false, false) => "ok",
        };
        cx.resp.headers.insert("X-After".to_string(), state.to_string());
    }
}

/// Application with `BooksAction` mounted at `/books`.
pub fn books_app() -> Application {
    let app = Application::new();
    app.mount("/books", HandlerRef::of::<BooksAction>())
        .unwrap_or_else(|e| panic!("mount failed: {e}"));
    app
}

/// Handler reference with GET routes whose action names equal their
/// templates.
pub fn declared(name: &str, templates: &[&str]) -> HandlerRef {
    let mappings = templates
        .iter()
        .map(|t| {
            let mut methods = MethodMap::new();
            methods.insert(Method::Get, ActionId::new(t));
            ((*t).to_string(), methods)
        })
        .collect();
    HandlerRef::declared(name, mappings)
}

/// Finds `path`, panicking on a miss or a conversion error.
pub fn find(app: &Application, path: &str) -> RouteMatch {
    app.find(path)
        .unwrap_or_else(|e| panic!("lookup of {path} failed: {e}"))
        .unwrap_or_else(|| panic!("no route for {path}"))
}

/// The GET action of a match.
pub fn action(found: &RouteMatch) -> &str {
    found
        .methods
        .get(&Method::Get)
        .map_or("", ActionId::as_str)
}
