//! Error types for routing and dispatch.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::action::ActionId;
use crate::response::status_text;

/// Boxed error produced by handler code.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised while building or compiling routes.
///
/// All of these are configuration mistakes and surface when the route is
/// mounted or the table is first compiled, never in the middle of serving.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A path template with stray braces or a malformed placeholder.
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A parameter fragment the regex engine rejects.
    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A mount target that is not a handler nor a list of children.
    #[error("mount('{path}'): {reason}")]
    InvalidMount { path: String, reason: String },

    /// A settings entry that cannot be applied.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// An HTTP verb outside the supported set.
    #[error("{0:?}: unknown request method")]
    UnknownMethod(String),

    /// A path parameter that could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// A path parameter matched its pattern but its converter rejected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{value}: {reason}")]
pub struct ConversionError {
    /// The raw captured text.
    pub value: String,
    /// Human readable cause.
    pub reason: String,
}

impl ConversionError {
    /// Creates a conversion error for `value`.
    pub fn new(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// A structured HTTP outcome raised by handler code or by the dispatcher.
///
/// The status, message and headers are copied verbatim into the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// HTTP status code.
    pub status: u16,
    /// Optional human readable message.
    pub message: Option<String>,
    /// Extra response headers.
    pub headers: Vec<(String, String)>,
}

impl HttpError {
    /// Creates an error with the given status and no message.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            message: None,
            headers: Vec::new(),
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a response header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// 400 Bad Request with a message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400).message(message)
    }

    /// 404 Not Found.
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// 302 Found pointing at `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        let location = location.into();
        Self::new(302)
            .message(format!("redirect to {location}"))
            .header("Location", location)
    }

    /// 301 Moved Permanently pointing at `location`.
    pub fn redirect_permanently(location: impl Into<String>) -> Self {
        let location = location.into();
        Self::new(301)
            .message(format!("redirect permanently to {location}"))
            .header("Location", location)
    }

    /// Returns the reason phrase for the status code.
    pub fn status_message(&self) -> &'static str {
        status_text(self.status)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.status_message())
    }
}

impl StdError for HttpError {}

impl From<ConversionError> for HttpError {
    fn from(err: ConversionError) -> Self {
        Self::bad_request(err.to_string())
    }
}

/// Failure returned by an action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Client-facing outcome rendered into the response.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Anything else. Not recovered by the dispatcher.
    #[error(transparent)]
    Fatal(BoxError),
}

impl ActionError {
    /// Wraps an arbitrary error as fatal.
    pub fn fatal(err: impl Into<BoxError>) -> Self {
        Self::Fatal(err.into())
    }
}

/// Errors that escape [`Application::dispatch`](crate::Application::dispatch).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler failed with a non-HTTP error.
    #[error("unhandled error in {handler}#{action}: {source}")]
    Unhandled {
        handler: String,
        action: ActionId,
        #[source]
        source: BoxError,
    },

    /// The route table could not be compiled.
    #[error(transparent)]
    Router(#[from] RouterError),
}
