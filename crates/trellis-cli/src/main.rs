//! trellis CLI
//!
//! Command-line tool for inspecting route files.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use trellis_router::{Application, Method, Resolution, RouteFile, RouterError};

/// Inspect and test trellis route files.
#[derive(Parser)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Route file (TOML).
    #[arg(short, long, env = "TRELLIS_ROUTES", default_value = "routes.toml")]
    routes: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every mounted route.
    Show,

    /// Resolve a request method and path.
    Match {
        /// Request method, such as GET.
        method: String,

        /// Request path.
        path: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let routes = RouteFile::load(&cli.routes)
        .with_context(|| format!("failed to load {}", cli.routes.display()))?;
    let app = routes.build()?;
    // Compile now so a bad route fails before any lookup.
    app.routes()?;

    match cli.command {
        Commands::Show => print!("{}", app.show_mappings()),
        Commands::Match { method, path } => {
            debug!(method = %method, path = %path, "resolving");
            println!("{}", describe(&app, &method, &path)?);
        }
    }
    Ok(())
}

/// Describes how `app` answers `method` and `path`.
fn describe(app: &Application, method: &str, path: &str) -> Result<String, RouterError> {
    let method = match method.parse::<Method>() {
        Ok(method) => method,
        Err(err) => return Ok(format!("400 Bad Request: {err}")),
    };

    match app.resolve(method, path) {
        Ok(Resolution::Matched { route, action }) => {
            let mut out = format!("200 {}#{action}", route.handler.name());
            for (name, value) in route.param_names.iter().zip(&route.param_values) {
                let _ = write!(out, "\n{name} = {value}");
            }
            Ok(out)
        }
        Ok(Resolution::NotFound) => Ok("404 Not Found".to_string()),
        Ok(Resolution::MethodNotAllowed { allowed }) => {
            let allowed: Vec<_> = allowed.iter().map(Method::as_str).collect();
            Ok(format!(
                "405 Method Not Allowed (allow: {})",
                allowed.join(", ")
            ))
        }
        Err(RouterError::Conversion(err)) => Ok(format!("400 Bad Request: {err}")),
        Err(err) => Err(err),
    }
}
