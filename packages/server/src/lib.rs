#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the run club map.
//!
//! Serves the club collection built from the spreadsheet at
//! `/api/runclubs` and, when configured, the built frontend. The endpoint
//! is fail-soft: whatever happens upstream, the browser gets a valid
//! (possibly empty) `FeatureCollection`.

pub mod config;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::http::{Method, header};
use actix_web::{App, HttpServer, middleware, web};
use runclub_map_club_models::SchemaVersion;
use runclub_map_sheet::RowSource;
use runclub_map_sheet::config::SheetConfig;
use runclub_map_sheet::google::GoogleSheetsClient;

pub use config::{ConfigError, ServerConfig};

/// Shared application state.
pub struct AppState {
    /// Where club rows come from.
    pub source: Arc<dyn RowSource>,
    /// Candidate ranges, tried in order.
    pub ranges: Vec<String>,
    /// Column layout of the rows.
    pub schema: SchemaVersion,
}

impl AppState {
    /// State reading the spreadsheet described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Sheet`] if the Sheets client cannot be built.
    pub fn from_sheet_config(config: SheetConfig) -> Result<Self, ConfigError> {
        let ranges = config.ranges.clone();
        let schema = config.schema;
        let client = GoogleSheetsClient::new(config)?;
        Ok(Self {
            source: Arc::new(client),
            ranges,
            schema,
        })
    }

    /// State reading the spreadsheet configured in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Sheet`] if the spreadsheet variables are
    /// missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sheet_config(SheetConfig::from_env()?)
    }
}

/// CORS policy: any origin, `GET` and `OPTIONS`, `Content-Type`.
#[must_use]
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(["GET", "OPTIONS"])
        .allowed_header(header::CONTENT_TYPE)
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .service(
                web::resource("/runclubs")
                    .route(web::get().to(handlers::runclubs))
                    .route(web::method(Method::OPTIONS).to(handlers::options))
                    .default_service(web::to(handlers::method_not_allowed)),
            ),
    );
}

/// Starts the run club API server.
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`) and initializes logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig, state: AppState) -> std::io::Result<()> {
    let state = web::Data::new(state);
    let static_dir: Option<PathBuf> = config.static_dir.clone();

    if let Some(dir) = &static_dir {
        log::info!("Serving frontend from {}", dir.display());
    }
    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let static_dir = static_dir.clone();

        App::new()
            .wrap(cors())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
            .configure(move |cfg| {
                if let Some(dir) = static_dir {
                    cfg.service(Files::new("/", dir).index_file("index.html"));
                }
            })
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}
