//! # pngstash: data URL image drop
//!
//! `pngstash` is a small HTTP service that accepts images encoded as base64 `data:image/png` URLs,
//! stores them as files named after the uploading site and the upload time, and serves the stored
//! files back as static content.
//!
//! ## Overview
//!
//! Browser-side tools that can only produce canvas snapshots as data URLs post them here together
//! with a site name. The service decodes the payload, checks that it really is a PNG, writes it as
//! `<site>-<YYYYMMDDhhmmss>.png` into the image directory and answers with the stored filename.
//! The file is then available at `/images/<filename>`.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum). Everything that touches
//! an upload lives in [`ingest`], which knows nothing about HTTP: [`ingest::data_url`] parses the
//! data URL, [`ingest::naming`] derives filenames, and [`ingest::ImageIngestor`] ties them together
//! with the write to disk. The HTTP surface in [`api`] only adapts requests and responses.
//!
//! ### Request Flow
//!
//! A `POST /stringtopng` passes the trace layer and the CORS layer, then the basic-auth middleware
//! from [`auth`]. The handler parses the JSON body, hands it to the ingestor and maps the outcome to
//! a response. When an index database is configured, a record of the stored file is written from a
//! background task (see [`index`]); the response never waits for it.
//!
//! Stored files are served by `tower_http::services::ServeDir` under `/images/` without
//! authentication.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use pngstash::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = pngstash::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     pngstash::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod index;
pub mod ingest;
mod openapi;
pub mod telemetry;

#[cfg(test)]
mod test;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{MethodRouter, get, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    api::handlers::images,
    auth::middleware::basic_auth_middleware,
    config::CorsOrigin,
    index::{ImageIndex, PostgresImageIndex},
    ingest::ImageIngestor,
    openapi::ApiDoc,
};

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `config`: Application configuration loaded from file/environment
/// - `ingestor`: The upload pipeline, shared immutably
/// - `index`: Optional best-effort record of stored images
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .ingestor(Arc::new(ingestor))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub ingestor: Arc<ImageIngestor>,
    pub index: Option<Arc<dyn ImageIndex>>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    // A wildcard entry allows every origin; tower-http refuses "*" inside an origin list.
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the upload route: POST only, body-size bounded, behind basic auth when enabled.
fn upload_route(state: &AppState) -> MethodRouter<AppState> {
    let route = post(images::create_image)
        .fallback(images::reject_method)
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_size));

    if state.config.auth.enabled {
        route.route_layer(from_fn_with_state(state.clone(), basic_auth_middleware))
    } else {
        route
    }
}

/// Build the application router with all endpoints and middleware
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload = upload_route(state);

    let router = Router::new()
        .route("/stringtopng", upload.clone())
        .route("/stringtopng/", upload)
        .route("/healthz", get(|| async { "OK" }))
        .with_state(state.clone())
        .nest_service("/images", ServeDir::new(&state.config.image_dir))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer);

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Make sure the image directory exists and is a directory.
async fn prepare_image_dir(config: &Config) -> anyhow::Result<()> {
    let dir = &config.image_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create image directory {}: {}", dir.display(), e))?;

    let metadata = tokio::fs::metadata(dir).await?;
    if !metadata.is_dir() {
        anyhow::bail!("Image directory {} is not a directory", dir.display());
    }
    Ok(())
}

pub struct Application {
    router: Router,
    config: Config,
    index: Option<PostgresImageIndex>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            "Starting pngstash: image_dir={}, auth_enabled={}, index_enabled={}",
            config.image_dir.display(),
            config.auth.enabled,
            config.index.url.is_some()
        );

        prepare_image_dir(&config).await?;

        let ingestor = ImageIngestor::builder()
            .image_dir(config.image_dir.clone())
            .collision(config.naming.collision)
            .verify_signature(config.naming.verify_signature)
            .build();

        let index = index::setup_index(&config.index).await?;

        let app_state = AppState::builder()
            .config(config.clone())
            .ingestor(Arc::new(ingestor))
            .maybe_index(index.clone().map(|i| Arc::new(i) as Arc<dyn ImageIndex>))
            .build();

        let router = build_router(&app_state)?;

        Ok(Self { router, config, index })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "pngstash listening on http://{}, storing images in {}",
            bind_addr,
            self.config.image_dir.display()
        );
        if let Some(root) = &self.config.root {
            info!("Document root: {}", root);
        }

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(index) = self.index {
            info!("Closing index connections...");
            index.close().await;
        }

        Ok(())
    }
}
