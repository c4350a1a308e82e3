use anyhow::Result;
use axum::{extract::Extension, http::HeaderValue, routing::get, Router};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthService;

pub mod handlers;
pub mod middleware;
mod openapi;

pub use openapi::openapi;

use self::{
    handlers::{auth, health},
    middleware::{correlation_id_header, cors_layer, make_span, rate_limit, RateLimiter},
};

/// Build the application router.
///
/// # Errors
/// Returns an error if the configured frontend URL is not a usable CORS origin.
pub fn router(service: Arc<AuthService>, limiter: Arc<dyn RateLimiter>) -> Result<Router> {
    let cors = cors_layer(service.config().frontend_base_url())?;

    let app = Router::new()
        .route("/health", get(health).options(health))
        .nest("/v1/auth", auth::routes())
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi()))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit::rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    correlation_id_header(),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(correlation_id_header()))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(service)),
        );

    Ok(app)
}

/// Periodically reap expired sessions, anonymous sessions, and spent one-time tokens.
pub fn spawn_cleanup_worker(
    service: Arc<AuthService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;

            match service.cleanup_expired().await {
                Ok(report) if !report.is_empty() => {
                    info!(
                        sessions = report.sessions,
                        anonymous_sessions = report.anonymous_sessions,
                        one_time_tokens = report.one_time_tokens,
                        "expired records removed"
                    );
                }
                Ok(_) => {}
                Err(err) => error!("session cleanup failed: {err}"),
            }
        }
    })
}

/// Start the server
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    service: Arc<AuthService>,
    limiter: Arc<dyn RateLimiter>,
    cleanup_interval: Duration,
) -> Result<()> {
    let app = router(service.clone(), limiter)?;

    let cleanup = spawn_cleanup_worker(service, cleanup_interval);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    cleanup.abort();

    Ok(())
}
