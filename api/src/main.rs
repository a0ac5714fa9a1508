use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutorgate_core::disclosure::AttemptGate;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod completion;
mod config;
mod error;
mod extract;
mod middleware;
mod pipeline;
mod routes;
mod state;
mod verification;

use completion::HttpCompletionClient;
use config::AppConfig;
use pipeline::TutorPipeline;
use verification::{HttpVerificationService, NoVerification, VerificationService};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tutorgate API",
        version = "0.1.0",
        description = "Mediates between learners or educators and a language model. Hints first, answers only when earned."
    ),
    paths(routes::health::health_check, routes::tutor::tutor),
    components(schemas(
        HealthResponse,
        routes::tutor::TutorResponse,
        tutorgate_core::request::RawTutoringRequest,
        tutorgate_core::error::ApiError,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorgate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        model = %config.model.model,
        base_url = %config.model.base_url,
        rewrite_rounds = config.pipeline.rewrite_rounds,
        call_timeout_ms = config.pipeline.call_timeout.as_millis() as u64,
        verification = config.verify_url.is_some(),
        "configuration loaded"
    );

    let completion = match HttpCompletionClient::new(config.model.clone()) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "cannot build model endpoint");
            std::process::exit(1);
        }
    };
    let verifier: Arc<dyn VerificationService> = match config.verify_url.clone() {
        Some(url) => match HttpVerificationService::new(url, config.pipeline.call_timeout) {
            Ok(service) => Arc::new(service),
            Err(err) => {
                tracing::error!(error = %err, "cannot build verification client");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("TUTOR_VERIFY_URL not set; every caller is treated as unverified");
            Arc::new(NoVerification)
        }
    };
    let pipeline = TutorPipeline::new(
        Arc::new(completion),
        verifier,
        Arc::new(AttemptGate::default()),
        config.pipeline,
    );
    let app_state = state::AppState {
        pipeline: Arc::new(pipeline),
    };

    let router = app(app_state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "cannot bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!("Tutorgate API listening on {}", addr);

    if let Err(err) = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %err, "server stopped");
    }
}

fn app(state: state::AppState, config: &AppConfig) -> Router {
    let routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::tutor::router().layer(middleware::rate_limit::tutor_layer()))
        .with_state(state);
    with_service_layers(routes, config)
}

/// Cross-cutting layers. `CatchPanicLayer` wraps everything else: its boxed
/// body cannot sit under an axum `from_fn` middleware.
fn with_service_layers(router: Router, config: &AppConfig) -> Router {
    let request_id = HeaderName::from_static("x-request-id");
    router
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .option_layer(config.require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(middleware::cors::build_cors_layer(&config.cors_origins)),
        )
        .layer(CatchPanicLayer::custom(error::panic_response))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested; draining in-flight requests");
}
