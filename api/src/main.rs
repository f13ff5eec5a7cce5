use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod drafter;
mod error;
mod middleware;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cadence API",
        version = "0.1.0",
        description = "Chat-driven training-plan editing. Free text goes in; versioned, \
                       safety-validated plan changes come out, always via an explicit \
                       preview-then-commit round-trip."
    ),
    paths(
        routes::health::health_check,
        routes::plans::get_plan,
        routes::plans::commit_preview,
        routes::chat::chat_draft,
        routes::chat::chat_clarification,
        routes::chat::chat_intervention,
    ),
    components(schemas(
        HealthResponse,
        cadence_core::error::ApiError,
        cadence_core::plan::Plan,
        cadence_core::plan::PlanItem,
        cadence_core::plan::ItemStatus,
        cadence_core::plan::Operation,
        cadence_core::plan::Modification,
        cadence_core::plan::ModificationDelta,
        cadence_core::dates::DateOption,
        cadence_core::dates::DateRange,
        cadence_core::preview::PreviewSet,
        cadence_core::preview::PreviewSummary,
        cadence_core::clarification::ClarificationRequest,
        cadence_core::validation::ValidationIssue,
        cadence_core::intervention::InterventionReason,
        cadence_core::intervention::AlternativeKey,
        cadence_core::intervention::InterventionAlternative,
        cadence_core::commit::CommitRequest,
        routes::plans::CommitResponse,
        routes::chat::DraftRequest,
        routes::chat::DraftResponse,
        routes::chat::ClarificationResponseRequest,
        routes::chat::InterventionReplyRequest,
    ))
)]
struct ApiDoc;

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
                .unwrap_or_else(|_| "cadence_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        db: pool,
        drafter: drafter::DrafterClient::from_env(),
    };

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-surface rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::plans::read_router().layer(middleware::rate_limit::plans_read_layer()))
        .merge(routes::plans::commit_router().layer(middleware::rate_limit::commit_layer()))
        .merge(routes::chat::router().layer(middleware::rate_limit::chat_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Cadence API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
