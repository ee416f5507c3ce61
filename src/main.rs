use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use rendezvous::config::AppConfig;
use rendezvous::db::{SqliteStore, Store};
use rendezvous::handlers;
use rendezvous::services::ai::azure::AzureOpenAiProvider;
use rendezvous::services::ai::extractor::AppointmentExtractor;
use rendezvous::services::ai::ollama::OllamaProvider;
use rendezvous::services::ai::openai::OpenAiProvider;
use rendezvous::services::ai::responder::ChatResponder;
use rendezvous::services::ai::LlmProvider;
use rendezvous::services::calendar::{GoogleCalendarApi, GoogleCalendarSink};
use rendezvous::services::orchestrator::AppointmentOrchestrator;
use rendezvous::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database_url)?);

    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "openai" => {
            anyhow::ensure!(!config.openai_api_key.is_empty(), "OPENAI_API_KEY must be set when LLM_PROVIDER=openai");
            tracing::info!("using OpenAI-compatible LLM provider (model: {})", config.openai_model);
            Arc::new(OpenAiProvider::new(
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
                config.openai_model.clone(),
            ))
        }
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Arc::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
        _ => {
            anyhow::ensure!(
                !config.azure_openai_endpoint.is_empty() && !config.azure_openai_api_key.is_empty(),
                "AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY must be set when LLM_PROVIDER=azure"
            );
            tracing::info!("using Azure OpenAI LLM provider (deployment: {})", config.azure_openai_deployment);
            Arc::new(AzureOpenAiProvider::new(
                config.azure_openai_endpoint.clone(),
                config.azure_openai_api_key.clone(),
                config.azure_openai_deployment.clone(),
                config.azure_openai_api_version.clone(),
            ))
        }
    };

    let calendar_api = GoogleCalendarApi::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    let consent_url = calendar_api.authorization_url(&config.google_redirect_uri);
    let calendar = GoogleCalendarSink::new(
        Box::new(calendar_api),
        config.google_calendar_id.clone(),
        config.google_refresh_token.clone(),
        config.timezone,
        config.calendar_timeout,
    )
    .with_consent_url(consent_url);
    if !calendar.has_credential() {
        tracing::warn!("GOOGLE_REFRESH_TOKEN not set, appointments will carry placeholder event ids");
    }

    let orchestrator = AppointmentOrchestrator::new(
        store.clone(),
        AppointmentExtractor::new(llm.clone(), config.timezone, config.llm_timeout),
        Arc::new(calendar),
        ChatResponder::new(llm, config.llm_timeout),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        orchestrator,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations)
                .post(handlers::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:id/messages",
            get(handlers::conversations::list_messages).post(handlers::conversations::send_message),
        )
        .route("/api/appointments", get(handlers::appointments::list_appointments))
        .route(
            "/api/appointments/:id",
            get(handlers::appointments::get_appointment).patch(handlers::appointments::update_status),
        )
        .route("/api/appointments/:id/ics", get(handlers::appointments::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(timezone = %config.timezone, "starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
