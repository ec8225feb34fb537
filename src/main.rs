use std::sync::Arc;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, Error, HttpServer};
use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

mod config;
mod db;
mod error;
mod knowledge;
mod llm;
mod middleware;
mod models;
mod orchestrator;
mod prompts;
mod render;
mod routes;
mod types;

pub use config::AppConfig;

use knowledge::{IngestLimits, KnowledgeBase};
use error::ApiError;
use llm::{ChatModel, OpenAiChatModel};
use middleware::auth::Authentication;
use orchestrator::{ChatOrchestrator, ChatSettings};
use prompts::Prompts;

pub struct AppState {
    pub pool: SqlitePool,
    pub orchestrator: Arc<ChatOrchestrator>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::logout,
        routes::auth::check_auth,
        routes::chat::chat,
        routes::conversation::list_conversations,
        routes::conversation::new_conversation,
        routes::conversation::get_conversation_messages,
        routes::conversation::rename_conversation,
        routes::conversation::delete_conversation,
        routes::health::ping,
    ),
    components(schemas(
        types::CredentialsRequest,
        types::StatusResponse,
        types::AuthStatusResponse,
        types::ChatRequest,
        types::ChatResponse,
        types::ConversationSummary,
        types::NewConversationResponse,
        types::MessageView,
        types::RenameConversationRequest,
        routes::health::PingResponse,
    )),
    tags(
        (name = "auth", description = "Accounts and the session cookie"),
        (name = "chat", description = "Questions for the admissions assistant"),
        (name = "conversations", description = "Conversation history of the logged-in user"),
        (name = "health", description = "Liveness"),
    )
)]
struct ApiDoc;

pub fn create_app(
    app_config: Arc<AppConfig>,
    app_state: Arc<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let cors = app_config
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(3600);

    let no_cache = DefaultHeaders::new()
        .add((header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
        .add((header::PRAGMA, "no-cache"))
        .add((header::EXPIRES, "0"));

    App::new()
        .wrap(Authentication {
            app_config: app_config.clone(),
        })
        .wrap(no_cache)
        .wrap(Logger::default())
        .wrap(cors)
        .app_data(web::Data::new(app_config))
        .app_data(web::Data::new(app_state))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            ApiError::Validation(err.to_string()).into()
        }))
        .app_data(
            web::PathConfig::default()
                .error_handler(|_err, _req| ApiError::NotFound("Conversation").into()),
        )
        .configure(routes::configure)
        .service(Scalar::with_url("/docs", ApiDoc::openapi()))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_config = Arc::new(AppConfig::from_env()?);
    let pool = db::connect(&app_config.database_url).await?;

    let data_dir = app_config.data_dir.clone();
    let limits = IngestLimits {
        max_depth: app_config.kb_max_depth,
        max_file_bytes: app_config.kb_max_file_bytes,
    };
    let knowledge_base =
        tokio::task::spawn_blocking(move || KnowledgeBase::build(&data_dir, &limits)).await?;
    info!(
        "Knowledge base holds {} chars: {:?}",
        knowledge_base.text().chars().count(),
        knowledge_base.report()
    );
    if knowledge_base.is_empty() {
        warn!(
            "No reference documents found under {}; answers will rely on the rules alone",
            app_config.data_dir.display()
        );
    }

    let rules = match &app_config.rules_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read rules file {}", path.display()))?,
        None => Prompts::RULES.to_string(),
    };

    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(&app_config));
    let orchestrator = ChatOrchestrator::new(
        model,
        &Prompts::instructions(&rules, knowledge_base.text()),
        &ChatSettings::from(app_config.as_ref()),
    )?;

    let app_state = Arc::new(AppState {
        pool,
        orchestrator: Arc::new(orchestrator),
    });

    let bind_address = app_config.bind_address.clone();
    info!("Listening on {}", bind_address);

    HttpServer::new(move || create_app(app_config.clone(), app_state.clone()))
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await?;

    Ok(())
}
