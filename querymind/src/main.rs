use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use querymind::api::{ApiState, api_router};
use querymind::config::{Settings, redact_db_url};
use querymind::connector::DriverConnector;
use querymind::extractor::MetadataExtractor;
use querymind::llm::LlmGateway;
use querymind::nl2sql::NlToSql;
use querymind::vectorizer::embedder_for;
use sea_orm::Database;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "querymind", about = "QueryMind - schema-aware natural language to SQL")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API (default)
    Serve,
    /// Extract metadata for one registered database and print the report
    Extract {
        #[arg(long)]
        database: Uuid,
    },
    /// Translate a question into SQL for one registered database
    Ask {
        #[arg(long)]
        database: Uuid,
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    tracing::info!(database = %redact_db_url(&settings.database_url), "connecting to metadata store");
    let db = Database::connect(&settings.database_url).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("metadata store initialized");

    match cli.command {
        None | Some(Commands::Serve) => serve(db, settings).await?,
        Some(Commands::Extract { database }) => {
            let extractor = MetadataExtractor::new(
                db,
                settings.cipher.clone(),
                Arc::new(DriverConnector),
                settings.infer_relationships,
            );
            let report = extractor.extract(database).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(Commands::Ask { database, question }) => {
            let gateway = LlmGateway::new(settings.llm.clone())?;
            let translator = NlToSql::new(
                db,
                Arc::new(gateway),
                settings.llm.clone(),
                settings.prompt_token_budget,
            );
            let translation = translator.translate(&question, database).await?;
            for warning in &translation.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", serde_json::to_string_pretty(&translation)?);
        }
    }

    Ok(())
}

async fn serve(
    db: sea_orm::DatabaseConnection,
    settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = LlmGateway::new(settings.llm.clone())?;
    let embedder = embedder_for(&gateway);
    tracing::info!(
        model = %settings.llm.model,
        embedding_model = embedder.model(),
        "language model configured"
    );

    let state = ApiState::new(
        db,
        &settings,
        Arc::new(DriverConnector),
        Arc::new(gateway),
        embedder,
    );

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "API online");

    axum::serve(listener, api_router(state, &settings.cors_allowed_origins)).await?;
    Ok(())
}
