//! HTTP server for the AI-to-SQL agent
//!
//! Startup order: load config, connect the database, build the generator
//! client, then bind routes.

use ai_sql_agent::api::AppState;
use ai_sql_agent::config::Config;
use ai_sql_agent::db::{connect_pool, DbGateway};
use ai_sql_agent::llm::{LlmClient, SqlGenerator};
use ai_sql_agent::schema::CUSTOMERS_SCHEMA;
use ai_sql_agent::server;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!(model = %config.model, "starting ai-sql-agent");

    let pool = connect_pool(&config.database_url).await?;
    let gateway = Arc::new(DbGateway::new(pool));

    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
        config.llm_timeout,
    )?;
    let generator = SqlGenerator::new(Arc::new(llm));

    let state = Arc::new(AppState::new(CUSTOMERS_SCHEMA, generator, gateway));
    server::run(state, &config.bind_addr).await?;

    Ok(())
}
