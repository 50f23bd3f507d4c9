//! One-shot CLI: ask a question from the terminal, print the generated SQL,
//! and optionally run it.

use ai_sql_agent::api::{self, AppState};
use ai_sql_agent::config::Config;
use ai_sql_agent::db::{connect_pool, DbGateway};
use ai_sql_agent::llm::{LlmClient, SqlGenerator};
use ai_sql_agent::schema::CUSTOMERS_SCHEMA;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ai-sql-agent")]
#[command(about = "Turn a natural-language question into SQL, optionally executing it")]
struct Args {
    /// The question in natural language
    question: String,

    /// Also execute the generated SQL and print the rows
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let pool = connect_pool(&config.database_url).await?;
    let gateway = Arc::new(DbGateway::new(pool));

    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
        config.llm_timeout,
    )?;
    let generator = SqlGenerator::new(Arc::new(llm));
    let state = AppState::new(CUSTOMERS_SCHEMA, generator, gateway);

    if args.execute {
        let result = api::generate_and_execute(&state, &args.question).await?;
        println!("{}", result.sql);
        println!("{}", serde_json::to_string_pretty(&result.rows)?);
    } else {
        let result = api::generate_only(&state, &args.question).await?;
        println!("{}", result.sql);
    }

    Ok(())
}
