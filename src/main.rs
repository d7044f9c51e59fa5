use sql_ai::answer::AnswerComposer;
use sql_ai::config::SqlAiConfig;
use sql_ai::execution::{PolarsEngine, QueryExecutor, ResultSet, TrinoEngine};
use sql_ai::execution_loop::{ConversationOrchestrator, QueryOutcome};
use sql_ai::llm::{LlmClient, ModelClient};
use sql_ai::prompt::{DateFilterPromptBuilder, DefaultPromptBuilder, GuidedPromptBuilder, SqlPromptBuilder};
use sql_ai::schema::SchemaContext;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MAX_PRINTED_ROWS: usize = 20;

#[derive(Parser)]
#[command(name = "sql-ai")]
#[command(about = "Answer natural-language questions by generating and running SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SQL, run it and answer the question
    Ask {
        /// The question in natural language
        question: String,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Generate and run SQL, print the query and rows without composing an answer
    Sql {
        /// The question in natural language
        question: String,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the supplied SQL once and answer the question from its rows
    RunSql {
        /// The question in natural language
        question: String,

        /// SQL to format and execute instead of generating one
        #[arg(long)]
        sql: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Polars,
    Trino,
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Path to the schema description (JSON)
    #[arg(short, long, default_value = "schema.json")]
    schema: PathBuf,

    /// Directory with one CSV/Parquet file per table (polars engine)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Query engine to run generated SQL on
    #[arg(long, value_enum, default_value_t = EngineKind::Polars)]
    engine: EngineKind,

    /// Attempts per question (overrides SQL_AI_MAX_RETRIES)
    #[arg(long)]
    max_retries: Option<usize>,

    /// Extra prompt guidelines, one per line
    #[arg(long)]
    guidelines: Option<PathBuf>,

    /// Require a filter on one of these date columns
    #[arg(long, value_delimiter = ',', conflicts_with = "guidelines")]
    date_columns: Vec<String>,

    /// Print how the model's SQL was rewritten
    #[arg(long)]
    show_format_log: bool,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask { question, common } => {
            let orchestrator = build_orchestrator(&common).await?;
            let cancel = cancel_on_ctrl_c();
            let answer = orchestrator.ask_with_cancellation(&question, &cancel).await?;
            print_query(&answer.query, common.show_format_log);
            println!("\n=== Answer ===");
            println!("{}", answer.text);
        }
        Commands::Sql { question, common } => {
            let orchestrator = build_orchestrator(&common).await?;
            let query = orchestrator.generate_sql(&question).await?;
            print_query(&query, common.show_format_log);
        }
        Commands::RunSql { question, sql, common } => {
            let orchestrator = build_orchestrator(&common).await?;
            let answer = orchestrator.answer_supplied_sql(&question, &sql).await?;
            print_query(&answer.query, common.show_format_log);
            println!("\n=== Answer ===");
            println!("{}", answer.text);
        }
    }

    Ok(())
}

async fn build_orchestrator(common: &CommonArgs) -> Result<ConversationOrchestrator> {
    let mut config = SqlAiConfig::read_env()?;
    if let Some(max_retries) = common.max_retries {
        config.orchestrator.max_retries = max_retries;
    }
    if let Some(api_key) = &common.api_key {
        config.llm.api_key = api_key.clone();
    }
    config.validate()?;
    if config.llm.api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; model calls will fail");
    }

    info!("Loading schema from {:?}", common.schema);
    let schema = Arc::new(
        SchemaContext::load(&common.schema)
            .map_err(|e| anyhow::anyhow!("Failed to load schema: {}", e))?,
    );
    info!("✅ Loaded {} tables", schema.tables().len());

    let llm = LlmClient::new(config.llm.clone())?;
    let answer_model: Arc<dyn ModelClient> = Arc::new(llm.with_temperature(config.answer_temperature));
    let model: Arc<dyn ModelClient> = Arc::new(llm);

    let executor: Arc<dyn QueryExecutor> = match common.engine {
        EngineKind::Polars => Arc::new(PolarsEngine::new(Arc::clone(&schema), common.data_dir.clone())),
        EngineKind::Trino => Arc::new(TrinoEngine::new(config.trino.clone())?),
    };
    if !executor.health_check().await {
        warn!("Engine {} failed its health check", executor.name());
    }

    let builder: Arc<dyn SqlPromptBuilder> = if !common.date_columns.is_empty() {
        Arc::new(DateFilterPromptBuilder::new(common.date_columns.clone()))
    } else if let Some(path) = &common.guidelines {
        Arc::new(GuidedPromptBuilder::from_guidelines_file(path)?)
    } else {
        Arc::new(DefaultPromptBuilder)
    };

    let composer = AnswerComposer::new(answer_model).with_bounds(config.answer_bounds);

    Ok(ConversationOrchestrator::new(schema, model, executor)
        .with_prompt_builder(builder)
        .with_composer(composer)
        .with_config(config.orchestrator)?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling question");
            token.cancel();
        }
    });
    cancel
}

fn print_query(query: &QueryOutcome, show_format_log: bool) {
    println!("\n=== SQL (attempt {}) ===", query.attempts);
    println!("{}", query.sql.sql);

    if show_format_log && !query.sql.log.is_empty() {
        println!("\n=== Format log ===");
        for line in &query.sql.log {
            println!("{}", line);
        }
    }

    println!("\n=== Rows ({}) ===", query.rows.row_count());
    print_rows(&query.rows);
}

fn print_rows(rows: &ResultSet) {
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }
    println!("{}", rows.columns.join(" | "));
    for row in rows.rows.iter().take(MAX_PRINTED_ROWS) {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    if rows.row_count() > MAX_PRINTED_ROWS {
        println!("... {} more rows", rows.row_count() - MAX_PRINTED_ROWS);
    }
}
