mod ask_cmd;
mod config;
mod plan_cmds;
mod serve_cmd;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use lifeplan_core::{Agent, Services};
use lifeplan_db::{PgPool, PgRecordStore, pool};

use config::LifeplanConfig;

#[derive(Parser)]
#[command(name = "lifeplan", about = "LLM-backed life planner: tasks, groceries and learning plans from free text")]
struct Cli {
    /// Database URL (overrides LIFEPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a lifeplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/lifeplan")]
        db_url: String,
        /// Model API key to store in the config file
        #[arg(long)]
        model_api_key: Option<String>,
        /// Nutrition API key to store in the config file
        #[arg(long)]
        nutrition_api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Send one message through the pipeline and print the response
    Ask {
        /// User the message is on behalf of
        #[arg(long)]
        user: String,
        /// Build a grocery plan instead of classifying the message
        #[arg(long)]
        grocery_plan: bool,
        /// The message
        text: String,
    },
    /// List a user's learning plans
    Plans {
        #[arg(long)]
        user: String,
    },
    /// Append weeks to a learning plan
    Extend {
        #[arg(long)]
        user: String,
        /// Plan ID to extend
        plan_id: String,
        /// Number of weeks to add
        #[arg(long, default_value_t = 4)]
        weeks: i64,
    },
}

/// Execute the `lifeplan init` command: write config file.
fn cmd_init(
    db_url: &str,
    model_api_key: Option<String>,
    nutrition_api_key: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let has_model_key = model_api_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        model: config::ModelSection {
            api_key: model_api_key,
            ..Default::default()
        },
        nutrition: config::NutritionSection {
            api_key: nutrition_api_key,
            ..Default::default()
        },
        ..Default::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if !has_model_key {
        println!("  model.api_key not set; export {} before serving.", config::ENV_MODEL_API_KEY);
    }
    println!();
    println!("Next: run `lifeplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `lifeplan db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &LifeplanConfig) -> anyhow::Result<()> {
    println!("Initializing lifeplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("lifeplan db-init complete.");
    Ok(())
}

/// Connect to the database and build the full dependency bundle.
async fn connect(resolved: &LifeplanConfig) -> anyhow::Result<(PgPool, Agent)> {
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let store = Arc::new(PgRecordStore::new(db_pool.clone()));
    let services =
        Services::build(&resolved.services, store).context("failed to build services")?;
    Ok((db_pool, Agent::new(Arc::new(services))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            model_api_key,
            nutrition_api_key,
            force,
        } => {
            cmd_init(&db_url, model_api_key, nutrition_api_key, force)?;
        }
        Commands::DbInit => {
            let resolved = LifeplanConfig::resolve(cli.database_url.as_deref())?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = LifeplanConfig::resolve(cli.database_url.as_deref())?;
            serve_cmd::run_serve(resolved, &bind, port).await?;
        }
        Commands::Ask {
            user,
            grocery_plan,
            text,
        } => {
            let resolved = LifeplanConfig::resolve(cli.database_url.as_deref())?;
            let (db_pool, agent) = connect(&resolved).await?;
            let result = ask_cmd::run_ask(&agent, &user, &text, grocery_plan).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plans { user } => {
            let resolved = LifeplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgRecordStore::new(db_pool.clone());
            let result = plan_cmds::run_list_plans(&store, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Extend {
            user,
            plan_id,
            weeks,
        } => {
            let resolved = LifeplanConfig::resolve(cli.database_url.as_deref())?;
            let (db_pool, agent) = connect(&resolved).await?;
            let result = plan_cmds::run_extend(&agent, &user, &plan_id, weeks).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
