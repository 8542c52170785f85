mod detect;
mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::results::ResultsCommands;

#[derive(Debug, Parser)]
#[command(name = "peoplecount-cli")]
#[command(about = "People counting service command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect or delete stored detection results
    Results {
        #[command(subcommand)]
        command: ResultsCommands,
    },
    /// Count persons in a local image without storing a result
    Detect {
        /// Image file to run detection on
        image: PathBuf,
        /// Where to write the annotated image (defaults to the static dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("peoplecount-cli: run with --help to list commands");
        return Ok(());
    };

    let config = peoplecount_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::debug!(?command, env = %config.env, "running command");

    match command {
        Commands::Detect { image, output_dir } => {
            detect::run_detect(&config, &image, output_dir).await?;
        }
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    peoplecount_db::health_check(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = peoplecount_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Commands::Results { command } => {
            let pool = connect(&config).await?;
            match command {
                ResultsCommands::List => results::run_results_list(&pool, &config).await?,
                ResultsCommands::Delete { id } => {
                    results::run_results_delete(&pool, id).await?;
                    println!("deleted result {id}");
                }
            }
        }
    }

    Ok(())
}

async fn connect(config: &peoplecount_core::AppConfig) -> anyhow::Result<sqlx::SqlitePool> {
    let pool_config = peoplecount_db::PoolConfig::from_app_config(config);
    let pool = peoplecount_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}
