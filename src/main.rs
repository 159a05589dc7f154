use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quality_monitor::{seed, serve, train};
use sea_orm::Database;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inventory and quality monitoring service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: SubCommandArgs,
    /// Database connection string, e.g. sqlite://quality_monitor.db?mode=rwc
    #[arg(short = 'u', long, default_value = "sqlite://quality_monitor.db?mode=rwc")]
    db_url: String,
    #[arg(short = 's', long, default_value = "256")]
    txn_size: u32,
    #[arg(short = 'c', long, default_value = "4")]
    concurrent: u32,
}

#[derive(Subcommand, Debug)]
enum SubCommandArgs {
    /// Run the HTTP service.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
        #[arg(long, default_value = "models/quality_classifier")]
        model_path: PathBuf,
        #[arg(long, default_value = "static/uploads")]
        upload_dir: PathBuf,
    },
    /// Insert randomly generated demo products.
    Seed {
        #[arg(long)]
        product_count: u32,
    },
    /// Train the quality classifier from a directory of labeled images.
    Train {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long, default_value = "models/quality_classifier")]
        model_path: PathBuf,
        #[arg(long, default_value = "10")]
        epochs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    match args.command {
        SubCommandArgs::Serve {
            bind,
            model_path,
            upload_dir,
        } => {
            let db = Database::connect(&args.db_url)
                .await
                .context("Failed to connect to database")?;
            serve::execute(db, &bind, &model_path, upload_dir).await?;
        }
        SubCommandArgs::Seed { product_count } => {
            let db = Database::connect(&args.db_url)
                .await
                .context("Failed to connect to database")?;
            seed::execute(
                &db,
                seed::Config {
                    product_count,
                    txn_size: args.txn_size,
                    concurrent: args.concurrent,
                },
            )
            .await?;
        }
        SubCommandArgs::Train {
            data_dir,
            model_path,
            epochs,
        } => {
            train::execute(&data_dir, &model_path, epochs)?;
        }
    }
    Ok(())
}
