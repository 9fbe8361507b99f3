use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod kpi;
mod models;
mod report;
mod store;

use models::KpiTable;
use store::PgRecordStore;

#[derive(Parser)]
#[command(name = "clinical-kpi-reporter")]
#[command(about = "KPI reporting over clinical monitoring event records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import event records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute the standard reporting windows and print the KPI table
    Kpis {
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Compute the standard reporting windows and write a markdown report
    Report {
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

/// Compute the three standard reporting windows into one shared table:
/// everything before the past week, the past week itself, and all time.
/// Callers serialize the window computations; the table has no locking.
async fn compute_standard_windows(
    store: &PgRecordStore,
    as_of: DateTime<Utc>,
) -> anyhow::Result<KpiTable> {
    let one_week_ago = as_of - Duration::days(7);
    // Postgres cannot store chrono's minimum timestamp; the epoch predates
    // every monitoring record and serves as the all-time lower bound.
    let beginning = DateTime::UNIX_EPOCH;

    let mut table = KpiTable::new();
    for (start, end, label) in [
        (beginning, one_week_ago, "up_to_last_week"),
        (one_week_ago, as_of, "past_week"),
        (beginning, as_of, "total"),
    ] {
        let outcome = kpi::compute_window(store, &mut table, start, end, label).await?;
        if outcome.malformed_evaluations > 0 {
            eprintln!(
                "warning: window {label} skipped {} record(s) with malformed evaluations",
                outcome.malformed_evaluations
            );
        }
    }

    Ok(table)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            store::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = store::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} events from {}.", csv.display());
        }
        Commands::Kpis { as_of } => {
            let as_of = as_of.unwrap_or_else(Utc::now);
            let store = PgRecordStore::new(pool);
            let table = compute_standard_windows(&store, as_of).await?;
            print!("{}", report::render_report(as_of, &table));
        }
        Commands::Report { as_of, out } => {
            let as_of = as_of.unwrap_or_else(Utc::now);
            let store = PgRecordStore::new(pool);
            let table = compute_standard_windows(&store, as_of).await?;
            std::fs::write(&out, report::render_report(as_of, &table))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
