//! One-off promotion run from the command line

use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use ledgerlens::config;
use ledgerlens::core::bootstrap::{connect_store, ServiceOptions, Services};
use ledgerlens::logging;
use ledgerlens::metrics::Metrics;
use ledgerlens::promotion::PromotionOptions;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "promote", about = "Promote feedback statistics into merchant hints")]
struct Args {
    /// Report what would be written without writing
    #[arg(long)]
    dry_run: bool,

    /// Also seed hints from merchant label majorities
    #[arg(long, env = "PROMOTION_SEED_MAJORITY")]
    seed_majority: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();
    let args = Args::parse();

    let metrics = Arc::new(Metrics::new()?);
    let store = connect_store(config::get_store_backend(), &metrics).await?;
    let mut options = ServiceOptions::from_env(&metrics).await;
    // The run only reads stats, hints and labels
    options.model = None;
    let services = Services::build(store, options, metrics).await;

    let report = services
        .promotion
        .run(
            PromotionOptions {
                dry_run: args.dry_run,
                seed_majority: args.seed_majority,
            },
            Utc::now(),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for c in &report.candidates {
            println!(
                "{:<32} {:<24} {:>9} conf={:.4} accept={} reject={} {:?}",
                c.merchant.as_str(),
                c.category_slug,
                c.source.as_str(),
                c.confidence,
                c.accept_count,
                c.reject_count,
                c.action
            );
        }
        println!(
            "{} candidates, {} written{}",
            report.candidates.len(),
            report.written,
            if report.dry_run { " (dry run)" } else { "" }
        );
    }
    Ok(())
}
