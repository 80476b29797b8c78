//! restmodel command-line client.
//!
//! Usage:
//!   restmodel --base-url https://shop.example.com/api get bikes 1
//!   restmodel -c restmodel.json list bikes -p color=red

use anyhow::Result;
use clap::Parser;
use restmodel_cli::{Args, run};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
