//! # Feed Test Utility
//!
//! Fetches one page of the 80.lv article listing and prints every record together with
//! the verdict of the filter rules configured in the environment.
//!
//! ## Usage
//!
//! ```
//! # Latest five articles
//! cargo run --bin test_feed -- --limit 5
//!
//! # Second page, raw JSON instead of the summary
//! cargo run --bin test_feed -- --page 2 --limit 10 --json
//! ```
//!
//! Filter rules are read from `LV_FILTER_KEYWORDS`, `LV_FILTER_EXCLUDE_KEYWORDS`,
//! `LV_FILTER_CATEGORIES` and `LV_FILTER_EXCLUDE_CATEGORIES`.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use lvwatch::config::Settings;
use lvwatch::feed::{create_http_client, fetch_listing_page, parse_listing, DEFAULT_API_URL};
use lvwatch::filter::should_keep;
use lvwatch::logging;
use lvwatch::render::format_date;

#[derive(Parser, Debug)]
#[clap(about = "Fetch one page of the 80.lv listing and show filter verdicts")]
struct Args {
    /// Page number, starting at 1
    #[clap(long, default_value = "1")]
    page: usize,

    /// Articles per page
    #[clap(long, default_value = "5")]
    limit: usize,

    /// Listing API URL
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Print the parsed records as JSON
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let args = Args::parse();
    let rules = Settings::from_env().filter;

    println!("Fetching page {} (limit {}) from {}", args.page, args.limit, args.api_url);

    let client = create_http_client()?;
    let body = fetch_listing_page(&client, &args.api_url, args.page.max(1), args.limit).await?;
    let records = parse_listing(&body)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("\n{}", "═".repeat(100).bright_blue());
    println!(
        "{}  {} records",
        "FEED DIAGNOSTICS".bright_blue(),
        records.len().to_string().bright_yellow()
    );
    if rules.is_empty() {
        println!("{}", "No filter rules configured".dimmed());
    }
    println!("{}", "═".repeat(100).bright_blue());

    for record in &records {
        let verdict = if should_keep(record, &rules) {
            "KEEP".bright_green()
        } else {
            "DROP".bright_red()
        };
        println!("\n[{}] {} {}", verdict, record.id.bright_magenta(), record.title.bold());
        println!("{}: {}", "URL".bright_blue(), record.url());
        println!("{}: {}", "Date".bright_blue(), format_date(&record.date));
        println!("{}: {}", "Author".bright_blue(), record.author);
        if record.categories.is_empty() {
            println!("{}: {}", "Categories".bright_blue(), "None".dimmed());
        } else {
            println!("{}: {}", "Categories".bright_blue(), record.categories.join(", "));
        }
        if !record.thumbnail.is_empty() {
            println!("{}: {}", "Thumbnail".bright_blue(), record.thumbnail);
        }
        if !record.excerpt.is_empty() {
            let excerpt: String = record.excerpt.chars().take(160).collect();
            println!("{}", excerpt.dimmed());
        }
    }

    Ok(())
}
