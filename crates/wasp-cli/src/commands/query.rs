//! Query command - search the indexed pages.

use crate::app::{parse_query, App};
use crate::OutputFormat;
use std::time::Instant;
use wasp_core::{Config, DocumentStore};

/// Run the query command.
pub fn run(
    config: Config,
    terms: &str,
    from: Option<&str>,
    to: Option<&str>,
    page: usize,
    page_size: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let query = parse_query(terms, from, to)?;
    let app = App::new(config)?;

    if app.index.is_empty() {
        eprintln!("Index is empty. Run 'wasp index' first.");
        return Ok(());
    }

    let fetcher = app.fetcher(query, page_size)?;
    let start = Instant::now();
    let results = fetcher.fetch(page)?;
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            for result in &results {
                println!("{}", result);
                println!();
            }

            eprintln!(
                "Page {}: {} results for {} in {:.3}ms",
                page.max(1),
                results.len(),
                fetcher.query(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}
