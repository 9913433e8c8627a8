//! Status command - show snapshot status and statistics.

use crate::app::App;
use wasp_core::{Config, DocumentStore};

/// Run the status command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::new(config)?;

    println!("wasp Index Status");
    println!("=================");
    println!();

    if app.index.is_empty() {
        println!("Index is empty. Run 'wasp index' to index your archives.");
    } else {
        let stats = app.index.stats();
        println!("Summary:");
        println!("  Pages:           {}", stats.pages);
        println!("  Revisits:        {}", stats.revisits);
        println!("  Total documents: {}", stats.total_documents());
        println!("  Requests:        {}", stats.requests);
    }

    println!();
    match app.config.archive.directory {
        Some(ref dir) => println!("Archive directory: {}", dir.display()),
        None => println!("Archive directory: (not configured)"),
    }
    println!("Snapshot:          {}", app.snapshots.snapshot_path().display());

    Ok(())
}
