//! Clear command - delete stored snapshots.

use std::fs;
use std::io::{self, BufRead, Write};
use tracing::info;
use wasp_core::{Config, SnapshotStore};

/// Run the clear command.
pub fn run(config: Config, skip_confirm: bool) -> anyhow::Result<()> {
    let data_dir = config.data_dir()?;
    let snapshots = SnapshotStore::new(&data_dir);
    let files = snapshots.files();

    if files.is_empty() {
        println!("No snapshot data in {}.", data_dir.display());
        return Ok(());
    }

    for path in &files {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("  {} ({} bytes)", path.display(), size);
    }

    if !skip_confirm {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        if !confirm(&mut stdin.lock(), &mut stdout, "Delete these files?")? {
            println!("Kept.");
            return Ok(());
        }
    }

    snapshots.clear()?;
    info!(data_dir = %data_dir.display(), files = files.len(), "Snapshot data cleared");
    println!("Removed {} file(s).", files.len());

    Ok(())
}

/// Ask a yes/no question; anything but `y` or `yes` declines.
fn confirm(input: &mut impl BufRead, output: &mut impl Write, question: &str) -> io::Result<bool> {
    write!(output, "{} [y/N] ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use wasp_core::MemoryIndex;

    fn answer(text: &str) -> bool {
        let mut output = Vec::new();
        let accepted = confirm(&mut Cursor::new(text), &mut output, "Delete?").unwrap();
        assert_eq!(output, b"Delete? [y/N] ");
        accepted
    }

    #[test]
    fn test_confirm() {
        assert!(answer("y\n"));
        assert!(answer("YES\n"));
        assert!(!answer("n\n"));
        assert!(!answer("\n"));
        // EOF declines
        assert!(!answer(""));
    }

    #[test]
    fn test_clear_without_prompt() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.data_dir = Some(dir.path().to_path_buf());
        let snapshots = SnapshotStore::new(dir.path());
        snapshots.save(&MemoryIndex::new()).unwrap();

        run(config.clone(), true).unwrap();
        assert!(snapshots.files().is_empty());
        // Nothing left to clear
        run(config, true).unwrap();
    }
}
