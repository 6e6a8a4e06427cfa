/// Data management command handlers
use anyhow::Result;
use sot_storage::Database;

pub fn handle_data_clear(yes: bool) -> Result<()> {
    let db = Database::new(None)?;
    clear_data(&db, yes)?;
    Ok(())
}

/// Without confirmation only lists what would go. Returns the records removed.
fn clear_data(db: &Database, yes: bool) -> Result<usize> {
    if !yes {
        let keys = db.keys()?;
        if keys.is_empty() {
            println!("Nothing is stored.");
            return Ok(0);
        }
        println!("This deletes the saved focus session and all settings:");
        for key in &keys {
            println!("  {key}");
        }
        println!("Run again with --yes to confirm.");
        return Ok(0);
    }

    let removed = db.clear_all()?;
    println!("Removed {removed} stored records.");
    println!("A running host keeps its in-memory session until it ends or restarts.");
    Ok(removed)
}
