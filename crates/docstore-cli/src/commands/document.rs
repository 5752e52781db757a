//! Document command handlers

use anyhow::{bail, Context, Result};

use docstore_core::{RevertTarget, Store, VersionRange};

use crate::editor::{self, confirm};
use crate::output::Output;

/// Append a new version
///
/// Content comes from `--content`, then piped stdin, then the editor
/// (pre-filled with the current content).
pub fn write(
    store: &Store,
    author: &str,
    path: String,
    content: Option<String>,
    message: Option<String>,
    output: &Output,
) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None if editor::stdin_is_piped() => editor::read_stdin()?,
        None => {
            let current = store
                .show(&path, None)
                .map(|row| row.content)
                .unwrap_or_default();
            let edited = editor::edit_text(&current)?;
            if edited == current && !current.is_empty() {
                output.message("No changes made.");
                return Ok(());
            }
            edited
        }
    };

    let outcome = store
        .write(&path, &content, author, message.as_deref())
        .with_context(|| format!("Failed to write {}", path))?;

    output.print_outcome("Wrote", &outcome);
    Ok(())
}

/// Show one version
pub fn show(store: &Store, id: String, version: Option<u32>, output: &Output) -> Result<()> {
    let row = store.show(&id, version)?;
    output.print_version(&row);
    Ok(())
}

/// Show the version history of a document
pub fn history(
    store: &Store,
    id: String,
    range: Option<String>,
    include_deleted: bool,
    output: &Output,
) -> Result<()> {
    let rows = match range {
        Some(range) => store.history_range(&id, VersionRange::parse(&range)?)?,
        None => store.history(&id, include_deleted)?,
    };
    output.print_history(&rows);
    Ok(())
}

/// List documents under a prefix
pub fn list(store: &Store, prefix: Option<String>, include_deleted: bool, output: &Output) -> Result<()> {
    let rows = store.list(prefix.as_deref().unwrap_or(""), include_deleted)?;
    output.print_documents(&rows);
    Ok(())
}

/// Delete a document, one version, or everything under a prefix
pub fn delete(
    store: &Store,
    author: &str,
    id: String,
    version: Option<u32>,
    recursive: bool,
    output: &Output,
) -> Result<()> {
    if recursive {
        if output.should_prompt() {
            println!("Delete every document under: {}", id);
            if !confirm("Are you sure?")? {
                println!("Cancelled.");
                return Ok(());
            }
        }
        let outcomes = store
            .delete_recursive(&id, author)
            .with_context(|| format!("Failed to delete {}", id))?;
        output.print_outcomes("Deleted", &outcomes);
        return Ok(());
    }

    let outcome = match version {
        Some(n) => store.delete_version(&id, n, author),
        None => store.delete(&id, author),
    }
    .with_context(|| format!("Failed to delete {}", id))?;

    output.print_outcome("Deleted", &outcome);
    Ok(())
}

/// Restore a deleted document
pub fn restore(store: &Store, author: &str, id: String, output: &Output) -> Result<()> {
    let outcome = store
        .restore(&id, author)
        .with_context(|| format!("Failed to restore {}", id))?;
    output.print_outcome("Restored", &outcome);
    Ok(())
}

/// Move a document with its history
pub fn move_document(
    store: &Store,
    author: &str,
    from: String,
    to: String,
    output: &Output,
) -> Result<()> {
    let outcome = store
        .move_document(&from, &to, author)
        .with_context(|| format!("Failed to move {} to {}", from, to))?;
    output.print_outcome("Moved", &outcome);
    Ok(())
}

/// Copy a document's content into a new document
pub fn copy(store: &Store, author: &str, from: String, to: String, output: &Output) -> Result<()> {
    let outcome = store
        .copy(&from, &to, author)
        .with_context(|| format!("Failed to copy {} to {}", from, to))?;
    output.print_outcome("Copied", &outcome);
    Ok(())
}

/// Revert a document to an earlier version or key
pub fn revert(
    store: &Store,
    author: &str,
    id: String,
    target: String,
    message: Option<String>,
    output: &Output,
) -> Result<()> {
    let target = target.trim();
    if target.is_empty() {
        bail!("Revert target must be a version number or key");
    }
    let target = RevertTarget::parse(target);

    let outcome = store
        .revert(&id, &target, author, message.as_deref())
        .with_context(|| format!("Failed to revert {}", id))?;
    output.print_outcome("Reverted", &outcome);
    Ok(())
}
