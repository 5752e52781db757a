//! Link command handlers

use anyhow::{Context, Result};

use docstore_core::{LinkDirection, Store};

use crate::output::Output;

/// Link two documents
pub fn create(
    store: &Store,
    from: String,
    to: String,
    tag: Option<String>,
    output: &Output,
) -> Result<()> {
    let link = store
        .link(&from, &to, tag.as_deref())
        .with_context(|| format!("Failed to link {} to {}", from, to))?;

    output.success(&format!(
        "Linked {} -> {} ({})",
        link.from_path, link.to_path, link.id
    ));
    Ok(())
}

/// Remove links between two documents
pub fn remove(
    store: &Store,
    from: String,
    to: String,
    tag: Option<String>,
    output: &Output,
) -> Result<()> {
    let removed = store
        .unlink(&from, &to, tag.as_deref())
        .with_context(|| format!("Failed to unlink {} from {}", from, to))?;

    output.success(&format!("Removed {} link(s) from {} to {}", removed, from, to));
    Ok(())
}

/// List links touching a document
pub fn list(
    store: &Store,
    id: String,
    direction: LinkDirection,
    include_deleted: bool,
    output: &Output,
) -> Result<()> {
    let path = store
        .resolve(&id, true)
        .map(|resolved| resolved.row.path)
        .unwrap_or_else(|_| id.clone());
    let links = store.links(&id, direction, include_deleted)?;

    output.print_links(&path, &links);
    Ok(())
}

/// List documents with no active links
pub fn orphans(store: &Store, output: &Output) -> Result<()> {
    let paths = store.orphans()?;
    output.print_paths(&paths, "No orphaned documents.");
    Ok(())
}
