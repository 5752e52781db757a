//! Vacuum command handler

use std::time::Duration;

use anyhow::{bail, Context, Result};

use docstore_core::{Store, VacuumOptions};

use crate::editor::confirm;
use crate::output::Output;

/// Permanently remove tombstoned versions
pub fn run(
    store: &Store,
    older_than: Option<String>,
    prefix: String,
    dry_run: bool,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let mut options = VacuumOptions::default().prefix(prefix).dry_run(dry_run);
    if let Some(ref age) = older_than {
        options = options.older_than(parse_age(age)?);
    }

    if !dry_run && !yes && output.should_prompt() {
        let preview = store
            .vacuum(&options.clone().dry_run(true))
            .context("Failed to preview vacuum")?;
        if preview.deleted_count == 0 {
            output.message("Nothing to vacuum.");
            return Ok(());
        }
        println!(
            "Permanently remove {} version row(s) across {} path(s)?",
            preview.deleted_count,
            preview.affected_paths.len()
        );
        if !confirm("This cannot be undone. Continue?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let report = store.vacuum(&options).context("Vacuum failed")?;
    output.print_vacuum_report(&report);
    Ok(())
}

/// Parse an age such as `30d`, `12h`, `45m`, `90s` or `2w`
///
/// A bare number is taken as days.
pub fn parse_age(input: &str) -> Result<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    if number.is_empty() {
        bail!("Invalid age '{}': expected a number like 30d", input);
    }
    let amount: u64 = number
        .parse()
        .with_context(|| format!("Invalid age '{}'", input))?;

    let seconds_per_unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "" | "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => bail!(
            "Invalid age unit '{}' in '{}': use s, m, h, d or w",
            unit,
            input
        ),
    };

    match amount.checked_mul(seconds_per_unit) {
        Some(seconds) => Ok(Duration::from_secs(seconds)),
        None => bail!("Age '{}' is too large", input),
    }
}
