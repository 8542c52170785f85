//! Detection-result command handlers for the CLI.

use clap::Subcommand;
use peoplecount_core::public_image_url;

/// Sub-commands available under `results`.
#[derive(Debug, Subcommand)]
pub enum ResultsCommands {
    /// List stored results, newest first
    List,
    /// Delete a result and its annotated image
    Delete {
        /// Result id
        id: i64,
    },
}

/// Print every stored result, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_results_list(
    pool: &sqlx::SqlitePool,
    config: &peoplecount_core::AppConfig,
) -> anyhow::Result<()> {
    let rows = peoplecount_db::list_detection_results(pool).await?;

    if rows.is_empty() {
        println!("no detection results stored");
        return Ok(());
    }

    println!("{:<8}{:<26}{:<7}IMAGE URL", "ID", "TIMESTAMP", "COUNT");
    for row in &rows {
        let url = public_image_url(&config.static_url_prefix, &row.image_path)
            .unwrap_or_else(|| "\u{2014}".to_string());
        println!(
            "{:<8}{:<26}{:<7}{}",
            row.id,
            row.created_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            row.count,
            url
        );
    }

    Ok(())
}

/// Delete a result row, then remove its image file best-effort.
///
/// # Errors
///
/// Returns an error if `id` does not exist or the delete fails.
pub(crate) async fn run_results_delete(pool: &sqlx::SqlitePool, id: i64) -> anyhow::Result<()> {
    match peoplecount_db::delete_detection_result_and_image(pool, id).await {
        Ok(_) => Ok(()),
        Err(peoplecount_db::DbError::NotFound) => anyhow::bail!("result {id} not found"),
        Err(e) => Err(e.into()),
    }
}
