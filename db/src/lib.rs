pub mod models;
pub mod test_utils;

pub use sea_orm::DbErr;

use common::Config;
use sea_orm::{Database, DatabaseConnection};
use std::path::Path;

/// Turns the configured database location into a sea-orm DSN.
///
/// Full DSNs pass through untouched; anything else is treated as a SQLite file
/// path and opened in read-write-create mode.
pub fn database_url(path_or_url: &str) -> String {
    if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url.to_string()
    } else {
        format!("sqlite://{path_or_url}?mode=rwc")
    }
}

pub async fn connect() -> Result<DatabaseConnection, DbErr> {
    let path_or_url = &Config::get().database_url;
    let url = database_url(path_or_url);

    // SQLite won't create intermediate dirs.
    if url != *path_or_url {
        if let Some(parent) = Path::new(path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    log::info!("Connecting to {url}");
    Database::connect(&url).await
}
