use colored::*;
use common::{Config, logger::init_logger};
use futures::FutureExt;
use migration::Migrator;
use sea_orm_migration::prelude::*;
use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use std::time::Instant;
use std::{env, fs, path::Path};

const STATUS_COLUMN: usize = 80;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::init(".env");
    init_logger(&config.log_level, &config.log_file);

    let db_path = sqlite_path(&config.database_url);
    let url = format!("sqlite://{}?mode=rwc", db_path);
    let args: Vec<String> = env::args().collect();

    let result = match args.get(1).map(|s| s.as_str()) {
        Some("clean") => remove_db_file(&db_path),
        Some("fresh") => match remove_db_file(&db_path).and_then(|_| create_db_dir(&db_path)) {
            Ok(()) => apply_schema(&db_path, &url).await,
            Err(e) => Err(e),
        },
        _ => match create_db_dir(&db_path) {
            Ok(()) => apply_schema(&db_path, &url).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{} {}", "error:".red().bold(), msg);
            ExitCode::FAILURE
        }
    }
}

/// Creates the attendance tables (members, courses, sessions, role
/// assignments and the attendance log) in the database at `url`.
async fn apply_schema(db_path: &str, url: &str) -> Result<(), String> {
    let db = sea_orm::Database::connect(url)
        .await
        .map_err(|e| format!("cannot open attendance database {db_path}: {e}"))?;

    println!("Applying attendance schema to {}", db_path.bold());
    let schema_manager = SchemaManager::new(&db);

    let steps = <Migrator as MigratorTrait>::migrations();
    let total = steps.len();
    for (index, step) in steps.into_iter().enumerate() {
        let name = step.name().to_owned();
        print!("{} ", step_line(index + 1, total, &name));
        io::stdout().flush().ok();

        let start = Instant::now();
        match AssertUnwindSafe(step.up(&schema_manager)).catch_unwind().await {
            Ok(Ok(())) => {
                let time_str = format!("({:.2?})", start.elapsed()).dimmed();
                println!("{} {}", "done".green(), time_str);
            }
            Ok(Err(err)) => {
                println!("{}", "failed".red());
                return Err(format!("attendance schema step {name} failed: {err}"));
            }
            Err(_) => {
                println!("{}", "panicked".red());
                return Err(format!("attendance schema step {name} panicked"));
            }
        }
    }

    println!("Attendance schema ready ({total} steps)");
    Ok(())
}

/// `[n/total] name` padded with dots to the status column.
fn step_line(n: usize, total: usize, name: &str) -> String {
    let label = format!("[{n}/{total}] {name}");
    let dots = ".".repeat(STATUS_COLUMN.saturating_sub(label.len()));
    format!("{label}{dots}")
}

/// Accepts either a bare file path or a `sqlite://` DSN and returns the file path.
fn sqlite_path(database_url: &str) -> String {
    let trimmed = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    trimmed.split('?').next().unwrap_or(trimmed).to_string()
}

fn remove_db_file(path: &str) -> Result<(), String> {
    let db_path = Path::new(path);
    if db_path.exists() {
        fs::remove_file(db_path)
            .map_err(|e| format!("cannot delete attendance database {path}: {e}"))?;
        println!("Deleted attendance database: {}", db_path.display());
    } else {
        println!("No attendance database at {}", db_path.display());
    }
    Ok(())
}

fn create_db_dir(path: &str) -> Result<(), String> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create directory for {path}: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_path_strips_scheme_and_query() {
        assert_eq!(sqlite_path("data/attendance.db"), "data/attendance.db");
        assert_eq!(sqlite_path("sqlite://data/a.db?mode=rwc"), "data/a.db");
        assert_eq!(sqlite_path("sqlite:/tmp/a.db"), "/tmp/a.db");
    }

    #[test]
    fn test_step_line_pads_to_status_column() {
        let line = step_line(2, 5, "m202510010002_create_courses");
        assert!(line.starts_with("[2/5] m202510010002_create_courses."));
        assert_eq!(line.len(), STATUS_COLUMN);
    }

    #[tokio::test]
    async fn test_apply_schema_creates_attendance_tables() {
        apply_schema("memory", "sqlite::memory:").await.unwrap();
    }
}
