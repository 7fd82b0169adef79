//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `sectionvault_core` linkage.
//! - Print one section's version history from a database file on demand.
//!
//! Usage: `sectionvault_cli [history <db_path> <owner_id> <kind>]`

use sectionvault_core::db::migrations::latest_version;
use sectionvault_core::db::open_db;
use sectionvault_core::{SectionKind, SectionService, SqliteSectionRepository};
use std::path::Path;
use std::process::ExitCode;
use uuid::Uuid;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {
            print_probe();
            ExitCode::SUCCESS
        }
        [command, db_path, owner_id, kind] if command == "history" => {
            match print_history(db_path, owner_id, kind) {
                Ok(()) => ExitCode::SUCCESS,
                Err(message) => {
                    eprintln!("error: {message}");
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            eprintln!("usage: sectionvault_cli [history <db_path> <owner_id> <kind>]");
            ExitCode::from(2)
        }
    }
}

fn print_probe() {
    println!("sectionvault_core ping={}", sectionvault_core::ping());
    println!("sectionvault_core version={}", sectionvault_core::core_version());
    println!("sectionvault_core schema_version={}", latest_version());
    let kinds: Vec<&str> = SectionKind::ALL.iter().map(|kind| kind.as_str()).collect();
    println!("sectionvault_core kinds={}", kinds.join(","));
}

fn print_history(db_path: &str, owner_id: &str, kind: &str) -> Result<(), String> {
    let owner_id =
        Uuid::parse_str(owner_id.trim()).map_err(|err| format!("invalid owner_id: {err}"))?;
    let kind = kind.parse::<SectionKind>().map_err(|err| err.to_string())?;

    if !Path::new(db_path).is_file() {
        return Err(format!("database file not found: {db_path}"));
    }
    let conn = open_db(db_path).map_err(|err| format!("open {db_path} failed: {err}"))?;
    let repo = SqliteSectionRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let history = SectionService::new(repo)
        .list_versions(owner_id, kind)
        .map_err(|err| format!("{} ({})", err, err.code()))?;

    println!(
        "section={} kind={} versions={}",
        history.section.id,
        kind,
        history.versions.len()
    );
    println!("current: {}", history.current_content);
    for version in &history.versions {
        println!(
            "v{} id={} author={} created_at={} chars={}",
            version.version_number,
            version.id,
            version.author_id,
            version.created_at,
            version.content.chars().count()
        );
    }
    Ok(())
}
