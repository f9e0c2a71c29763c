use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::{Row, SqlitePool};

use salesdesk::catalog::{self, store, MatrixDefinition};
use salesdesk::config;
use salesdesk::db;
use salesdesk::hierarchy::OrgChart;

#[derive(Parser, Debug)]
#[command(author, version, about = "salesdesk operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Load the built-in permission matrix (departments, permissions, roles, grants)
    Seed,
    /// Report scope conflicts, matrix drift and manager cycles; exits 1 on findings
    Audit,
    /// Collapse every scope conflict to a single scope
    Repair,
    /// Write the OpenAPI document as JSON
    DumpOpenapi {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            db::migrator().await?.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            print_status(&pool, &db::migrator().await?).await?;
        }
        Commands::Seed => {
            let pool = get_pool().await?;
            let summary = catalog::seed(&pool, &MatrixDefinition::builtin()?).await?;
            println!(
                "Seeded {} departments, {} permissions, {} roles, {} grants",
                summary.departments, summary.permissions, summary.roles, summary.grants
            );
        }
        Commands::Audit => {
            let pool = get_pool().await?;
            let findings = audit(&pool).await?;
            if findings > 0 {
                std::process::exit(1);
            }
        }
        Commands::Repair => {
            let pool = get_pool().await?;
            let repair = store::repair_catalog(&pool, &MatrixDefinition::builtin()?).await?;
            for grant in &repair.removed_grants {
                println!(
                    "{} removed permission {} ({}:{}:{})",
                    grant.role_code, grant.permission_id, grant.module, grant.action, grant.scope_type
                );
            }
            for fixed in &repair.scope_repairs {
                println!(
                    "{} {}:{} -> {}",
                    fixed.conflict.role_code, fixed.conflict.module, fixed.conflict.action, fixed.kept
                );
            }
            println!(
                "{} unreadable grant(s) removed, {} conflict(s) repaired",
                repair.removed_grants.len(),
                repair.scope_repairs.len()
            );
        }
        Commands::DumpOpenapi { out } => {
            let port = config::port_from_env()?;
            let doc = salesdesk::docs::build_openapi(port)?;
            let json = serde_json::to_string_pretty(&doc)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("OpenAPI written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    db::connect(&database_url).await
}

/// Print every finding and return how many there were.
async fn audit(pool: &SqlitePool) -> anyhow::Result<usize> {
    let mut findings = 0;

    let conflicts = store::audit_scope_conflicts(pool).await?;
    for c in &conflicts {
        let scopes: Vec<&str> = c.scopes.iter().map(|s| s.as_str()).collect();
        println!("conflict  {} {}:{} [{}]", c.role_code, c.module, c.action, scopes.join(", "));
    }
    findings += conflicts.len();

    let invalid = store::audit_invalid_grants(pool).await?;
    for g in &invalid {
        println!("invalid   {} permission {}: {}", g.role_code, g.permission_id, g.reason);
    }
    findings += invalid.len();

    let drift = catalog::drift_report(pool, &MatrixDefinition::builtin()?).await?;
    for code in &drift.missing_roles {
        println!("drift     {code} missing");
    }
    for d in &drift.entries {
        println!(
            "drift     {} {}:{} {:?} expected={:?} actual={:?}",
            d.role_code, d.module, d.action, d.kind, d.expected, d.actual
        );
    }
    findings += drift.missing_roles.len() + drift.entries.len();

    let cycles = OrgChart::load(pool).await?.detect_cycles();
    for cycle in &cycles {
        let path: Vec<String> = cycle.iter().map(i64::to_string).collect();
        println!("cycle     {}", path.join(" -> "));
    }
    findings += cycles.len();

    println!("{findings} finding(s)");
    Ok(findings)
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        println!("{:<8} {:<20} {}", status, migration.version, if desc.is_empty() { "unknown" } else { desc });
    }

    Ok(())
}
