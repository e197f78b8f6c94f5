//! Holdtree level repair tool.
//!
//! Lists every active company whose stored level disagrees with its parent,
//! then recomputes levels across the whole tree in one transaction.
//!
//! Usage:
//!   level-repair            - Audit, repair, then audit again
//!   level-repair --dry-run  - Audit only, write nothing

use anyhow::Context;
use holdtree_core::hierarchy::{HierarchyService, LevelMismatch};
use holdtree_db::{CompanyRepository, connect_with};
use holdtree_shared::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn report(mismatches: &[LevelMismatch]) {
    for m in mismatches {
        warn!(
            company_id = %m.company_id,
            code = %m.code,
            old_level = m.stored_level,
            new_level = m.expected_level,
            "Level mismatch"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "holdtree=debug,level_repair=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dry_run = std::env::args().skip(1).any(|arg| arg == "--dry-run");

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let service = HierarchyService::without_cache(CompanyRepository::new(db), config.hierarchy);

    let before = service.audit_levels().await?;
    report(&before);
    info!(mismatches = before.len(), "Level audit complete");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let summary = service.repair_all().await?;
    info!(
        passes = summary.passes,
        corrected = summary.corrected,
        clamped = summary.clamped.len(),
        "Level repair committed"
    );

    let after = service.audit_levels().await?;
    if after.is_empty() {
        info!("All company levels consistent");
    } else {
        report(&after);
        anyhow::bail!("{} companies still inconsistent after repair", after.len());
    }

    Ok(())
}
