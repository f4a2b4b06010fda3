//! `acctkernel import` — stage a source file through a named mapping and
//! promote its valid records, mirroring the load -> validate -> promote
//! pipeline the reference import script drives directly against the ORM.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Args;
use uuid::Uuid;

use acctkernel_db::{connect, DatabaseConfig, MasterDataPromoter, PgConn, PgImportStore, PgMappingRegistry, PgStore};
use acctkernel_ingest::{
    EntityPromoter, ImportRecordStatus, ImportService, ImportStore, JournalPromoter, MappingRegistry, PromotionService,
};
use acctkernel_ledger::{LedgerRegistry, LedgerRequirementSet};

use crate::display;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Name of the registered import mapping to stage the file through.
    #[arg(long)]
    mapping: String,

    /// Path to the source file (CSV, JSON, or XLSX per the mapping's
    /// `source_format`).
    #[arg(long)]
    file: PathBuf,

    /// Legal entity scope, carried through for parity with the reference
    /// pipeline's config selection; this kernel resolves mappings by name
    /// alone, so it has no effect yet.
    #[arg(long, default_value = "*")]
    legal_entity: String,

    /// As-of date for config selection; same caveat as `--legal-entity`.
    #[arg(long)]
    as_of_date: Option<NaiveDate>,

    /// Ledger a staged `journal` batch promotes its entries into.
    #[arg(long, default_value = "GL")]
    ledger: String,

    /// Posting profile id recorded on journal entries promoted this run.
    #[arg(long, default_value = "cli_import")]
    profile_id: String,

    #[arg(long, default_value_t = 1)]
    profile_version: u32,

    /// Balancing tolerance for the journal's ledger, used only when this
    /// run promotes a `journal`-entity batch.
    #[arg(long, default_value = "0.01")]
    rounding_tolerance: rust_decimal::Decimal,

    /// Load and validate only; never promote.
    #[arg(long)]
    no_promote: bool,

    /// Stop after computing the preflight graph; never write to live
    /// tables.
    #[arg(long)]
    dry_run: bool,

    /// Probe the source file's shape (row count, columns, sample rows)
    /// and exit. No database writes.
    #[arg(long)]
    probe_only: bool,

    /// Actor attributed to every write this run makes; defaults to
    /// $RUN_IMPORT_ACTOR_ID or a fresh random id.
    #[arg(long)]
    actor_id: Option<Uuid>,

    /// PostgreSQL connection URL; defaults to $DATABASE_URL.
    #[arg(long)]
    db_url: Option<String>,
}

/// Runs the pipeline. Returns `Ok(true)` iff the process should exit 0.
pub async fn run(args: ImportArgs) -> anyhow::Result<bool> {
    let mut config = DatabaseConfig::default();
    if let Some(url) = &args.db_url {
        config.postgres_url = url.clone();
    }
    let store = connect(&config).await.context("connecting to postgres")?;

    let actor_id = args.actor_id.unwrap_or_else(|| {
        std::env::var("RUN_IMPORT_ACTOR_ID").ok().and_then(|s| Uuid::parse_str(&s).ok()).unwrap_or_else(Uuid::new_v4)
    });

    // `PgStore` and its sibling structs block the calling thread's tokio
    // handle on every call (see acctkernel-db's crate docs); run the whole
    // synchronous pipeline on a blocking-pool thread rather than `main`'s
    // worker thread.
    tokio::task::spawn_blocking(move || run_sync(args, store, actor_id)).await?
}

fn run_sync(args: ImportArgs, store: PgStore, actor_id: Uuid) -> anyhow::Result<bool> {
    let rt = tokio::runtime::Handle::current();
    let registry = PgMappingRegistry::new(store.pool().clone(), rt.clone());
    let mut import_store = PgImportStore::new(store.pool().clone(), rt.clone());
    let service = ImportService::new();

    let Some(mapping) = registry.get(&args.mapping) else {
        display::error(&format!("Mapping {:?} not found.", args.mapping));
        return Ok(false);
    };

    if args.probe_only {
        let probe = service.probe_source(&args.file, &mapping)?;
        display::section("PROBE");
        display::kv("rows", &probe.row_count.to_string());
        display::kv("columns", &probe.columns.join(", "));
        for (i, row) in probe.sample_rows.iter().take(3).enumerate() {
            display::kv(&format!("sample[{}]", i + 1), &serde_json::to_string(row).unwrap_or_default());
        }
        return Ok(true);
    }

    let now = Utc::now();
    display::info(&format!("Loading {} with mapping {}...", args.file.display(), args.mapping));
    let batch = service.load_batch(&mut import_store, &args.file, &mapping, now)?;
    display::success(&format!("Staged {} records (batch_id={})", batch.total_records, batch.id));

    display::info("Validating...");
    let validated = service.validate_batch(&mut import_store, &registry, batch.id, None, None)?;
    display::success(&format!("Valid: {}, Invalid: {}", validated.valid_records, validated.invalid_records));

    if validated.invalid_records > 0 {
        let mut invalid: Vec<_> = import_store.list_records(batch.id)?.into_iter().filter(|r| r.status == ImportRecordStatus::Invalid).collect();
        invalid.sort_by_key(|r| r.source_row);
        for rec in invalid.iter().take(10) {
            display::warning(&format!("Row {}: {:?}", rec.source_row, rec.validation_errors));
        }
        if invalid.len() > 10 {
            display::info(&format!("... and {} more invalid records.", invalid.len() - 10));
        }
    }

    if args.no_promote {
        display::info("Skipping promotion (--no-promote).");
        return Ok(true);
    }
    if validated.valid_records == 0 {
        display::info("No valid records to promote.");
        return Ok(true);
    }

    // Build whichever `EntityPromoter` the batch's entity type needs.
    // Journal entries dispatch through the coordinator; everything else
    // writes straight to its live table. Both need to land their writes on
    // the same connection `import_store` promotes through, so that the
    // per-record `SAVEPOINT` `promote_batch` opens through `import_store`
    // actually covers what the promoter writes too -- so the batch
    // transaction is opened here, before the promoters are built, rather
    // than left for `promote_batch` to open on its own (it's idempotent and
    // no-ops when it finds one already open).
    let mut ledgers = LedgerRegistry::new();
    ledgers.register(args.ledger.clone(), LedgerRequirementSet::new(args.rounding_tolerance));
    let roles = store.load_role_bindings()?;
    import_store.begin_batch()?;
    let shared = import_store.batch_connection().expect("begin_batch always sets the shared connection");
    // Separate `PgStore` handles per collaborator -- `journal_promoter`
    // below holds `audit_store` mutably for its own lifetime, so the batch
    // audit write in `promote_batch` needs its own handle. Both wrap the
    // same `shared` connection, so their writes still land in the one
    // outer transaction.
    let mut posting_store = PgStore::new_shared(store.pool().clone(), rt.clone(), PgConn::Shared(shared.clone()));
    let mut audit_store = PgStore::new_shared(store.pool().clone(), rt.clone(), PgConn::Shared(shared.clone()));
    let mut audit_for_promotion = PgStore::new_shared(store.pool().clone(), rt.clone(), PgConn::Shared(shared.clone()));

    let mut journal_promoter;
    let mut master_promoter;
    let mut promoters: HashMap<String, &mut dyn EntityPromoter> = HashMap::new();

    if validated.entity_type == "journal" {
        journal_promoter = JournalPromoter::new(
            args.ledger.clone(),
            args.profile_id.clone(),
            args.profile_version,
            |key: &str| Some(key.to_string()),
            &roles,
            &ledgers,
            &store,
            &mut posting_store,
            &mut audit_store,
        );
        promoters.insert("journal".to_string(), &mut journal_promoter);
    } else {
        master_promoter = MasterDataPromoter::new_shared(shared.clone(), rt.clone(), validated.entity_type.clone());
        promoters.insert(validated.entity_type.clone(), &mut master_promoter);
    }

    let mut promotion_svc = PromotionService::new(promoters);

    if args.dry_run {
        let preflight = promotion_svc.compute_preflight_graph(&import_store, batch.id)?;
        display::info(&format!("Preflight: ready={}, blocked={}", preflight.ready_count, preflight.blocked_count));
        display::info("Dry run: no promotion performed.");
        import_store.rollback_batch()?;
        return Ok(true);
    }

    display::info("Promoting...");
    let result = promotion_svc.promote_batch(&mut import_store, &mut audit_for_promotion, batch.id, actor_id, Utc::now())?;
    display::success(&format!("Promoted: {}, Failed: {}, Skipped: {}", result.promoted, result.failed, result.skipped));
    if !result.errors.is_empty() {
        for err in result.errors.iter().take(5) {
            display::warning(&format!("Row {}: {}", err.source_row, err.message));
        }
        if result.errors.len() > 5 {
            display::info(&format!("... and {} more errors.", result.errors.len() - 5));
        }
    }

    Ok(result.failed == 0)
}
