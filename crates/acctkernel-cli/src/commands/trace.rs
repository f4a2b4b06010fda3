//! `acctkernel trace` — reconstruct the full decision journal for one
//! event or journal entry, or list everything currently traceable.

use anyhow::Context;
use clap::Args;
use uuid::Uuid;

use acctkernel_coordinator::trace::{TraceBundle, TraceDataSource, TraceSelector};
use acctkernel_db::{connect, DatabaseConfig, PgStore};

use crate::display;

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["event_id", "entry_id", "list"])))]
pub struct TraceArgs {
    /// Source event UUID to trace.
    #[arg(long)]
    event_id: Option<Uuid>,

    /// Journal entry UUID to trace.
    #[arg(long)]
    entry_id: Option<Uuid>,

    /// List every traceable journal entry instead of tracing one.
    #[arg(long)]
    list: bool,

    /// Print the full trace bundle as JSON instead of formatted text.
    #[arg(long)]
    json: bool,

    /// Cap on how many entries `--list` prints.
    #[arg(long, default_value_t = 500)]
    limit: i64,

    /// PostgreSQL connection URL; defaults to $DATABASE_URL.
    #[arg(long)]
    db_url: Option<String>,
}

pub async fn run(args: TraceArgs) -> anyhow::Result<bool> {
    let mut config = DatabaseConfig::default();
    if let Some(url) = &args.db_url {
        config.postgres_url = url.clone();
    }
    let store = connect(&config).await.context("connecting to postgres")?;

    tokio::task::spawn_blocking(move || run_sync(args, store)).await?
}

fn run_sync(args: TraceArgs, store: PgStore) -> anyhow::Result<bool> {
    if args.list {
        return list_entries(&store, args.limit);
    }

    let bundle = if let Some(event_id) = args.event_id {
        TraceSelector::trace(event_id, &store)?
    } else {
        let entry_id = args.entry_id.expect("clap ArgGroup guarantees one of event_id/entry_id/list");
        TraceSelector::trace_by_entry(entry_id, &store, |id| store.event_id_for_journal_entry(id).map_err(Into::into))?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(true);
    }
    render_bundle(&store, &bundle)?;
    Ok(true)
}

fn list_entries(store: &PgStore, limit: i64) -> anyhow::Result<bool> {
    let entries = store.list_journal_entries(limit)?;
    if entries.is_empty() {
        display::info("No journal entries found.");
        return Ok(true);
    }

    let account_names = store.account_names()?;

    println!();
    println!("{}", "=".repeat(80));
    println!("  TRACEABLE JOURNAL ENTRIES");
    println!("{}", "=".repeat(80));
    println!();
    println!("  {:>3}  {:<8}  {:<12}  {:<12}  memo", "#", "status", "date", "has_journal");
    println!("  {:>3}  {:<8}  {:<12}  {:<12}  ----", "---", "------", "----", "----------");

    for entry in &entries {
        let event = TraceDataSource::find_event(store, entry.source_event_id)?;
        let memo = event.as_ref().and_then(|e| e.payload.get("memo")).and_then(|m| m.as_str()).unwrap_or("");
        let outcome = TraceDataSource::find_outcome(store, entry.source_event_id)?;
        let has_journal = if outcome.map(|o| !o.decision_log.is_empty()).unwrap_or(false) { "YES" } else { "no" };
        let status = format!("{:?}", entry.status).to_lowercase();
        let seq = entry.seq.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  {:>3}  {:<8}  {:<12}  {:<12}  {}", seq, status, entry.effective_date, has_journal, memo);
    }

    println!();
    println!("  Total: {} journal entries", entries.len());
    println!();
    println!("--- ENTRY DETAILS (for trace commands) ---");
    println!();

    for entry in &entries {
        let event = TraceDataSource::find_event(store, entry.source_event_id)?;
        let memo = event.as_ref().and_then(|e| e.payload.get("memo")).and_then(|m| m.as_str()).unwrap_or("");
        let outcome = TraceDataSource::find_outcome(store, entry.source_event_id)?;
        let has_journal = outcome.map(|o| !o.decision_log.is_empty()).unwrap_or(false);

        println!("  Entry #{}: {}", entry.seq.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()), memo);
        println!("    entry-id:  {}", entry.id);
        println!("    event-id:  {}", entry.source_event_id);
        println!("    journal:   {}", if has_journal { "DECISION LOG AVAILABLE" } else { "no decision log (pre-feature)" });

        for line in &entry.lines {
            let label = account_names.get(&line.account_code.0).map(|name| format!("{} {}", line.account_code, name)).unwrap_or_else(|| line.account_code.to_string());
            println!("    {:>7}  {:>12}  {}  {}", line.side.to_string(), line.amount, line.currency, label);
        }

        println!("    trace:     acctkernel trace --event-id {}", entry.source_event_id);
        println!();
    }

    Ok(true)
}

fn render_bundle(store: &PgStore, bundle: &TraceBundle) -> anyhow::Result<()> {
    let account_names = store.account_names()?;

    display::section("TRACE");
    display::kv("source_event_id", &bundle.source_event_id.to_string());
    match &bundle.event {
        Some(event) => {
            display::kv("event_type", &event.event_type);
            display::kv("effective_date", &event.effective_date.to_string());
            display::kv("actor_id", &event.actor_id);
        }
        None => display::warning("no event record found for this id"),
    }

    match &bundle.outcome {
        Some(outcome) => {
            display::kv("status", outcome.status.as_str());
            if let Some(reason) = &outcome.reason_detail {
                display::kv("reason", reason);
            }
            for (i, entry) in outcome.decision_log.iter().enumerate() {
                display::kv(&format!("decision[{i}] {}", entry.step), &entry.detail);
            }
        }
        None => display::warning("no interpretation outcome recorded for this id"),
    }

    for entry in &bundle.journal_entries {
        println!();
        println!("  journal entry {} (ledger={}, seq={:?})", entry.id, entry.ledger_id, entry.seq);
        for line in &entry.lines {
            let label = account_names.get(&line.account_code.0).map(|name| format!("{} {}", line.account_code, name)).unwrap_or_else(|| line.account_code.to_string());
            println!("    {:>7}  {:>12}  {}  {}", line.side.to_string(), line.amount, line.currency, label);
        }
    }

    display::section("INTEGRITY");
    display::kv("payload_hash_verified", &bundle.integrity.payload_hash_verified.to_string());
    display::kv("balance_verified", &bundle.integrity.balance_verified.to_string());
    display::kv("audit_chain_segment_valid", &bundle.integrity.audit_chain_segment_valid.to_string());

    Ok(())
}
