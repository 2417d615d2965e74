use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use lead_funnel::channels::{CliSender, Sender};
use lead_funnel::classifier::KeywordClassifier;
use lead_funnel::config::FunnelConfig;
use lead_funnel::funnel::FunnelMachine;
use lead_funnel::event::InboundEvent;
use lead_funnel::orchestrator::Orchestrator;
use lead_funnel::script::FunnelScript;
use lead_funnel::store::{
    ContextStore, DedupeGuard, InMemoryDedupe, InMemoryTransient, LibSqlStore,
};
use lead_funnel::vacancy::{StaticVacancySource, Vacancy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = FunnelConfig::from_env();

    let db_path =
        std::env::var("FUNNEL_DB_PATH").unwrap_or_else(|_| "./data/lead-funnel.db".to_string());
    let sender_id =
        std::env::var("FUNNEL_SENDER_ID").unwrap_or_else(|_| "+5511999990001".to_string());

    eprintln!("📋 Lead Funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!("   Sender: {} (set FUNNEL_SENDER_ID to change)", sender_id);
    eprintln!("   Type a message and press Enter. /pick <id> selects a menu option. /quit to exit.\n");

    // ── Content ─────────────────────────────────────────────────────
    let script = match std::env::var("FUNNEL_SCRIPT_PATH") {
        Ok(path) => Arc::new(FunnelScript::from_json(&std::fs::read_to_string(&path)?)?),
        Err(_) => Arc::new(FunnelScript::builtin()),
    };

    let vacancies = match std::env::var("FUNNEL_VACANCIES_PATH") {
        Ok(path) => StaticVacancySource::from_json(&std::fs::read_to_string(&path)?)?,
        Err(_) => demo_catalog(),
    };

    // ── Stores ──────────────────────────────────────────────────────
    let durable = Arc::new(LibSqlStore::new_local(Path::new(&db_path)).await?);
    let store = ContextStore::new(
        Arc::new(InMemoryTransient::new()),
        durable,
        config.store_timeout,
        config.transient_ttl,
    );
    let guard = DedupeGuard::new(
        Arc::new(InMemoryDedupe::new()),
        config.dedupe_window,
        config.store_timeout,
    );

    // ── Engine ──────────────────────────────────────────────────────
    let machine = FunnelMachine::new(
        script,
        Arc::new(vacancies),
        config.skip_intro,
        config.max_reprompts,
    )
    .with_classifier(Arc::new(KeywordClassifier::new()));
    let orchestrator = Orchestrator::new(guard, store, machine, &config);
    let sender = CliSender::new();

    // ── REPL ────────────────────────────────────────────────────────
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if line == "/quit" {
            break;
        }

        let message_id = Uuid::new_v4().to_string();
        let event = match line.strip_prefix("/pick ") {
            Some(id) => InboundEvent::list_pick(&message_id, &sender_id, id.trim()),
            None => InboundEvent::text(&message_id, &sender_id, &line),
        };

        let outcome = orchestrator.handle_event(event).await;
        for intent in &outcome.intents {
            if let Err(e) = sender.deliver(intent).await {
                tracing::error!(error = %e, "Outbound delivery failed");
            }
        }
        eprint!("> ");
    }

    Ok(())
}

/// Small built-in catalog so the REPL works without any files.
fn demo_catalog() -> StaticVacancySource {
    StaticVacancySource::new(vec![
        Vacancy {
            id: "V-101".into(),
            title: "Central Pharmacy".into(),
            city: "São Paulo".into(),
            shift: Some("morning".into()),
            delivery_fee: None,
        },
        Vacancy {
            id: "V-102".into(),
            title: "Harbor Pharmacy".into(),
            city: "São Paulo".into(),
            shift: Some("night".into()),
            delivery_fee: None,
        },
        Vacancy {
            id: "V-201".into(),
            title: "Old Town Drugstore".into(),
            city: "Recife".into(),
            shift: Some("afternoon".into()),
            delivery_fee: None,
        },
    ])
}
