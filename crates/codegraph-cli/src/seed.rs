//! Loads the in-memory graph the CLI drives the pipeline against. The
//! real graph source is whatever storage engine a caller plugs in behind
//! `GraphAdapter` (out of scope here); this binary only needs something
//! small and inspectable to exercise the pipeline by hand.

use anyhow::{Context, Result};
use codegraph_core::{Entity, EntityKind, Relationship, RelationshipKind, SourceRange};
use codegraph_graph::InMemoryGraphAdapter;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Deserialize)]
struct SeedFile {
    entities: Vec<SeedEntity>,
    #[serde(default)]
    relationships: Vec<SeedRelationship>,
}

#[derive(Deserialize)]
struct SeedEntity {
    id: Uuid,
    name: String,
    file_path: String,
    kind: EntityKind,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    doc_comment: Option<String>,
    start_line: u32,
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    snippet: Vec<String>,
}

#[derive(Deserialize)]
struct SeedRelationship {
    from: Uuid,
    to: Uuid,
    kind: RelationshipKind,
}

pub fn load_seed(path: &Path) -> Result<InMemoryGraphAdapter> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw).context("parsing seed file")?;

    let adapter = InMemoryGraphAdapter::new();
    for e in seed.entities {
        let range = if e.kind.has_span() {
            SourceRange::Span { start_line: e.start_line, end_line: e.end_line.unwrap_or(e.start_line) }
        } else {
            SourceRange::Line(e.start_line)
        };
        let mut entity = Entity::new(e.id, e.name, e.file_path, e.kind, range);
        if let Some(signature) = e.signature {
            entity = entity.with_signature(signature);
        }
        if let Some(doc) = e.doc_comment {
            entity = entity.with_doc_comment(doc);
        }
        if !e.snippet.is_empty() {
            entity = entity.with_snippet(e.snippet);
        }
        adapter.add_entity(entity);
    }
    for r in seed.relationships {
        adapter.add_relationship(Relationship { from: r.from, to: r.to, kind: r.kind });
    }
    Ok(adapter)
}

/// A handful of entities wired together so `status`/`project` work with no
/// `--seed` flag at all.
pub fn demo_seed() -> InMemoryGraphAdapter {
    let adapter = InMemoryGraphAdapter::new();

    let file = Entity::new(
        Uuid::new_v4(),
        "payments.ts",
        "src/billing/payments.ts",
        EntityKind::File,
        SourceRange::Span { start_line: 1, end_line: 80 },
    );

    let charge_card = Entity::new(
        Uuid::new_v4(),
        "chargeCard",
        "src/billing/payments.ts",
        EntityKind::Function,
        SourceRange::Span { start_line: 12, end_line: 40 },
    )
    .with_signature("fn charge_card(card: &Card, amount_cents: u64) -> Result<Receipt>")
    .with_snippet(vec![
        "pub fn charge_card(card: &Card, amount_cents: u64) -> Result<Receipt> {".to_string(),
        "    let authorized = gateway::authorize(card, amount_cents)?;".to_string(),
        "    ledger::record_charge(authorized.id, amount_cents);".to_string(),
        "    Ok(authorized.into_receipt())".to_string(),
        "}".to_string(),
    ]);

    let get_id = Entity::new(
        Uuid::new_v4(),
        "getId",
        "src/billing/payments.ts",
        EntityKind::Method,
        SourceRange::Span { start_line: 42, end_line: 44 },
    )
    .with_signature("fn get_id(&self) -> Uuid");

    adapter.add_entity(file.clone());
    adapter.add_entity(charge_card.clone());
    adapter.add_entity(get_id.clone());
    adapter.add_relationship(Relationship { from: file.id, to: charge_card.id, kind: RelationshipKind::Contains });
    adapter.add_relationship(Relationship { from: file.id, to: get_id.id, kind: RelationshipKind::HasMethod });

    adapter
}
