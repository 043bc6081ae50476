use anyhow::{Context, Result};
use paper_retrieval::{
    ContextSections, IngestOutcome, RetrievalService, ScoredPassage, StorageStats,
};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Page separator emitted by `pdftotext` and similar extractors.
const PAGE_BREAK: char = '\u{c}';

#[derive(Serialize)]
struct IngestOutput<'a> {
    document_id: &'a str,
    #[serde(flatten)]
    outcome: IngestOutcome,
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<&'a str>,
    results: Vec<ScoredPassage>,
}

#[derive(Serialize)]
struct RemoveOutput<'a> {
    document_id: &'a str,
    removed: usize,
}

pub async fn ingest(
    service: &RetrievalService,
    document_id: &str,
    file: Option<&Path>,
) -> Result<Value> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };

    let result = if text.contains(PAGE_BREAK) {
        let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        log::debug!("Ingesting '{document_id}' as {} pages", pages.len());
        service.ingest_pages(document_id, &pages).await
    } else {
        service.ingest(document_id, &text).await
    };
    let outcome = result.with_context(|| format!("Failed to ingest '{document_id}'"))?;

    if let IngestOutcome::Ingested {
        persisted: false, ..
    } = outcome
    {
        log::warn!("'{document_id}' is indexed in memory only; the snapshot was not saved");
    }

    Ok(serde_json::to_value(IngestOutput {
        document_id,
        outcome,
    })?)
}

pub async fn search(
    service: &RetrievalService,
    query: &str,
    top_k: usize,
    document_id: Option<&str>,
) -> Result<Value> {
    let results = service
        .search(query, top_k, document_id)
        .await
        .context("Search failed")?;
    Ok(serde_json::to_value(SearchOutput {
        query,
        document_id,
        results,
    })?)
}

pub async fn ask(
    service: &RetrievalService,
    query: &str,
    top_k: usize,
    document_id: Option<&str>,
) -> Result<Value> {
    let answer = service
        .ask(query, top_k, document_id, &ContextSections)
        .await
        .context("Ask failed")?;
    Ok(serde_json::to_value(answer)?)
}

pub async fn status(service: &RetrievalService) -> Result<Value> {
    let stats: StorageStats = service.status().await;
    let mut value = serde_json::to_value(stats)?;
    value["document_ids"] = serde_json::to_value(service.documents().await)?;
    Ok(value)
}

pub async fn remove(service: &RetrievalService, document_id: &str) -> Result<Value> {
    let removed = service
        .remove_document(document_id)
        .await
        .with_context(|| format!("Failed to remove '{document_id}'"))?;
    Ok(serde_json::to_value(RemoveOutput {
        document_id,
        removed,
    })?)
}
