use crate::embeddings::Embedder;
use crate::extractor::VocabularySet;
use crate::models::{EnrichedRow, VectorMetadata, VectorPoint};
use crate::pipeline::{read_raw_rows, BomProcessor, ProcessedBatch};
use crate::stores::sqlite::SqliteComponentStore;
use crate::tasks::TaskRegistry;
use crate::traits::VectorIndex;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const EMBED_BATCH: usize = 500;

/// Submit a batch file for processing; returns the task id immediately and
/// runs the whole job on a background worker.
pub fn start_processing<V, E>(
    registry: TaskRegistry,
    store: Arc<SqliteComponentStore>,
    index: Arc<V>,
    embedder: Arc<E>,
    vocabularies: VocabularySet,
    file_path: PathBuf,
) -> Uuid
where
    V: VectorIndex + Send + Sync + 'static,
    E: Embedder + Send + Sync + 'static,
{
    let task_id = registry.create();
    info!(%task_id, path = %file_path.display(), "submitting background import");

    tokio::spawn(run_processing(
        registry,
        task_id,
        store,
        index,
        embedder,
        vocabularies,
        file_path,
    ));

    task_id
}

/// The background job body: never panics the worker; failures land on the
/// task's terminal error state.
pub async fn run_processing<V, E>(
    registry: TaskRegistry,
    task_id: Uuid,
    store: Arc<SqliteComponentStore>,
    index: Arc<V>,
    embedder: Arc<E>,
    vocabularies: VocabularySet,
    file_path: PathBuf,
) where
    V: VectorIndex + Send + Sync + 'static,
    E: Embedder + Send + Sync + 'static,
{
    match run_inner(
        &registry,
        task_id,
        store,
        index,
        embedder,
        vocabularies,
        file_path,
    )
    .await
    {
        Ok(summary) => registry.mark_done(task_id, &summary),
        Err(error) => {
            warn!(%task_id, %error, "import task failed");
            registry.mark_error(task_id, "Processing failed.", &error.to_string());
        }
    }
}

async fn run_inner<V, E>(
    registry: &TaskRegistry,
    task_id: Uuid,
    store: Arc<SqliteComponentStore>,
    index: Arc<V>,
    embedder: Arc<E>,
    vocabularies: VocabularySet,
    file_path: PathBuf,
) -> anyhow::Result<String>
where
    V: VectorIndex + Send + Sync + 'static,
    E: Embedder + Send + Sync + 'static,
{
    registry.mark_running(task_id, 5, "Reading batch file...");
    registry.mark_running(task_id, 20, "Running processing pipeline...");

    let batch: ProcessedBatch = tokio::task::spawn_blocking(move || {
        let rows = read_raw_rows(&file_path)?;
        let mut processor = BomProcessor::new(&vocabularies)?;
        processor.process(rows)
    })
    .await??;

    registry.mark_running(task_id, 60, "Importing into database...");
    let imported = store.bulk_replace(&batch.rows).await?;
    info!(%task_id, imported, "relational import complete");

    registry.mark_running(task_id, 80, "Computing embeddings...");
    embed_batch(&store, index.as_ref(), embedder.as_ref(), &batch.rows).await?;

    Ok(format!(
        "Processing completed successfully ({} rows imported; assemblies: {}, subassemblies: {}, leafs: {}).",
        imported, batch.stats.assemblies, batch.stats.subassemblies, batch.stats.leafs
    ))
}

/// Embed the canonical text of each imported row and push the vectors to
/// the index in bounded chunks. Index failures are logged per chunk; the
/// relational import is already committed and stands.
async fn embed_batch<V, E>(
    store: &SqliteComponentStore,
    index: &V,
    embedder: &E,
    rows: &[EnrichedRow],
) -> anyhow::Result<()>
where
    V: VectorIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    for chunk in rows.chunks(EMBED_BATCH) {
        let texts: Vec<String> = chunk.iter().map(|row| row.embedding_text.clone()).collect();
        let embeddings = embedder.encode_batch(&texts);

        let now = Utc::now();
        let stamp = now.to_rfc3339();
        for (row, embedding) in chunk.iter().zip(&embeddings) {
            store.set_embedding(row.row_id, embedding, now).await?;
        }

        let points: Vec<VectorPoint> = chunk
            .iter()
            .zip(embeddings)
            .map(|(row, embedding)| VectorPoint {
                unique_id: row.unique_id.clone(),
                embedding,
                metadata: VectorMetadata {
                    component_id: row.component_id.clone(),
                    material_id: row.material_id.clone(),
                    vendor: row.vendor.clone(),
                    is_assembly: row.is_assembly,
                    is_subassembly: row.is_subassembly,
                    is_leaf: row.is_leaf,
                    abs_level: row.abs_level,
                    updated_at: Some(stamp.clone()),
                },
            })
            .collect();

        if let Err(error) = index.upsert_points(&points).await {
            warn!(%error, "vector upsert failed for import chunk; continuing");
        }
    }

    Ok(())
}
