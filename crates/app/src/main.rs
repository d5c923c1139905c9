use bom_search_core::{
    rebuild_embeddings, start_processing, CharacterNgramEmbedder, ComponentService, Embedder,
    GraphMaterializer, HybridSearchEngine, QdrantIndex, RecordRole, SearchFilters,
    SqliteComponentStore, TaskRegistry, TaskStatus, VocabularySet,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bom-search-engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Sqlite database path
    #[arg(long, default_value = "data/components.db")]
    database: String,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = "bom_components")]
    qdrant_collection: String,

    /// Directory holding the clean vocabulary dictionaries
    #[arg(long, default_value = "dictionaries")]
    dictionaries: String,
}

#[derive(Subcommand)]
enum Command {
    /// Process a raw BOM batch file and replace the component store.
    Process {
        /// CSV file with material_id, component_id, description, qty, path.
        #[arg(long)]
        file: PathBuf,
    },
    /// Hybrid similarity search from a query text.
    Search {
        /// Query text, embedded before searching.
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Restrict to structural roles (ASSEMBLY, SUBASSEMBLY, LEAF).
        #[arg(long)]
        record_type: Vec<String>,
        /// Restrict to one material document.
        #[arg(long)]
        material_id: Option<String>,
        /// Restrict to one vendor.
        #[arg(long)]
        vendor: Option<String>,
    },
    /// Partition a component's neighborhood into duplicates and analogs.
    CrossMatch {
        /// Unique id of the source component.
        #[arg(long)]
        unique_id: String,
        /// Bucket cap for the duplicate partitions.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Only consider candidates at the source's hierarchy level.
        #[arg(long, default_value_t = false)]
        same_level: bool,
    },
    /// Depth-bounded hierarchy view for one material root.
    Graph {
        /// Material id of the root.
        #[arg(long)]
        root: String,
        /// Maximum traversal depth.
        #[arg(long, default_value = "3")]
        max_depth: i64,
    },
    /// Normalize a raw vocabulary list into a clean dictionary.
    NormalizeVocab {
        /// Category: component_types, materials, standards, or vendors.
        #[arg(long)]
        category: String,
        /// JSON array of raw tokens.
        #[arg(long)]
        raw: PathBuf,
        /// Optional JSON object mapping raw tokens to canonical forms.
        #[arg(long)]
        abbreviations: Option<PathBuf>,
    },
    /// Aggregate store statistics.
    Stats,
    /// Reconcile store embeddings with the vector index.
    RebuildEmbeddings {
        /// Rows per batch commit.
        #[arg(long, default_value = "2000")]
        batch_size: i64,
    },
}

fn serde_json_from_file<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn load_clean_list(dir: &Path, category: &str) -> anyhow::Result<Vec<String>> {
    let path = dir.join(format!("{category}.json"));
    if !path.exists() {
        return Ok(Vec::new());
    }
    serde_json_from_file(&path)
}

fn parse_filters(
    record_type: &[String],
    material_id: Option<String>,
    vendor: Option<String>,
) -> SearchFilters {
    SearchFilters {
        record_types: record_type
            .iter()
            .map(|tag| RecordRole::parse(tag))
            .collect(),
        material_id,
        vendor,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = CharacterNgramEmbedder::default();
    let index = QdrantIndex::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        embedder.dimensions(),
    );
    let store = SqliteComponentStore::connect(&cli.database).await?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "bom-search-engine boot"
    );

    match cli.command {
        Command::Process { file } => {
            let vocabularies = VocabularySet::from_dir(Path::new(&cli.dictionaries))?;

            if let Err(error) = index.ensure_collection().await {
                println!("vector index unavailable, continuing without sync: {error}");
            }

            let registry = TaskRegistry::new();
            let task_id = start_processing(
                registry.clone(),
                Arc::new(store),
                Arc::new(index),
                Arc::new(embedder),
                vocabularies,
                file,
            );
            println!("task submitted: {task_id}");

            let mut last_message = String::new();
            loop {
                let Some(state) = registry.get(task_id) else {
                    anyhow::bail!("task {task_id} disappeared from the registry");
                };
                if state.message != last_message {
                    println!("[{}%] {}", state.progress, state.message);
                    last_message = state.message.clone();
                }
                match state.status {
                    TaskStatus::Done => break,
                    TaskStatus::Error => {
                        anyhow::bail!(
                            "processing failed: {}",
                            state.error.unwrap_or_else(|| "unknown error".to_string())
                        );
                    }
                    _ => tokio::time::sleep(Duration::from_millis(200)).await,
                }
            }
        }
        Command::Search {
            query,
            top_k,
            record_type,
            material_id,
            vendor,
        } => {
            let filters = parse_filters(&record_type, material_id, vendor);
            let query_embedding = embedder.encode(&query);

            let engine = HybridSearchEngine::new(store, index);
            let results = engine
                .search(&query_embedding, top_k, Some(&filters))
                .await?;

            println!("query: {query}");
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "[{}] similarity={:.4} component={} unique_id={} level={}",
                    rank + 1,
                    result.similarity,
                    result.record.component_id,
                    result.record.unique_id,
                    result.record.abs_level
                );
                println!("  name={}", result.record.clean_name);
                if !result.record.path.is_empty() {
                    println!("  path={}", result.record.path);
                }
            }
            if results.is_empty() {
                println!("0 results");
            }
        }
        Command::CrossMatch {
            unique_id,
            top_k,
            same_level,
        } => {
            let engine = HybridSearchEngine::new(store, index);
            let report = engine.cross_match(&unique_id, top_k, same_level).await?;

            println!(
                "source: component={} path={} name={}",
                report.source.component_id, report.source.path, report.source.clean_name
            );

            println!("same_assembly: {}", report.same_assembly.len());
            for candidate in &report.same_assembly {
                println!(
                    "  unique_id={} path={}",
                    candidate.record.unique_id, candidate.record.path
                );
            }

            println!("other_assemblies: {}", report.other_assemblies.len());
            for candidate in &report.other_assemblies {
                println!(
                    "  unique_id={} path={} material={}",
                    candidate.record.unique_id, candidate.record.path, candidate.record.material_id
                );
            }

            println!("analogs: {}", report.analogs.len());
            for candidate in &report.analogs {
                println!(
                    "  similarity={:.4} component={} name={}",
                    candidate.similarity, candidate.record.component_id, candidate.record.clean_name
                );
            }
        }
        Command::Graph { root, max_depth } => {
            let materializer = GraphMaterializer::new(store);
            let view = materializer.build_view(&root, max_depth).await?;

            println!("nodes: {}", view.nodes.len());
            for node in &view.nodes {
                println!(
                    "  id={} component={} level={} name={}",
                    node.id, node.component_id, node.abs_level, node.clean_name
                );
            }
            println!("edges: {}", view.edges.len());
            for edge in &view.edges {
                println!("  {} -> {}", edge.source, edge.target);
            }
        }
        Command::NormalizeVocab {
            category,
            raw,
            abbreviations,
        } => {
            let raw_tokens: Vec<String> = serde_json_from_file(&raw)?;
            let abbreviation_map: BTreeMap<String, String> = match abbreviations {
                Some(path) => serde_json_from_file(&path)?,
                None => BTreeMap::new(),
            };

            let dictionaries = Path::new(&cli.dictionaries);
            let report = match category.as_str() {
                "component_types" => {
                    let canonical: BTreeSet<String> =
                        load_clean_list(dictionaries, "component_types")?
                            .into_iter()
                            .collect();
                    bom_search_core::normalize_component_types(
                        &raw_tokens,
                        &abbreviation_map,
                        &canonical,
                    )?
                }
                "materials" => {
                    let cross = bom_search_core::CrossVocabularies {
                        vendors: load_clean_list(dictionaries, "vendors")?.into_iter().collect(),
                        component_types: load_clean_list(dictionaries, "component_types")?
                            .into_iter()
                            .collect(),
                        standards: load_clean_list(dictionaries, "standards")?
                            .into_iter()
                            .collect(),
                    };
                    bom_search_core::normalize_materials(&raw_tokens, &abbreviation_map, &cross)
                }
                "standards" => {
                    bom_search_core::normalize_standards(&raw_tokens, &abbreviation_map)?
                }
                "vendors" => bom_search_core::normalize_vendors(&raw_tokens, &abbreviation_map),
                other => anyhow::bail!("unknown vocabulary category: {other}"),
            };

            std::fs::create_dir_all(dictionaries)?;
            let clean: Vec<&String> = report.clean.iter().collect();
            std::fs::write(
                dictionaries.join(format!("{category}.json")),
                serde_json::to_string_pretty(&clean)?,
            )?;
            std::fs::write(
                dictionaries.join(format!("{category}_noise.json")),
                serde_json::to_string_pretty(&report.noise)?,
            )?;
            std::fs::write(
                dictionaries.join(format!("{category}_map.json")),
                serde_json::to_string_pretty(&report.mapping_used)?,
            )?;

            println!(
                "{category} normalized: clean={} noise={} mappings={}",
                report.clean.len(),
                report.noise.len(),
                report.mapping_used.len()
            );
        }
        Command::Stats => {
            let service = ComponentService::new(Arc::new(store), index, embedder);
            let stats = service.stats().await?;

            println!("total: {}", stats.total);
            println!("assemblies: {}", stats.assemblies);
            println!("subassemblies: {}", stats.subassemblies);
            println!("leafs: {}", stats.leafs);
            println!("max_depth: {}", stats.max_depth);
            println!("unique_materials: {}", stats.unique_materials);
            println!("unique_vendors: {}", stats.unique_vendors);
            println!("unique_types: {}", stats.unique_types);
        }
        Command::RebuildEmbeddings { batch_size } => {
            index.ensure_collection().await?;

            let report = rebuild_embeddings(&store, &index, &embedder, batch_size).await?;
            println!(
                "total={} recomputed={} skipped={} index_empty={}",
                report.total, report.recomputed, report.skipped, report.index_empty
            );
        }
    }

    Ok(())
}
