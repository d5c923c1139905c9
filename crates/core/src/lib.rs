pub mod crossmatch;
pub mod dictionary;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod hierarchy;
pub mod jobs;
pub mod models;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod search;
pub mod service;
pub mod stores;
pub mod sync;
pub mod tasks;
pub mod traits;

pub use crossmatch::{ANALOG_FLOOR, CROSS_MATCH_POOL};
pub use dictionary::{AttributeCategory, DictionaryMatcher, MatchResult, DICTIONARY_CONFIDENCE};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ProcessError, SearchError, StoreError};
pub use extractor::{AttributeExtractor, ExtractionStats, ParsedAttributes, VocabularySet};
pub use graph::{GraphEdge, GraphMaterializer, GraphNode, GraphView, MAX_GRAPH_NODES};
pub use hierarchy::{repair_path, HierarchyBuilder, HierarchyNode, HierarchyStats, SeedRow};
pub use jobs::{run_processing, start_processing};
pub use models::{
    ComponentRecord, ComponentUpdate, CrossMatchReport, EnrichedRow, FilterExpr, FilterField,
    FilterValue, ListFilter, NewComponent, PipelineOptions, RawRow, RecordRole, SearchFilters,
    SearchMatch, StoreStats, UsageCategory, VectorHit, VectorMetadata, VectorPoint,
};
pub use normalize::{
    clean_token, normalize_component_types, normalize_materials, normalize_standards,
    normalize_vendors, CrossVocabularies, NormalizerReport,
};
pub use patterns::{PatternMatcher, PatternMatches};
pub use pipeline::{read_raw_rows, BomProcessor, PipelineStats, ProcessedBatch};
pub use search::{HybridSearchEngine, CANDIDATE_POOL};
pub use service::{parse_update, ComponentService};
pub use stores::{QdrantIndex, SqliteComponentStore};
pub use sync::{rebuild_embeddings, RebuildReport};
pub use tasks::{TaskRegistry, TaskState, TaskStatus};
pub use traits::{ComponentReader, GraphSource, VectorIndex};
