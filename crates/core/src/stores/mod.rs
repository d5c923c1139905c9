pub mod qdrant;
pub mod sqlite;

pub use qdrant::QdrantIndex;
pub use sqlite::SqliteComponentStore;
