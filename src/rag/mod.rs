//! Course embedding storage and indexing.
//!
//! - `ChunkStore`: the backend seam the retriever searches (`sqlite`, `qdrant`)
//! - `CourseIndexer`: embeds catalog courses into a store

pub mod indexer;
pub mod qdrant;
pub mod sqlite;
pub mod store;

pub use indexer::{consolidate_course_text, import_courses_json, CourseIndexer, IndexReport};
pub use qdrant::QdrantChunkStore;
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkSearchResult, ChunkStore, CourseChunk};
