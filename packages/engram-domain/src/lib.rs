pub mod drift;
pub mod fingerprint;
pub mod record;
pub mod reindex;
pub mod similarity;
pub mod version;

mod error;

pub use drift::DriftResult;
pub use error::Error;
pub use record::{MemoryRecord, RecordKind, meta};
pub use reindex::{ReindexJob, ReindexReason, StalenessReason};
pub use similarity::cosine_similarity;
pub use version::EmbeddingVersion;

pub type Result<T, E = Error> = std::result::Result<T, E>;
