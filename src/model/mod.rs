pub mod types;
pub mod transcript;
pub mod gene;

pub use types::{
    GeneId, JunctionDiff, JunctionVerdict, StructuralCategory, TranscriptId,
};
