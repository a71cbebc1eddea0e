//! isoclass
//!
//! Structural classification of long-read transcript models against a
//! reference annotation. Transcripts are held as genomic blocks (0-based,
//! half-open); each query receives one of nine structural categories
//! (FSM, ISM, NIC, NNC, fusion, antisense, genic, genic_intron, intergenic)
//! and, optionally, its distance to the nearest CAGE peak.

pub mod types;
pub mod interval;
pub mod model;
pub mod annotation;
pub mod index;
pub mod compare;
pub mod classify;
pub mod cage;
pub mod output;
pub mod eval;
pub mod error;

pub use index::{IdNameKeys, ReferenceIndex};

pub use annotation::{AnnotationBuilder, QuerySet};

pub use types::{Junction, RefBlock, Strand};

pub use model::gene::Gene;
pub use model::transcript::Transcript;
pub use model::types::{GeneId, JunctionDiff, JunctionVerdict, StructuralCategory, TranscriptId};

pub use cage::{CageHit, CagePeak, CagePeakLocator};
pub use classify::{classify_all, classify_transcript, ClassificationRecord, ClassifyOptions, ClassifyOutcome};
pub use error::{Error, Result};
