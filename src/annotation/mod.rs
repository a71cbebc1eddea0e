pub mod builder;
pub mod io;

pub use builder::{AnnotationBuilder, QuerySet};
pub use io::{AnnotationReader, AnnotationRecord, Dialect, ParseError};
