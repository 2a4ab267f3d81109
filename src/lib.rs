//! PatternForge Core - Pattern Adjustment Compiler
//!
//! # Guarantees
//! 1. Rules Are Untrusted: every call re-validates
//! 2. One Vocabulary, Three Blocks
//! 3. Sequential Composition
//! 4. Atomic Application
//! 5. Deterministic Output
//! 6. Untouched Markup Is Byte-Identical

pub mod schema;
pub mod operations;
pub mod validation;
pub mod compiler;
pub mod geometry;
pub mod document;
pub mod transform;
pub mod hashing;
pub mod source;
pub mod pipeline;

pub use schema::{BlockFamily, BlockSchema, Landmark, Piece, SchemaRegistry};
pub use operations::{Operation, OperationTable, TransformKind, ValueRange};
pub use validation::{RawRule, RuleValidator, ValidatedRule, ValidationError};
pub use compiler::{Axis, CompileError, OperationCompiler, TransformDescriptor};
pub use document::{DocumentError, PatternDocument};
pub use transform::{GeometryError, GeometryTransformer, PieceMap};
pub use hashing::{canonical_json, compute_job_hash, document_digest};
pub use source::{load_family, DirectoryPatternSource, PatternSource};
pub use pipeline::{apply_rules, AppliedPattern, ErrorEnvelope, ErrorKind, Pipeline, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
