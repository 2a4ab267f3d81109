//! Adjustment Pipeline - Single Entry Point
//!
//! validate -> compile -> apply -> serialize. Every call re-validates its
//! rules; there is no path from raw rules to geometry that skips validation.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::{CompileError, OperationCompiler, TransformDescriptor};
use crate::document::{DocumentError, PatternDocument, ResolveError};
use crate::hashing::{compute_job_hash, document_digest};
use crate::operations::OperationTable;
use crate::schema::{BlockFamily, BlockSchema, Landmark, Piece, SchemaRegistry};
use crate::transform::{GeometryError, GeometryTransformer, PieceMap};
use crate::validation::{RawRule, RuleValidator, ValidatedRule, ValidationError, ValidationErrorKind};
use crate::ENGINE_VERSION;

/// Coarse error taxonomy exposed across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidOperation,
    MissingValue,
    NonNumericValue,
    OutOfRange,
    EmptyRuleset,
    UnsupportedCombination,
    MissingLandmark,
    DegenerateResult,
    MalformedBaseDocument,
    GeometryApplicationFailed,
    InternalError,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Geometry failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Malformed base document for {piece}: {source}")]
    MalformedDocument {
        piece: Piece,
        #[source]
        source: DocumentError,
    },

    #[error("Family {0} is not in the loaded schema table")]
    FamilyUnavailable(BlockFamily),

    #[error("Application exceeded its {0:?} budget")]
    BudgetExceeded(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Non-sensitive context attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece: Option<Piece>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<Landmark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<BlockFamily>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_kind: ErrorKind,
    pub details: ErrorDetails,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(e) => match e.kind() {
                ValidationErrorKind::InvalidOperation => ErrorKind::InvalidOperation,
                ValidationErrorKind::MissingValue => ErrorKind::MissingValue,
                ValidationErrorKind::NonNumericValue => ErrorKind::NonNumericValue,
                ValidationErrorKind::OutOfRange => ErrorKind::OutOfRange,
                ValidationErrorKind::EmptyRuleset => ErrorKind::EmptyRuleset,
            },
            PipelineError::Compile(_) | PipelineError::FamilyUnavailable(_) => ErrorKind::UnsupportedCombination,
            PipelineError::Geometry(e) => match e {
                GeometryError::MissingLandmark { .. } => ErrorKind::MissingLandmark,
                GeometryError::DegenerateResult { .. } => ErrorKind::DegenerateResult,
                GeometryError::MissingPiece(_) | GeometryError::MalformedLandmark { .. } => {
                    ErrorKind::MalformedBaseDocument
                }
            },
            PipelineError::MalformedDocument { .. } => ErrorKind::MalformedBaseDocument,
            PipelineError::BudgetExceeded(_) => ErrorKind::GeometryApplicationFailed,
            PipelineError::Serialization(_) => ErrorKind::InternalError,
        }
    }

    pub fn details(&self) -> ErrorDetails {
        match self {
            PipelineError::Validation(e) => ErrorDetails {
                operation: e.operation_name(),
                rule_index: e.rule_index(),
                ..Default::default()
            },
            PipelineError::Compile(CompileError::UnsupportedCombination {
                rule_index,
                operation,
                landmark,
                ..
            }) => ErrorDetails {
                operation: Some(operation.to_string()),
                rule_index: Some(*rule_index),
                landmark: Some(*landmark),
                ..Default::default()
            },
            PipelineError::Geometry(GeometryError::MissingLandmark { piece, landmark }) => ErrorDetails {
                piece: Some(*piece),
                landmark: Some(*landmark),
                ..Default::default()
            },
            PipelineError::Geometry(GeometryError::DegenerateResult {
                rule_index,
                operation,
                piece,
                landmark,
                ..
            }) => ErrorDetails {
                operation: Some(operation.to_string()),
                rule_index: Some(*rule_index),
                piece: Some(*piece),
                landmark: Some(*landmark),
                ..Default::default()
            },
            PipelineError::Geometry(GeometryError::MissingPiece(piece))
            | PipelineError::MalformedDocument { piece, .. } => ErrorDetails {
                piece: Some(*piece),
                ..Default::default()
            },
            PipelineError::Geometry(GeometryError::MalformedLandmark { piece, source }) => ErrorDetails {
                piece: Some(*piece),
                landmark: Some(match source {
                    ResolveError::Missing(l) | ResolveError::NoGeometry(l) => *l,
                    ResolveError::InvalidGeometry { landmark, .. } => *landmark,
                }),
                ..Default::default()
            },
            PipelineError::FamilyUnavailable(family) => ErrorDetails {
                family: Some(*family),
                ..Default::default()
            },
            PipelineError::BudgetExceeded(_) | PipelineError::Serialization(_) => ErrorDetails::default(),
        }
    }

    /// The coarse shape handed to transport layers.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error_kind: self.kind(),
            details: self.details(),
        }
    }
}

/// Output of a successful application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPattern {
    pub family: BlockFamily,
    /// Serialized markup for every supplied piece.
    pub documents: PieceMap<String>,
    pub digests: PieceMap<String>,
    pub job_hash: String,
}

/// The adjustment pipeline. Holds only immutable tables.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    registry: SchemaRegistry,
    table: OperationTable,
}

impl Pipeline {
    pub fn new(registry: SchemaRegistry, table: OperationTable) -> Self {
        Self { registry, table }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn operations(&self) -> &OperationTable {
        &self.table
    }

    /// Validate raw rules for a family.
    ///
    /// This is the ONLY validation entry point.
    pub fn validate_rules(&self, family: BlockFamily, rules: &[RawRule]) -> Result<Vec<ValidatedRule>, PipelineError> {
        RuleValidator::new(&self.table).validate(rules, family).map_err(|e| {
            warn!(family = %family, error = %e, "rules rejected");
            PipelineError::from(e)
        })
    }

    /// Validate and compile without touching any document.
    pub fn compile_rules(&self, family: BlockFamily, rules: &[RawRule]) -> Result<Vec<TransformDescriptor>, PipelineError> {
        let validated = self.validate_rules(family, rules)?;
        self.compile_validated(family, &validated)
    }

    /// Apply raw rules to parsed base documents.
    pub fn apply_documents(
        &self,
        family: BlockFamily,
        base: &PieceMap<PatternDocument>,
        rules: &[RawRule],
    ) -> Result<PieceMap<PatternDocument>, PipelineError> {
        let descriptors = self.compile_rules(family, rules)?;
        self.transform(family, base, &descriptors)
    }

    /// Apply raw rules to base markup and serialize every piece.
    pub fn apply_rules(
        &self,
        family: BlockFamily,
        base: &PieceMap<String>,
        rules: &[RawRule],
    ) -> Result<AppliedPattern, PipelineError> {
        info!(family = %family, rules = rules.len(), pieces = base.len(), "applying rules");

        let mut documents = PieceMap::new();
        for (piece, text) in base {
            let doc = PatternDocument::parse(text)
                .map_err(|source| PipelineError::MalformedDocument { piece: *piece, source })?;
            documents.insert(*piece, doc);
        }

        let validated = self.validate_rules(family, rules)?;
        let descriptors = self.compile_validated(family, &validated)?;
        let modified = self.transform(family, &documents, &descriptors)?;

        let documents: PieceMap<String> = modified.iter().map(|(piece, doc)| (*piece, doc.serialize())).collect();
        let digests = documents
            .iter()
            .map(|(piece, text)| (*piece, document_digest(text)))
            .collect();
        let job_hash = compute_job_hash(family.as_str(), self.registry.version(), &validated, ENGINE_VERSION)?;

        Ok(AppliedPattern {
            family,
            documents,
            digests,
            job_hash,
        })
    }

    fn schema(&self, family: BlockFamily) -> Result<&BlockSchema, PipelineError> {
        self.registry.lookup(family).map_err(|_| {
            warn!(family = %family, version = self.registry.version(), "family missing from schema table");
            PipelineError::FamilyUnavailable(family)
        })
    }

    fn compile_validated(
        &self,
        family: BlockFamily,
        validated: &[ValidatedRule],
    ) -> Result<Vec<TransformDescriptor>, PipelineError> {
        let schema = self.schema(family)?;
        let descriptors = OperationCompiler::new(schema).compile(validated)?;
        debug!(family = %family, descriptors = descriptors.len(), "rules compiled");
        Ok(descriptors)
    }

    fn transform(
        &self,
        family: BlockFamily,
        base: &PieceMap<PatternDocument>,
        descriptors: &[TransformDescriptor],
    ) -> Result<PieceMap<PatternDocument>, PipelineError> {
        let schema = self.schema(family)?;
        GeometryTransformer::new(schema).apply(base, descriptors).map_err(|e| {
            warn!(family = %family, error = %e, "geometry rejected");
            PipelineError::from(e)
        })
    }

    /// Like [`Pipeline::apply_rules`], but an overrun of `budget` is fatal.
    ///
    /// The core has no cancellation point; the budget is checked once the
    /// bounded work has finished and the result is discarded on overrun.
    pub fn apply_rules_within(
        &self,
        family: BlockFamily,
        base: &PieceMap<String>,
        rules: &[RawRule],
        budget: Duration,
    ) -> Result<AppliedPattern, PipelineError> {
        let started = Instant::now();
        let applied = self.apply_rules(family, base, rules)?;
        if started.elapsed() > budget {
            warn!(family = %family, ?budget, "application over budget");
            return Err(PipelineError::BudgetExceeded(budget));
        }
        Ok(applied)
    }
}

/// Apply rules with the built-in schema and operation tables.
pub fn apply_rules(
    family: BlockFamily,
    base: &PieceMap<String>,
    rules: &[RawRule],
) -> Result<AppliedPattern, PipelineError> {
    Pipeline::default().apply_rules(family, base, rules)
}
