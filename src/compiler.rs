//! Operation Compiler - validated rules to landmark-anchored transforms
//!
//! One descriptor per rule, in rule order. Centimeters become document units
//! here and nowhere else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operations::{Operation, TransformKind};
use crate::schema::{BlockFamily, BlockSchema, Landmark, Piece};
use crate::validation::ValidatedRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// A landmark on a specific piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LandmarkRef {
    pub piece: Piece,
    pub landmark: Landmark,
}

/// Compiled transform, consumed once by the transformer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformDescriptor {
    /// Index of the originating rule.
    pub rule_index: usize,
    pub operation: Operation,
    pub kind: TransformKind,
    pub axis: Axis,
    /// Signed displacement in document units.
    pub magnitude: f64,
    pub target_landmarks: Vec<LandmarkRef>,
    /// Seams that follow the moved landmark, per targeted piece.
    pub blend_region: Vec<LandmarkRef>,
}

impl TransformDescriptor {
    pub fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        self.target_landmarks.iter().map(|t| t.piece)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("Rule {rule_index}: {operation} is not supported for {family} ({landmark} absent)")]
    UnsupportedCombination {
        rule_index: usize,
        operation: Operation,
        family: BlockFamily,
        landmark: Landmark,
    },
}

pub struct OperationCompiler<'a> {
    schema: &'a BlockSchema,
}

impl<'a> OperationCompiler<'a> {
    pub fn new(schema: &'a BlockSchema) -> Self {
        Self { schema }
    }

    pub fn compile(&self, rules: &[ValidatedRule]) -> Result<Vec<TransformDescriptor>, CompileError> {
        rules.iter().map(|rule| self.compile_rule(rule)).collect()
    }

    fn compile_rule(&self, rule: &ValidatedRule) -> Result<TransformDescriptor, CompileError> {
        let operation = rule.operation();
        let target = operation.target();

        let target_landmarks: Vec<LandmarkRef> = self
            .schema
            .pieces_for(target)
            .map(|piece| LandmarkRef { piece, landmark: target })
            .collect();
        if target_landmarks.is_empty() {
            return Err(CompileError::UnsupportedCombination {
                rule_index: rule.index(),
                operation,
                family: self.schema.family,
                landmark: target,
            });
        }

        let blend_region = target_landmarks
            .iter()
            .flat_map(|t| {
                operation
                    .blend_region()
                    .iter()
                    .filter(move |seam| self.schema.has_landmark(t.piece, **seam))
                    .map(move |seam| LandmarkRef {
                        piece: t.piece,
                        landmark: *seam,
                    })
            })
            .collect();

        let axis = match operation.kind() {
            TransformKind::Scale => Axis::Horizontal,
            TransformKind::Translate | TransformKind::CurveReshape => Axis::Vertical,
        };

        Ok(TransformDescriptor {
            rule_index: rule.index(),
            operation,
            kind: operation.kind(),
            axis,
            magnitude: self.schema.to_document_units(rule.signed_cm()),
            target_landmarks,
            blend_region,
        })
    }
}
