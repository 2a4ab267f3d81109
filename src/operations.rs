//! Operation Vocabulary - the closed set of edit intents and their safe ranges

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::schema::{check_engine_version, Landmark, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CropHem,
    ExtendHem,
    AdjustBodyLength,
    AddEaseBody,
    RemoveEaseBody,
    WidenSleeve,
    NarrowSleeve,
    AddEaseSleeve,
    ShortenSleeve,
    ExtendSleeve,
    RaiseNeckline,
    LowerNeckline,
}

/// How an operation moves geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Translate,
    Scale,
    CurveReshape,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::CropHem,
        Operation::ExtendHem,
        Operation::AdjustBodyLength,
        Operation::AddEaseBody,
        Operation::RemoveEaseBody,
        Operation::WidenSleeve,
        Operation::NarrowSleeve,
        Operation::AddEaseSleeve,
        Operation::ShortenSleeve,
        Operation::ExtendSleeve,
        Operation::RaiseNeckline,
        Operation::LowerNeckline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CropHem => "crop_hem",
            Operation::ExtendHem => "extend_hem",
            Operation::AdjustBodyLength => "adjust_body_length",
            Operation::AddEaseBody => "add_ease_body",
            Operation::RemoveEaseBody => "remove_ease_body",
            Operation::WidenSleeve => "widen_sleeve",
            Operation::NarrowSleeve => "narrow_sleeve",
            Operation::AddEaseSleeve => "add_ease_sleeve",
            Operation::ShortenSleeve => "shorten_sleeve",
            Operation::ExtendSleeve => "extend_sleeve",
            Operation::RaiseNeckline => "raise_neckline",
            Operation::LowerNeckline => "lower_neckline",
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Operation::CropHem
            | Operation::ExtendHem
            | Operation::AdjustBodyLength
            | Operation::ShortenSleeve
            | Operation::ExtendSleeve => TransformKind::Translate,
            Operation::AddEaseBody
            | Operation::RemoveEaseBody
            | Operation::WidenSleeve
            | Operation::NarrowSleeve
            | Operation::AddEaseSleeve => TransformKind::Scale,
            Operation::RaiseNeckline | Operation::LowerNeckline => TransformKind::CurveReshape,
        }
    }

    /// The landmark the operation moves.
    pub fn target(&self) -> Landmark {
        match self {
            Operation::CropHem
            | Operation::ExtendHem
            | Operation::AdjustBodyLength
            | Operation::AddEaseBody
            | Operation::RemoveEaseBody => Landmark::HemLine,
            Operation::WidenSleeve | Operation::NarrowSleeve | Operation::AddEaseSleeve => {
                Landmark::SleeveWidthLine
            }
            Operation::ShortenSleeve | Operation::ExtendSleeve => Landmark::SleeveLengthLine,
            Operation::RaiseNeckline | Operation::LowerNeckline => Landmark::NecklineCurve,
        }
    }

    /// Seams whose points follow the moved landmark with a tapering share.
    pub fn blend_region(&self) -> &'static [Landmark] {
        match self.target() {
            Landmark::HemLine | Landmark::SleeveLengthLine => &[Landmark::SideSeam],
            Landmark::SleeveWidthLine => &[Landmark::SideSeam, Landmark::ArmholeCurve],
            _ => &[],
        }
    }

    /// Sign applied to the rule value: y grows downward, so shortening is negative.
    pub fn direction(&self) -> f64 {
        match self {
            Operation::CropHem
            | Operation::RemoveEaseBody
            | Operation::NarrowSleeve
            | Operation::ShortenSleeve
            | Operation::RaiseNeckline => -1.0,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL.into_iter().find(|op| op.as_str() == s).ok_or(())
    }
}

/// Inclusive centimeter window a rule value must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    pub min_cm: f64,
    pub max_cm: f64,
}

impl ValueRange {
    pub const fn new(min_cm: f64, max_cm: f64) -> Self {
        Self { min_cm, max_cm }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_cm && value <= self.max_cm
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Operation table has no range for {0}")]
    MissingOperation(Operation),

    #[error("Operation table range for {0} is invalid")]
    InvalidRange(Operation),

    #[error(transparent)]
    Version(#[from] SchemaError),

    #[error("Failed to read operation table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse operation table: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationTableFile {
    engine_min_version: String,
    ranges: BTreeMap<Operation, ValueRange>,
}

/// Per-operation safe ranges. Constructed once and passed by value; never global.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationTable {
    ranges: BTreeMap<Operation, ValueRange>,
}

impl OperationTable {
    pub fn builtin() -> Self {
        let ranges = Operation::ALL
            .into_iter()
            .map(|op| (op, default_range(op)))
            .collect();
        Self { ranges }
    }

    pub fn from_ranges(ranges: BTreeMap<Operation, ValueRange>) -> Result<Self, TableError> {
        for op in Operation::ALL {
            let range = ranges.get(&op).ok_or(TableError::MissingOperation(op))?;
            if !range.min_cm.is_finite() || !range.max_cm.is_finite() || range.min_cm > range.max_cm {
                return Err(TableError::InvalidRange(op));
            }
        }
        Ok(Self { ranges })
    }

    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let file: OperationTableFile = serde_json::from_str(json)?;
        check_engine_version(&file.engine_min_version)?;
        Self::from_ranges(file.ranges)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, TableError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn range(&self, op: Operation) -> ValueRange {
        self.ranges.get(&op).copied().unwrap_or_else(|| default_range(op))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, ValueRange)> + '_ {
        self.ranges.iter().map(|(op, range)| (*op, *range))
    }
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn default_range(op: Operation) -> ValueRange {
    match op {
        Operation::CropHem | Operation::ExtendHem => ValueRange::new(0.0, 30.0),
        Operation::AdjustBodyLength => ValueRange::new(-30.0, 30.0),
        Operation::AddEaseBody | Operation::RemoveEaseBody => ValueRange::new(0.0, 20.0),
        Operation::WidenSleeve => ValueRange::new(0.0, 15.0),
        Operation::NarrowSleeve | Operation::AddEaseSleeve => ValueRange::new(0.0, 10.0),
        Operation::ShortenSleeve => ValueRange::new(0.0, 40.0),
        Operation::ExtendSleeve => ValueRange::new(0.0, 20.0),
        Operation::RaiseNeckline => ValueRange::new(0.0, 6.0),
        Operation::LowerNeckline => ValueRange::new(0.0, 12.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_names_parse_back() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>(), Ok(op));
        }
        assert!("make_boxy".parse::<Operation>().is_err());
    }

    #[test]
    fn hem_ops_blend_into_side_seam() {
        assert_eq!(Operation::CropHem.blend_region(), &[Landmark::SideSeam]);
        assert_eq!(Operation::WidenSleeve.blend_region(), &[Landmark::SideSeam, Landmark::ArmholeCurve]);
        assert!(Operation::LowerNeckline.blend_region().is_empty());
    }

    #[test]
    fn table_must_cover_every_operation() {
        let json = r#"{ "engineMinVersion": "1.0.0", "ranges": { "crop_hem": { "minCm": 0, "maxCm": 10 } } }"#;
        let err = OperationTable::from_json(json).unwrap_err();
        assert!(matches!(err, TableError::MissingOperation(_)));
    }

    #[test]
    fn inverted_range_rejected() {
        let mut ranges: BTreeMap<_, _> = OperationTable::builtin().iter().collect();
        ranges.insert(Operation::CropHem, ValueRange::new(5.0, 1.0));
        let err = OperationTable::from_ranges(ranges).unwrap_err();
        assert!(matches!(err, TableError::InvalidRange(Operation::CropHem)));
    }
}
