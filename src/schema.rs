//! Block Schema Registry - Landmark Contracts
//!
//! Every family declares the same landmark vocabulary. Absolute coordinates
//! differ between base blocks, placement of landmarks on pieces does not.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::ENGINE_VERSION;

pub const BUILTIN_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockFamily {
    Tshirt,
    LongSleeve,
    CropTop,
}

impl BlockFamily {
    pub const ALL: [BlockFamily; 3] = [BlockFamily::Tshirt, BlockFamily::LongSleeve, BlockFamily::CropTop];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockFamily::Tshirt => "tshirt",
            BlockFamily::LongSleeve => "long_sleeve",
            BlockFamily::CropTop => "crop_top",
        }
    }
}

impl fmt::Display for BlockFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockFamily {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockFamily::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownFamily(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Piece {
    Front,
    Back,
    Sleeve,
}

impl Piece {
    pub const ALL: [Piece; 3] = [Piece::Front, Piece::Back, Piece::Sleeve];

    pub fn as_str(&self) -> &'static str {
        match self {
            Piece::Front => "front",
            Piece::Back => "back",
            Piece::Sleeve => "sleeve",
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Piece {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Piece::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownPiece(s.to_string()))
    }
}

/// Named anchor group on a pattern piece. The serialized name doubles as the
/// element `id` a base document must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    HemLine,
    SideSeam,
    ShoulderLine,
    NecklineCurve,
    ArmholeCurve,
    SleeveWidthLine,
    SleeveLengthLine,
}

impl Landmark {
    pub const ALL: [Landmark; 7] = [
        Landmark::HemLine,
        Landmark::SideSeam,
        Landmark::ShoulderLine,
        Landmark::NecklineCurve,
        Landmark::ArmholeCurve,
        Landmark::SleeveWidthLine,
        Landmark::SleeveLengthLine,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Landmark::HemLine => "hem_line",
            Landmark::SideSeam => "side_seam",
            Landmark::ShoulderLine => "shoulder_line",
            Landmark::NecklineCurve => "neckline_curve",
            Landmark::ArmholeCurve => "armhole_curve",
            Landmark::SleeveWidthLine => "sleeve_width_line",
            Landmark::SleeveLengthLine => "sleeve_length_line",
        }
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unknown block family: {0}")]
    UnknownFamily(String),

    #[error("Unknown piece: {0}")]
    UnknownPiece(String),

    #[error("Family {family} does not declare landmark {landmark}")]
    IncompleteVocabulary { family: BlockFamily, landmark: Landmark },

    #[error("Family {0} has an invalid unit scale")]
    InvalidUnitScale(BlockFamily),

    #[error("Schema table requires engine >= {0}, current is {1}")]
    EngineVersionMismatch(String, String),

    #[error("Invalid schema version: {0}")]
    InvalidVersion(String),

    #[error("Failed to read schema table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Landmark placement and unit scale for one block family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSchema {
    pub family: BlockFamily,
    /// Document units per centimeter.
    pub unit_scale: f64,
    /// Pieces carrying each landmark. An empty set marks the landmark absent.
    pub landmarks: BTreeMap<Landmark, BTreeSet<Piece>>,
}

impl BlockSchema {
    pub fn pieces_for(&self, landmark: Landmark) -> impl Iterator<Item = Piece> + '_ {
        self.landmarks.get(&landmark).into_iter().flatten().copied()
    }

    pub fn has_landmark(&self, piece: Piece, landmark: Landmark) -> bool {
        self.landmarks
            .get(&landmark)
            .map_or(false, |pieces| pieces.contains(&piece))
    }

    pub fn required_landmarks(&self, piece: Piece) -> BTreeSet<Landmark> {
        self.landmarks
            .iter()
            .filter(|(_, pieces)| pieces.contains(&piece))
            .map(|(landmark, _)| *landmark)
            .collect()
    }

    /// Convert a centimeter magnitude to document units.
    pub fn to_document_units(&self, value_cm: f64) -> f64 {
        value_cm * self.unit_scale
    }

    fn check(&self) -> Result<(), SchemaError> {
        if !self.unit_scale.is_finite() || self.unit_scale <= 0.0 {
            return Err(SchemaError::InvalidUnitScale(self.family));
        }
        for landmark in Landmark::ALL {
            if !self.landmarks.contains_key(&landmark) {
                return Err(SchemaError::IncompleteVocabulary { family: self.family, landmark });
            }
        }
        Ok(())
    }
}

/// On-disk shape of a versioned schema table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaTable {
    pub schema_version: String,
    pub engine_min_version: String,
    pub families: Vec<BlockSchema>,
}

/// Schema registry - populated once, read-only afterwards
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
    schemas: BTreeMap<BlockFamily, BlockSchema>,
}

impl SchemaRegistry {
    /// The built-in table: all three families share placement and a 1:1 scale.
    pub fn builtin() -> Self {
        let schemas = BlockFamily::ALL
            .into_iter()
            .map(|family| (family, standard_schema(family)))
            .collect();
        Self {
            version: BUILTIN_SCHEMA_VERSION.to_string(),
            schemas,
        }
    }

    pub fn from_table(table: SchemaTable) -> Result<Self, SchemaError> {
        semver::Version::parse(&table.schema_version)
            .map_err(|_| SchemaError::InvalidVersion(table.schema_version.clone()))?;
        check_engine_version(&table.engine_min_version)?;

        let mut schemas = BTreeMap::new();
        for schema in table.families {
            schema.check()?;
            schemas.insert(schema.family, schema);
        }
        Ok(Self {
            version: table.schema_version,
            schemas,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let table: SchemaTable = serde_json::from_str(json)?;
        Self::from_table(table)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn lookup(&self, family: BlockFamily) -> Result<&BlockSchema, SchemaError> {
        self.schemas
            .get(&family)
            .ok_or_else(|| SchemaError::UnknownFamily(family.to_string()))
    }

    pub fn required_landmarks(&self, family: BlockFamily, piece: Piece) -> Result<BTreeSet<Landmark>, SchemaError> {
        Ok(self.lookup(family)?.required_landmarks(piece))
    }

    pub fn list(&self) -> Vec<&BlockSchema> {
        self.schemas.values().collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn standard_schema(family: BlockFamily) -> BlockSchema {
    use Landmark::*;
    use Piece::*;

    let placement: [(Landmark, &[Piece]); 7] = [
        (HemLine, &[Front, Back]),
        (SideSeam, &[Front, Back, Sleeve]),
        (ShoulderLine, &[Front, Back]),
        (NecklineCurve, &[Front, Back]),
        (ArmholeCurve, &[Front, Back, Sleeve]),
        (SleeveWidthLine, &[Sleeve]),
        (SleeveLengthLine, &[Sleeve]),
    ];

    BlockSchema {
        family,
        unit_scale: 1.0,
        landmarks: placement
            .into_iter()
            .map(|(landmark, pieces)| (landmark, pieces.iter().copied().collect()))
            .collect(),
    }
}

pub(crate) fn check_engine_version(min_version: &str) -> Result<(), SchemaError> {
    let engine_ver = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| SchemaError::InvalidVersion(ENGINE_VERSION.to_string()))?;
    let min_ver = semver::Version::parse(min_version)
        .map_err(|_| SchemaError::InvalidVersion(min_version.to_string()))?;

    if engine_ver < min_ver {
        return Err(SchemaError::EngineVersionMismatch(
            min_version.to_string(),
            ENGINE_VERSION.to_string(),
        ));
    }
    Ok(())
}
