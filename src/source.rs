//! Pattern Sources - where base documents come from
//!
//! Loading is the caller's concern. The core only ever sees the text.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::schema::{BlockFamily, Piece};
use crate::transform::PieceMap;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Pattern not found: {family}/{piece}")]
    NotFound { family: BlockFamily, piece: Piece },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supplier of base pattern documents.
pub trait PatternSource {
    fn load(&self, family: BlockFamily, piece: Piece) -> Result<String, SourceError>;
}

/// Reads `<root>/<family>/<piece>.svg`.
#[derive(Debug, Clone)]
pub struct DirectoryPatternSource {
    root: PathBuf,
}

impl DirectoryPatternSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, family: BlockFamily, piece: Piece) -> PathBuf {
        self.root.join(family.as_str()).join(format!("{}.svg", piece.as_str()))
    }
}

impl PatternSource for DirectoryPatternSource {
    fn load(&self, family: BlockFamily, piece: Piece) -> Result<String, SourceError> {
        let path = self.path_for(family, piece);
        if !path.exists() {
            return Err(SourceError::NotFound { family, piece });
        }
        fs::read_to_string(&path).map_err(|source| SourceError::Io { path, source })
    }
}

/// Load all three pieces of a family.
pub fn load_family(source: &dyn PatternSource, family: BlockFamily) -> Result<PieceMap<String>, SourceError> {
    Piece::ALL
        .into_iter()
        .map(|piece| source.load(family, piece).map(|text| (piece, text)))
        .collect()
}
