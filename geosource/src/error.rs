//! Types d'erreurs pour le crate geosource

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'une source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Erreur d'I/O lors de la lecture du fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur remontée par le lecteur Shapefile
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// Erreur remontée par le lecteur dBase (.dbf)
    #[error("dBase error: {0}")]
    Dbase(#[from] shapefile::dbase::Error),

    /// Document XML mal formé
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Erreur de parsing d'un fichier
    #[error("Parse error in {file}: {reason}")]
    ParseError { file: String, reason: String },

    /// Format de fichier non supporté
    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    /// Géométrie invalide
    #[error("Invalid geometry for feature {index}: {reason}")]
    InvalidGeometry { index: usize, reason: String },

    /// Erreur lors du parcours d'un répertoire
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl SourceError {
    /// Crée une erreur de parsing avec contexte
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            index,
            reason: reason.into(),
        }
    }
}
