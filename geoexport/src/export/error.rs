//! Erreurs d'écriture des formats cibles

/// Erreurs pouvant survenir lors de l'écriture d'un fichier de sortie
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Échec de construction des tableaux Arrow
    #[error("Arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Échec d'écriture Parquet
    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Échec d'écriture FlatGeobuf
    #[error("FlatGeobuf write error: {0}")]
    FlatGeobuf(#[from] flatgeobuf::Error),

    /// Échec de traitement d'une géométrie ou d'une propriété
    #[error("Geometry processing error: {0}")]
    Geozero(#[from] geozero::error::GeozeroError),

    /// Échec d'encodage WKB
    #[error("WKB encoding failed for feature {index}: {reason}")]
    Wkb { index: usize, reason: String },

    /// CRS sans description PROJJSON disponible
    #[error("Unsupported CRS EPSG:{epsg}: {reason}")]
    Crs { epsg: u32, reason: String },

    /// Métadonnées GeoParquet non sérialisables
    #[error("Metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Erreur d'I/O sur le fichier de sortie
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
