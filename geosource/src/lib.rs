//! # geosource
//!
//! Lecture de sources vectorielles (Shapefile, KML) vers des couches typées en mémoire.
//!
//! ## Features
//!
//! - Shapefile: géométries via `shapefile`, schéma attributaire depuis le .dbf,
//!   CRS depuis le .prj
//! - KML: parser `quick-xml`, Placemark → feature, ExtendedData → attributs
//! - Normalisation des géométries (fermeture des rings, suppression des dégénérées)
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geosource::read;
//! use std::path::Path;
//!
//! let layer = read(Path::new("communes.shp"))?;
//! println!("{}: {} features (EPSG:{:?})", layer.name, layer.len(), layer.epsg);
//! ```

pub mod catalog;
pub mod crs;
pub mod error;
pub mod kml;
pub mod repair;
pub mod shp;
pub mod types;

pub use catalog::{collect_sources, SourceFile};
pub use error::SourceError;
pub use types::{Feature, FieldDef, FieldKind, Layer, SourceFormat, Value, DEFAULT_EPSG};

use std::path::Path;

/// Lit un fichier source (format détecté par l'extension)
///
/// Les géométries sont normalisées (voir [`repair::normalize_geometry`]).
pub fn read(path: &Path) -> Result<Layer, SourceError> {
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| SourceError::UnsupportedFormat(path.display().to_string()))?;

    let mut layer = match format {
        SourceFormat::Shapefile => shp::read(path)?,
        SourceFormat::Kml => kml::read(path)?,
    };

    for feature in &mut layer.features {
        feature.geometry = feature.geometry.take().and_then(repair::normalize_geometry);
    }

    Ok(layer)
}

/// Nom de couche dérivé du nom de fichier (sans extension)
pub fn layer_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_name() {
        assert_eq!(layer_name(Path::new("/data/communes.shp")), "communes");
        assert_eq!(layer_name(Path::new("tracks.2024.kml")), "tracks.2024");
    }

    #[test]
    fn test_read_unsupported() {
        let result = read(Path::new("data.gpkg"));
        assert!(matches!(result, Err(SourceError::UnsupportedFormat(_))));
    }
}
