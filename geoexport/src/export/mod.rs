//! Modules d'export (GeoParquet, FlatGeobuf) et sources PostGIS

pub mod error;
pub mod flatgeobuf;
pub mod geoparquet;
pub mod pool;
pub mod postgis;
pub mod projjson;
pub mod reproject;

pub use error::WriteError;
pub use reproject::Reprojector;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geosource::Layer;
use serde::Serialize;
use tracing::info;

/// Bilan d'écriture d'un fichier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Features écrites
    pub features: usize,
    /// Features ignorées (non représentables dans le format)
    pub skipped: usize,
}

/// Format de sortie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum OutputFormat {
    /// GeoParquet 1.0 (géométrie WKB)
    #[value(name = "parquet")]
    GeoParquet,
    /// FlatGeobuf avec index spatial
    #[value(name = "fgb")]
    FlatGeobuf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::GeoParquet => "parquet",
            Self::FlatGeobuf => "fgb",
        }
    }

    /// Écrit la couche dans ce format
    pub fn write(self, layer: &Layer, path: &Path) -> Result<WriteSummary, WriteError> {
        match self {
            Self::GeoParquet => geoparquet::write_geoparquet(layer, path),
            Self::FlatGeobuf => flatgeobuf::write_flatgeobuf(layer, path),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeoParquet => write!(f, "GeoParquet"),
            Self::FlatGeobuf => write!(f, "FlatGeobuf"),
        }
    }
}

/// Destination commune à tous les items d'un lot
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub target_epsg: u32,
}

impl ExportTarget {
    /// Chemin de sortie d'un item
    pub fn output_path(&self, relative_dir: &Path, name: &str) -> PathBuf {
        self.output_dir
            .join(relative_dir)
            .join(format!("{}.{}", name, self.format.extension()))
    }
}

/// Résultat de l'export d'un item
#[derive(Debug, Clone)]
pub struct ItemExport {
    pub output: PathBuf,
    pub features: usize,
    pub skipped: usize,
}

/// Reprojette puis écrit une couche
///
/// `output_name` est le nom de fichier sans extension; le sous-répertoire
/// `relative_dir` est créé sous le répertoire de sortie si besoin.
pub fn export_layer(
    mut layer: Layer,
    target: &ExportTarget,
    relative_dir: &Path,
    output_name: &str,
) -> Result<ItemExport> {
    reproject::reproject_layer(&mut layer, target.target_epsg)?;

    let output = target.output_path(relative_dir, output_name);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create output directory: {}", parent.display()))?;
    }

    let summary = target
        .format
        .write(&layer, &output)
        .context(format!("Failed to write {}", output.display()))?;

    info!(
        layer = %layer.name,
        output = %output.display(),
        features = summary.features,
        "Layer exported"
    );

    Ok(ItemExport {
        output,
        features: summary.features,
        skipped: summary.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point};
    use geosource::{Feature, FieldDef, FieldKind, Value};

    fn layer() -> Layer {
        let mut layer = Layer::new("poi", vec![FieldDef::new("nom", FieldKind::Text)], Some(4326));
        layer.features.push(Feature {
            geometry: Some(Geometry::Point(Point::new(5.72, 45.18))),
            values: vec![Value::Text("Grenoble".into())],
        });
        layer
    }

    #[test]
    fn test_output_path() {
        let target = ExportTarget {
            output_dir: PathBuf::from("/out"),
            format: OutputFormat::FlatGeobuf,
            target_epsg: 4326,
        };
        assert_eq!(
            target.output_path(Path::new("isere"), "poi"),
            PathBuf::from("/out/isere/poi.fgb")
        );
        assert_eq!(
            target.output_path(Path::new(""), "poi"),
            PathBuf::from("/out/poi.fgb")
        );
    }

    #[test]
    fn test_export_layer_creates_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExportTarget {
            output_dir: dir.path().to_path_buf(),
            format: OutputFormat::GeoParquet,
            target_epsg: 3857,
        };

        let result = export_layer(layer(), &target, Path::new("a/b"), "poi").unwrap();
        assert_eq!(result.output, dir.path().join("a/b/poi.parquet"));
        assert_eq!(result.features, 1);
        assert_eq!(result.skipped, 0);
        assert!(result.output.exists());
    }

    #[test]
    fn test_extension() {
        assert_eq!(OutputFormat::GeoParquet.extension(), "parquet");
        assert_eq!(OutputFormat::FlatGeobuf.extension(), "fgb");
    }
}
