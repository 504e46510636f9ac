//! Conversion par lot
//!
//! Énumère les items (tables d'un schéma ou fichiers), les exporte un par un
//! et collecte les résultats dans un [`ExportReport`]. Un échec sur un item
//! n'interrompt jamais le lot; seul un catalogue inaccessible l'interrompt.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use deadpool_postgres::Pool;
use geosource::{collect_sources, SourceFile, SourceFormat};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::export::{export_layer, postgis, ExportTarget, ItemExport};
use crate::report::ExportReport;

/// Lot de fichiers à convertir
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub inputs: Vec<PathBuf>,
    pub format: SourceFormat,
    pub recursive: bool,
    /// Nombre de fichiers traités en parallèle (1 = séquentiel)
    pub jobs: usize,
}

impl FileBatch {
    /// Libellé de la source pour le rapport
    pub fn describe(&self) -> String {
        self.inputs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Fichiers de sortie déjà attribués dans un lot
///
/// Deux items qui écriraient le même fichier (même nom dans deux répertoires
/// d'entrée, ou noms ne différant que par la casse) ne doivent pas s'écraser:
/// le premier dans l'ordre d'énumération garde le fichier, les suivants
/// échouent.
#[derive(Debug, Default)]
struct OutputClaims {
    owners: HashMap<String, String>,
}

impl OutputClaims {
    fn claim(&mut self, output: &Path, item: &str) -> Result<()> {
        let key = output.to_string_lossy().to_lowercase();
        match self.owners.entry(key) {
            Entry::Occupied(owner) => bail!(
                "Output {} already produced by {}",
                output.display(),
                owner.get()
            ),
            Entry::Vacant(slot) => {
                slot.insert(item.to_string());
                Ok(())
            }
        }
    }
}

/// Lit, reprojette et écrit un fichier source
fn export_file(source: &SourceFile, target: &ExportTarget) -> Result<ItemExport> {
    let layer = geosource::read(&source.path)
        .with_context(|| format!("Failed to read {}", source.path.display()))?;
    let name = geosource::layer_name(&source.path);
    export_layer(layer, target, &source.relative_dir, &name)
}

fn record(report: &mut ExportReport, item: &str, outcome: Result<ItemExport>) {
    match outcome {
        Ok(export) => {
            report.record_success(item, &export.output, export.features, export.skipped);
        }
        Err(e) => {
            warn!(item = %item, "Conversion failed: {:#}", e);
            report.record_failure(item, &format!("{:#}", e));
        }
    }
}

/// Convertit un lot de fichiers
///
/// Les résultats sont rapportés dans l'ordre d'énumération, y compris en
/// mode parallèle.
pub fn run_file_batch(batch: &FileBatch, target: &ExportTarget) -> ExportReport {
    let started = Instant::now();
    let mut report = ExportReport::new(&batch.describe(), target.format, target.target_epsg);

    let sources = match collect_sources(&batch.inputs, batch.format, batch.recursive) {
        Ok(sources) => sources,
        Err(e) => {
            warn!("Failed to enumerate input files: {}", e);
            report.abort(&e.to_string());
            report.set_duration(started.elapsed());
            report.finalize();
            return report;
        }
    };

    if sources.is_empty() {
        warn!(
            "No .{} file found in {}",
            batch.format.extension(),
            batch.describe()
        );
    } else {
        info!("Found {} files to convert", sources.len());
    }

    // Attribution des sorties dans l'ordre d'énumération, avant toute écriture
    let mut claims = OutputClaims::default();
    let planned: Vec<(&SourceFile, Result<()>)> = sources
        .iter()
        .map(|source| {
            let output = target.output_path(
                &source.relative_dir,
                &geosource::layer_name(&source.path),
            );
            let claim = claims.claim(&output, &source.path.display().to_string());
            (source, claim)
        })
        .collect();

    let outcomes: Vec<Result<ItemExport>> = if batch.jobs > 1 && sources.len() > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(batch.jobs).build() {
            Ok(pool) => pool.install(|| {
                planned
                    .into_par_iter()
                    .map(|(source, claim)| claim.and_then(|()| export_file(source, target)))
                    .collect()
            }),
            Err(e) => {
                warn!("Failed to build thread pool, converting sequentially: {}", e);
                planned
                    .into_iter()
                    .map(|(source, claim)| claim.and_then(|()| export_file(source, target)))
                    .collect()
            }
        }
    } else {
        planned
            .into_iter()
            .enumerate()
            .map(|(index, (source, claim))| {
                debug!(
                    item = %source.path.display(),
                    "Converting {}/{}",
                    index + 1,
                    sources.len()
                );
                claim.and_then(|()| export_file(source, target))
            })
            .collect()
    };

    for (source, outcome) in sources.iter().zip(outcomes) {
        record(&mut report, &source.path.display().to_string(), outcome);
    }

    report.set_duration(started.elapsed());
    report.finalize();
    report
}

/// Charge une table puis l'écrit hors du runtime async
async fn export_table(
    pool: &Pool,
    schema: &str,
    table: &str,
    config: &ExportConfig,
    target: &ExportTarget,
) -> Result<ItemExport> {
    let layer = postgis::load_layer(pool, schema, table, config.geometry_column(table)).await?;

    let target = target.clone();
    let output_name = config.output_name(table).to_string();
    let export = tokio::task::spawn_blocking(move || {
        export_layer(layer, &target, Path::new(""), &output_name)
    })
    .await
    .context("Export task panicked")??;

    Ok(export)
}

/// Convertit toutes les tables d'un schéma
pub async fn run_postgis_batch(
    pool: &Pool,
    schema: &str,
    config: &ExportConfig,
    target: &ExportTarget,
) -> ExportReport {
    let started = Instant::now();
    let mut report = ExportReport::new(schema, target.format, target.target_epsg);

    let tables = match postgis::list_tables(pool, schema).await {
        Ok(tables) => tables,
        Err(e) => {
            warn!("Failed to list tables of schema {}: {:#}", schema, e);
            report.abort(&format!("{:#}", e));
            report.set_duration(started.elapsed());
            report.finalize();
            return report;
        }
    };

    let tables: Vec<String> = tables
        .into_iter()
        .filter(|table| {
            let skip = config.is_skipped(table);
            if skip {
                debug!(table = %table, "Skipped by configuration");
            }
            !skip
        })
        .collect();

    if tables.is_empty() {
        warn!("No table found in schema {}", schema);
    } else {
        info!("Found {} tables to convert in schema {}", tables.len(), schema);
    }

    let mut claims = OutputClaims::default();
    for (index, table) in tables.iter().enumerate() {
        info!(table = %table, "Converting {}/{}", index + 1, tables.len());
        let output = target.output_path(Path::new(""), config.output_name(table));
        let outcome = match claims.claim(&output, table) {
            Ok(()) => export_table(pool, schema, table, config, target).await,
            Err(e) => Err(e),
        };
        record(&mut report, table, outcome);
    }

    report.set_duration(started.elapsed());
    report.finalize();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::OutputFormat;
    use crate::report::{ExportStatus, ItemOutcome};

    const POINT_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Placemark><name>A</name><Point><coordinates>5.72,45.18</coordinates></Point></Placemark>
</Document></kml>"#;

    fn target(dir: &Path, format: OutputFormat) -> ExportTarget {
        ExportTarget {
            output_dir: dir.to_path_buf(),
            format,
            target_epsg: 4326,
        }
    }

    #[test]
    fn test_output_claims() {
        let mut claims = OutputClaims::default();
        assert!(claims.claim(Path::new("/out/poi.parquet"), "a/poi.kml").is_ok());
        assert!(claims.claim(Path::new("/out/isere/poi.parquet"), "b/isere/poi.kml").is_ok());

        let err = claims
            .claim(Path::new("/out/POI.parquet"), "c/POI.kml")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Output /out/POI.parquet already produced by a/poi.kml"
        );
    }

    #[test]
    fn test_describe() {
        let batch = FileBatch {
            inputs: vec![PathBuf::from("a.kml"), PathBuf::from("dir")],
            format: SourceFormat::Kml,
            recursive: false,
            jobs: 1,
        };
        assert_eq!(batch.describe(), "a.kml, dir");
    }

    #[test]
    fn test_missing_input_aborts() {
        let out = tempfile::tempdir().unwrap();
        let batch = FileBatch {
            inputs: vec![out.path().join("does-not-exist")],
            format: SourceFormat::Kml,
            recursive: false,
            jobs: 1,
        };

        let report = run_file_batch(&batch, &target(out.path(), OutputFormat::GeoParquet));
        assert_eq!(report.status, ExportStatus::Aborted);
        assert!(report.items.is_empty());
    }

    #[test]
    fn test_parallel_keeps_enumeration_order() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["c", "a", "d", "b"] {
            std::fs::write(input.path().join(format!("{}.kml", name)), POINT_KML).unwrap();
        }

        let batch = FileBatch {
            inputs: vec![input.path().to_path_buf()],
            format: SourceFormat::Kml,
            recursive: false,
            jobs: 4,
        };
        let report = run_file_batch(&batch, &target(out.path(), OutputFormat::FlatGeobuf));

        assert_eq!(report.status, ExportStatus::Success);
        let outputs: Vec<_> = report
            .items
            .iter()
            .map(|o| match o {
                ItemOutcome::Converted { output, .. } => output.clone(),
                ItemOutcome::Failed { message, .. } => panic!("unexpected failure: {}", message),
            })
            .collect();
        let expected: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| out.path().join(format!("{}.fgb", n)))
            .collect();
        assert_eq!(outputs, expected);
    }
}
