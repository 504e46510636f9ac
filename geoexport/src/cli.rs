//! Définition et implémentation des commandes CLI
//!
//! - `postgis`: tables d'un schéma → un fichier par table
//! - `kml`: fichiers KML → un fichier par KML
//! - `shapefile`: Shapefiles d'un ou plusieurs répertoires → un fichier par .shp

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use geoexport::batch::{run_file_batch, run_postgis_batch, FileBatch};
use geoexport::export::pool::{create_pool, test_connection, DatabaseOverrides, SslMode};
use geoexport::export::{ExportTarget, OutputFormat};
use geoexport::{DatabaseConfig, ExportConfig, ExportReport};
use geosource::crs::parse_epsg;
use geosource::{SourceFormat, DEFAULT_EPSG};

#[derive(Subcommand)]
pub enum Commands {
    /// Export every table of a PostGIS schema
    Postgis(PostgisArgs),

    /// Convert KML files
    Kml(FileArgs),

    /// Convert Shapefiles
    Shapefile(FileArgs),
}

/// Options communes à tous les exports
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output directory (created if missing)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Target CRS, as 4326 or EPSG:4326 (default: EPSG:4326)
    #[arg(long, value_parser = parse_epsg)]
    pub srid: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::GeoParquet)]
    pub format: OutputFormat,

    /// Write the conversion report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl OutputArgs {
    fn target(&self) -> ExportTarget {
        let target_epsg = self.srid.unwrap_or_else(|| {
            info!("No target CRS given, using EPSG:{}", DEFAULT_EPSG);
            DEFAULT_EPSG
        });

        ExportTarget {
            output_dir: self.output.clone(),
            format: self.format,
            target_epsg,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PostgisArgs {
    /// Source schema
    #[arg(short, long)]
    pub schema: String,

    #[command(flatten)]
    pub output: OutputArgs,

    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// PostgreSQL database name (défaut : env PGDATABASE / postgres)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<SslMode>,

    /// JSON config with per-table overrides (skip, geometry_column, output)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Input files or directories
    #[arg(short, long, num_args = 1.., required = true)]
    pub input: Vec<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Walk input directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of files converted concurrently
    #[arg(long, alias = "threads", default_value_t = 1)]
    pub jobs: usize,
}

/// Exécute l'export PostGIS
pub async fn cmd_postgis(args: PostgisArgs) -> Result<ExportReport> {
    let config = match &args.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };

    let db_config = DatabaseConfig::from_env().with_overrides(DatabaseOverrides {
        host: args.host,
        port: args.port,
        dbname: args.database,
        user: args.user,
        password: args.password,
        ssl: args.ssl,
    });
    let target = args.output.target();

    info!(
        database = %db_config.display_target(),
        schema = %args.schema,
        format = %target.format,
        srid = target.target_epsg,
        "Export PostGIS"
    );

    let pool = create_pool(&db_config)?;
    if let Err(e) = test_connection(&pool).await {
        warn!("Cannot connect to {}: {:#}", db_config.display_target(), e);
        let mut report = ExportReport::new(&args.schema, target.format, target.target_epsg);
        report.abort(&format!("{:#}", e));
        report.finalize();
        return Ok(report);
    }

    let report = run_postgis_batch(&pool, &args.schema, &config, &target).await;
    pool.close();
    Ok(report)
}

/// Exécute la conversion d'un lot de fichiers
pub async fn cmd_files(args: FileArgs, format: SourceFormat) -> Result<ExportReport> {
    let target = args.output.target();
    let batch = FileBatch {
        inputs: args.input,
        format,
        recursive: args.recursive,
        jobs: args.jobs.max(1),
    };

    info!(
        input = %batch.describe(),
        output = %target.output_dir.display(),
        format = %target.format,
        srid = target.target_epsg,
        jobs = batch.jobs,
        "Export fichiers"
    );

    let started = Instant::now();
    let report = tokio::task::spawn_blocking(move || run_file_batch(&batch, &target))
        .await
        .context("Conversion task panicked")?;

    info!("Batch finished in {:.2?}", started.elapsed());
    Ok(report)
}

/// Affiche et sauvegarde le rapport
pub fn finish(report: &ExportReport, report_path: Option<&PathBuf>) -> Result<()> {
    report.display();

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .context(format!("Failed to write report: {}", path.display()))?;
        info!(path = %path.display(), "Report saved");
    }

    info!("{}", report.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_parse_kml_command() {
        let cli = TestCli::try_parse_from([
            "geoexport", "kml", "--input", "a.kml", "b.kml", "--output", "out", "--srid",
            "EPSG:3857", "--format", "fgb",
        ])
        .unwrap();

        let Commands::Kml(args) = cli.command else {
            panic!("Expected kml command");
        };
        assert_eq!(args.input, vec![PathBuf::from("a.kml"), PathBuf::from("b.kml")]);
        assert_eq!(args.output.srid, Some(3857));
        assert_eq!(args.output.format, OutputFormat::FlatGeobuf);
        assert_eq!(args.jobs, 1);
        assert!(!args.recursive);
    }

    #[test]
    fn test_default_target() {
        let cli = TestCli::try_parse_from([
            "geoexport", "shapefile", "-i", "data", "-o", "out", "--recursive",
        ])
        .unwrap();

        let Commands::Shapefile(args) = cli.command else {
            panic!("Expected shapefile command");
        };
        let target = args.output.target();
        assert_eq!(target.target_epsg, DEFAULT_EPSG);
        assert_eq!(target.format, OutputFormat::GeoParquet);
        assert!(args.recursive);
    }

    #[test]
    fn test_parse_postgis_command() {
        let cli = TestCli::try_parse_from([
            "geoexport", "postgis", "--schema", "public", "--output", "out", "--ssl", "require",
            "--port", "5433",
        ])
        .unwrap();

        let Commands::Postgis(args) = cli.command else {
            panic!("Expected postgis command");
        };
        assert_eq!(args.schema, "public");
        assert_eq!(args.ssl, Some(SslMode::Require));
        assert_eq!(args.port, Some(5433));
    }

    #[test]
    fn test_invalid_srid_rejected() {
        let result = TestCli::try_parse_from([
            "geoexport", "kml", "-i", "a.kml", "-o", "out", "--srid", "WGS84",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_input_rejected() {
        let result = TestCli::try_parse_from(["geoexport", "kml", "-o", "out"]);
        assert!(result.is_err());
    }
}
