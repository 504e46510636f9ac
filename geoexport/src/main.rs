//! Point d'entrée CLI pour geoexport

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::{fmt, EnvFilter};

use geosource::SourceFormat;

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Exporter des tables PostGIS, fichiers KML ou Shapefiles vers GeoParquet ou FlatGeobuf
#[derive(Parser)]
#[command(name = "geoexport")]
#[command(author, version)]
#[command(about = "Exporter des données vectorielles vers GeoParquet ou FlatGeobuf")]
#[command(long_about = "Convertit les tables d'un schéma PostGIS, des fichiers KML ou des Shapefiles \
vers GeoParquet ou FlatGeobuf, avec reprojection optionnelle.\n\n\
Un fichier de sortie par table/fichier source. Les paramètres de connexion sont lus \
depuis les variables PG* (ou .env) et peuvent être surchargés en ligne de commande.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Lance la commande, retourne `false` si le lot a échoué
async fn run(command: Commands) -> Result<bool> {
    let (report, report_path) = match command {
        Commands::Postgis(args) => {
            let report_path = args.output.report.clone();
            (cli::cmd_postgis(args).await?, report_path)
        }
        Commands::Kml(args) => {
            let report_path = args.output.report.clone();
            (cli::cmd_files(args, SourceFormat::Kml).await?, report_path)
        }
        Commands::Shapefile(args) => {
            let report_path = args.output.report.clone();
            (cli::cmd_files(args, SourceFormat::Shapefile).await?, report_path)
        }
    };

    cli::finish(&report, report_path.as_ref())?;
    Ok(!report.is_failure())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
