//! # geoexport
//!
//! Export de données vectorielles (tables PostGIS, KML, Shapefiles) vers
//! GeoParquet ou FlatGeobuf.
//!
//! ## Features
//!
//! - Lecture PostGIS avec pool de connexions (deadpool, TLS rustls)
//! - Lecture KML/Shapefile via le crate `geosource`
//! - Reprojection PROJ (feature `reproject`), repli pur Rust 4326 ↔ 3857
//! - Écriture GeoParquet 1.0 (WKB) et FlatGeobuf (index spatial)
//! - Rapport par item, un échec n'interrompt pas le lot
//!
//! ## Usage CLI
//!
//! ```bash
//! # Toutes les tables d'un schéma vers GeoParquet (EPSG:4326 par défaut)
//! geoexport postgis --schema public --output ./parquet/
//!
//! # Fichiers KML vers FlatGeobuf en Web Mercator
//! geoexport kml --input a.kml b.kml --output ./fgb/ --format fgb --srid EPSG:3857
//!
//! # Répertoire de Shapefiles, récursif, 4 fichiers en parallèle
//! geoexport shapefile --input ./shp/ --output ./out/ --recursive --jobs 4
//! ```

pub mod batch;
pub mod config;
pub mod export;
pub mod report;

pub use config::ExportConfig;
pub use export::pool::{create_pool, DatabaseConfig};
pub use export::{ExportTarget, OutputFormat};
pub use report::{ExportReport, ExportStatus, ItemOutcome};
