//! Configuration de l'export PostGIS

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Configuration principale: surcharges par nom de table
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(flatten)]
    pub tables: HashMap<String, TableConfig>,
}

/// Configuration d'une table
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Ne pas exporter cette table
    #[serde(default)]
    pub skip: bool,

    /// Colonne géométrique à utiliser (défaut: celle déclarée par PostGIS)
    #[serde(default)]
    pub geometry_column: Option<String>,

    /// Nom du fichier de sortie sans extension (défaut: nom de la table)
    #[serde(default)]
    pub output: Option<String>,
}

impl ExportConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Récupère la configuration d'une table
    pub fn get_table_config(&self, table: &str) -> Option<&TableConfig> {
        self.tables.get(table)
    }

    /// La table est-elle exclue de l'export
    pub fn is_skipped(&self, table: &str) -> bool {
        self.get_table_config(table).is_some_and(|t| t.skip)
    }

    /// Nom de sortie d'une table
    pub fn output_name<'a>(&'a self, table: &'a str) -> &'a str {
        self.get_table_config(table)
            .and_then(|t| t.output.as_deref())
            .unwrap_or(table)
    }

    /// Colonne géométrique imposée pour une table
    pub fn geometry_column(&self, table: &str) -> Option<&str> {
        self.get_table_config(table)
            .and_then(|t| t.geometry_column.as_deref())
    }
}
