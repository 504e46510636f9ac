//! Rapport de conversion
//!
//! Chaque item (table ou fichier) produit un résultat, succès ou échec,
//! agrégé dans un rapport affiché une seule fois en fin de lot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::export::OutputFormat;

/// Statut global du lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportStatus {
    /// Tous les items convertis (ou aucun item)
    Success,
    /// Au moins un succès et au moins un échec
    PartialSuccess,
    /// Aucun item converti
    Failed,
    /// Lot interrompu avant le premier item (catalogue inaccessible)
    Aborted,
}

/// Résultat de la conversion d'un item
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    Converted {
        item: String,
        output: PathBuf,
        features: usize,
        skipped: usize,
    },
    Failed {
        item: String,
        message: String,
    },
}

impl ItemOutcome {
    pub fn item(&self) -> &str {
        match self {
            Self::Converted { item, .. } | Self::Failed { item, .. } => item,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }

    /// Message lisible affiché dans le rapport
    pub fn message(&self) -> String {
        match self {
            Self::Converted { item, output, .. } => {
                format!("{} converted to {}.", item, output.display())
            }
            Self::Failed { item, message } => format!("Error converting {}: {}", item, message),
        }
    }
}

/// Rapport complet d'un lot de conversion
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Source du lot (schéma PostGIS ou répertoire/fichiers)
    pub source: String,
    pub format: OutputFormat,
    pub target_epsg: u32,
    pub duration_secs: f64,
    pub status: ExportStatus,
    /// Résultats dans l'ordre d'énumération
    pub items: Vec<ItemOutcome>,
    /// Raison de l'interruption du lot
    pub aborted: Option<String>,
}

impl ExportReport {
    pub fn new(source: &str, format: OutputFormat, target_epsg: u32) -> Self {
        Self {
            source: source.to_string(),
            format,
            target_epsg,
            duration_secs: 0.0,
            status: ExportStatus::Success,
            items: Vec::new(),
            aborted: None,
        }
    }

    /// Enregistre un item converti
    pub fn record_success(&mut self, item: &str, output: &Path, features: usize, skipped: usize) {
        self.items.push(ItemOutcome::Converted {
            item: item.to_string(),
            output: output.to_path_buf(),
            features,
            skipped,
        });
    }

    /// Enregistre un item en échec
    pub fn record_failure(&mut self, item: &str, message: &str) {
        self.items.push(ItemOutcome::Failed {
            item: item.to_string(),
            message: message.to_string(),
        });
    }

    /// Interrompt le lot (catalogue inaccessible)
    pub fn abort(&mut self, reason: &str) {
        self.aborted = Some(reason.to_string());
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let converted = self.converted();
        let failed = self.failed();

        self.status = if self.aborted.is_some() {
            ExportStatus::Aborted
        } else if failed == 0 {
            ExportStatus::Success
        } else if converted > 0 {
            ExportStatus::PartialSuccess
        } else {
            ExportStatus::Failed
        };
    }

    pub fn converted(&self) -> usize {
        self.items.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.converted()
    }

    /// Nombre total de features écrites
    pub fn total_features(&self) -> usize {
        self.items
            .iter()
            .map(|o| match o {
                ItemOutcome::Converted { features, .. } => *features,
                ItemOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Une ligne par item, dans l'ordre d'énumération
    pub fn messages(&self) -> Vec<String> {
        self.items.iter().map(ItemOutcome::message).collect()
    }

    /// Le processus doit-il se terminer en erreur
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ExportStatus::Aborted | ExportStatus::Failed)
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("Conversion Results - {}", self.source);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Format: {} (EPSG:{})", self.format, self.target_epsg);
        println!("Duration: {:.2}s", self.duration_secs);

        if let Some(reason) = &self.aborted {
            println!("\nAborted: {}", reason);
        } else if self.items.is_empty() {
            println!("\nNothing to convert.");
        } else {
            println!();
            for message in self.messages() {
                println!("  {}", message);
            }
            println!(
                "\n{} converted, {} failed, {} features written",
                self.converted(),
                self.failed(),
                self.total_features()
            );
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} converted, {} failed ({:?})",
            self.source,
            self.converted(),
            self.failed(),
            self.status
        )
    }
}
