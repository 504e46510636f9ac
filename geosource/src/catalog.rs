//! Énumération des fichiers sources

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::types::SourceFormat;
use crate::SourceError;

/// Fichier source trouvé lors du parcours
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// Chemin complet du fichier
    pub path: PathBuf,

    /// Sous-répertoire relatif à la racine parcourue (vide à la racine)
    pub relative_dir: PathBuf,
}

/// Collecte les fichiers d'un format donné
///
/// Chaque entrée est soit un fichier (gardé si son extension correspond),
/// soit un répertoire (parcouru, récursivement si `recursive`). Le résultat
/// est trié et sans doublon.
pub fn collect_sources(
    inputs: &[PathBuf],
    format: SourceFormat,
    recursive: bool,
) -> Result<Vec<SourceFile>, SourceError> {
    let mut found = BTreeSet::new();

    for input in inputs {
        if input.is_file() {
            if matches_format(input, format) {
                found.insert(SourceFile {
                    path: input.clone(),
                    relative_dir: PathBuf::new(),
                });
            }
            continue;
        }

        if !input.is_dir() {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input path not found: {}", input.display()),
            )));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(input).max_depth(max_depth) {
            let entry = entry?;
            if !entry.file_type().is_file() || !matches_format(entry.path(), format) {
                continue;
            }

            let relative_dir = entry
                .path()
                .parent()
                .and_then(|parent| parent.strip_prefix(input).ok())
                .map(Path::to_path_buf)
                .unwrap_or_default();

            found.insert(SourceFile {
                path: entry.into_path(),
                relative_dir,
            });
        }
    }

    Ok(found.into_iter().collect())
}

fn matches_format(path: &Path, format: SourceFormat) -> bool {
    SourceFormat::from_path(path) == Some(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_collect_counts_only_matching() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.kml"));
        touch(&dir.path().join("b.KML"));
        touch(&dir.path().join("c.shp"));
        touch(&dir.path().join("d.txt"));
        touch(&dir.path().join("sub/e.kml"));

        let flat = collect_sources(&[dir.path().to_path_buf()], SourceFormat::Kml, false).unwrap();
        assert_eq!(flat.len(), 2);

        let deep = collect_sources(&[dir.path().to_path_buf()], SourceFormat::Kml, true).unwrap();
        assert_eq!(deep.len(), 3);
        let nested = deep.iter().find(|s| s.path.ends_with("sub/e.kml")).unwrap();
        assert_eq!(nested.relative_dir, PathBuf::from("sub"));

        let shp = collect_sources(&[dir.path().to_path_buf()], SourceFormat::Shapefile, true)
            .unwrap();
        assert_eq!(shp.len(), 1);
    }

    #[test]
    fn test_collect_explicit_files_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.kml");
        let b = dir.path().join("b.txt");
        touch(&a);
        touch(&b);

        let found =
            collect_sources(&[a.clone(), a.clone(), b], SourceFormat::Kml, false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, a);
        assert!(found[0].relative_dir.as_os_str().is_empty());
    }

    #[test]
    fn test_collect_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let found =
            collect_sources(&[dir.path().to_path_buf()], SourceFormat::Shapefile, true).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_collect_missing_input() {
        let result = collect_sources(
            &[PathBuf::from("/nonexistent/input")],
            SourceFormat::Kml,
            false,
        );
        assert!(result.is_err());
    }
}
