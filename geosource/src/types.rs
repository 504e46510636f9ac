//! Types de données pour le crate geosource

use geo::Geometry;

/// Code EPSG utilisé quand aucun CRS cible n'est demandé (WGS84)
pub const DEFAULT_EPSG: u32 = 4326;

/// Format d'une source fichier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// ESRI Shapefile (.shp + .shx + .dbf, .prj optionnel)
    Shapefile,
    /// Keyhole Markup Language
    Kml,
}

impl SourceFormat {
    /// Extension (sans point, en minuscules) des fichiers de ce format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Shapefile => "shp",
            Self::Kml => "kml",
        }
    }

    /// Détecte le format depuis l'extension d'un chemin (insensible à la casse)
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "shp" => Some(Self::Shapefile),
            "kml" => Some(Self::Kml),
            _ => None,
        }
    }
}

/// Type d'un attribut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
}

/// Définition d'un attribut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Valeur d'un attribut
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Une feature avec sa géométrie et ses attributs
///
/// `values` est aligné sur `Layer::fields` (même longueur, même ordre).
#[derive(Debug, Clone)]
pub struct Feature {
    /// Géométrie (absente pour les enregistrements sans forme)
    pub geometry: Option<Geometry>,

    /// Valeurs des attributs
    pub values: Vec<Value>,
}

/// Une couche vectorielle chargée en mémoire
#[derive(Debug, Clone)]
pub struct Layer {
    /// Nom de la couche (nom de table ou nom de fichier sans extension)
    pub name: String,

    /// Schéma attributaire
    pub fields: Vec<FieldDef>,

    /// Features dans l'ordre de la source
    pub features: Vec<Feature>,

    /// CRS natif (EPSG), `None` si inconnu
    pub epsg: Option<u32>,
}

impl Layer {
    /// Crée une couche vide
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>, epsg: Option<u32>) -> Self {
        Self {
            name: name.into(),
            fields,
            features: Vec::new(),
            epsg,
        }
    }

    /// Nombre de features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Index d'un attribut par son nom
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Nombre de features avec une géométrie
    pub fn geometry_count(&self) -> usize {
        self.features.iter().filter(|f| f.geometry.is_some()).count()
    }
}
