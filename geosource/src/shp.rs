//! Lecture des Shapefiles (.shp + .shx + .dbf, .prj optionnel)

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geo::Geometry;
use shapefile::dbase::{self, FieldType, FieldValue};
use shapefile::Shape;
use tracing::debug;

use crate::crs::epsg_from_prj;
use crate::types::{Feature, FieldDef, FieldKind, Layer, Value};
use crate::{layer_name, SourceError};

/// Lit un Shapefile complet en mémoire
pub fn read(path: &Path) -> Result<Layer, SourceError> {
    let fields = read_schema(path)?;
    let epsg = epsg_from_prj(path);

    let mut layer = Layer::new(layer_name(path), fields, epsg);

    let mut reader = shapefile::Reader::from_path(path)?;
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result?;

        let geometry = shape_to_geometry(shape, index)?;
        let values = layer
            .fields
            .iter()
            .map(|field| {
                record
                    .get(&field.name)
                    .map(|v| field_value(v, field.kind))
                    .unwrap_or(Value::Null)
            })
            .collect();

        layer.features.push(Feature { geometry, values });
    }

    debug!(
        path = %path.display(),
        features = layer.len(),
        fields = layer.fields.len(),
        epsg = ?layer.epsg,
        "Shapefile loaded"
    );

    Ok(layer)
}

/// Lit le schéma attributaire depuis l'en-tête du .dbf
fn read_schema(shp_path: &Path) -> Result<Vec<FieldDef>, SourceError> {
    let dbf_path = ["dbf", "DBF"]
        .iter()
        .map(|ext| shp_path.with_extension(ext))
        .find(|p| p.exists())
        .ok_or_else(|| {
            SourceError::parse_error(shp_path.display().to_string(), "missing .dbf file")
        })?;

    let layouts = read_field_layouts(&dbf_path)?;
    let reader = dbase::Reader::from_path(&dbf_path)?;
    let fields = reader
        .fields()
        .iter()
        .filter(|info| info.name() != "DeletionFlag")
        .map(|info| {
            let layout = layouts
                .iter()
                .find(|(name, _)| name == info.name())
                .map(|(_, layout)| *layout);
            FieldDef::new(info.name(), field_kind(info.field_type(), layout))
        })
        .collect();

    Ok(fields)
}

/// Largeur d'un champ numérique au-delà de laquelle un entier ne tient plus en i64
const MAX_INTEGER_WIDTH: u8 = 18;

/// Largeur et décimales d'un champ dBase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldLayout {
    length: u8,
    decimals: u8,
}

/// Lit les descripteurs de champs du .dbf
///
/// En-tête de 32 octets (taille totale de l'en-tête aux octets 8-9), puis un
/// descripteur de 32 octets par champ: nom sur 11 octets, largeur à l'octet 16,
/// décimales à l'octet 17. La liste se termine par 0x0D.
fn read_field_layouts(dbf_path: &Path) -> Result<Vec<(String, FieldLayout)>, SourceError> {
    let mut file = BufReader::new(File::open(dbf_path)?);

    let mut header = [0u8; 32];
    file.read_exact(&mut header)?;
    let header_len = usize::from(u16::from_le_bytes([header[8], header[9]]));
    let count = header_len.saturating_sub(33) / 32;

    let mut layouts = Vec::with_capacity(count);
    let mut descriptor = [0u8; 32];
    for _ in 0..count {
        file.read_exact(&mut descriptor[..1])?;
        if descriptor[0] == 0x0D {
            break;
        }
        file.read_exact(&mut descriptor[1..])?;

        let name_end = descriptor[..11].iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&descriptor[..name_end]).trim().to_string();
        layouts.push((
            name,
            FieldLayout {
                length: descriptor[16],
                decimals: descriptor[17],
            },
        ));
    }

    Ok(layouts)
}

/// Correspondance type dBase → type d'attribut
///
/// Un `N(w,0)` est un entier (convention des Shapefiles), sauf s'il est trop
/// large pour un i64.
fn field_kind(field_type: FieldType, layout: Option<FieldLayout>) -> FieldKind {
    match field_type {
        FieldType::Integer => FieldKind::Integer,
        FieldType::Numeric
            if layout.is_some_and(|l| l.decimals == 0 && l.length <= MAX_INTEGER_WIDTH) =>
        {
            FieldKind::Integer
        }
        FieldType::Numeric | FieldType::Float | FieldType::Double | FieldType::Currency => {
            FieldKind::Float
        }
        FieldType::Logical => FieldKind::Boolean,
        _ => FieldKind::Text,
    }
}

/// Convertit une valeur dBase vers le type déclaré du champ
fn field_value(value: &FieldValue, kind: FieldKind) -> Value {
    let value = match value {
        FieldValue::Character(Some(s)) => Value::Text(s.trim_end().to_string()),
        FieldValue::Memo(s) => Value::Text(s.clone()),
        FieldValue::Numeric(Some(n)) => Value::Float(*n),
        FieldValue::Float(Some(f)) => Value::Float(f64::from(*f)),
        FieldValue::Double(d) => Value::Float(*d),
        FieldValue::Currency(c) => Value::Float(*c),
        FieldValue::Integer(i) => Value::Integer(i64::from(*i)),
        FieldValue::Logical(Some(b)) => Value::Boolean(*b),
        FieldValue::Date(Some(d)) => Value::Text(format!(
            "{:04}-{:02}-{:02}",
            d.year(),
            d.month(),
            d.day()
        )),
        _ => Value::Null,
    };

    coerce(value, kind)
}

/// Aligne une valeur sur le type du champ (le .dbf n'est pas toujours cohérent)
fn coerce(value: Value, kind: FieldKind) -> Value {
    match (value, kind) {
        (Value::Null, _) => Value::Null,
        (Value::Float(f), FieldKind::Integer) if f.fract() == 0.0 => Value::Integer(f as i64),
        (Value::Integer(i), FieldKind::Float) => Value::Float(i as f64),
        (v @ Value::Text(_), FieldKind::Text)
        | (v @ Value::Integer(_), FieldKind::Integer)
        | (v @ Value::Float(_), FieldKind::Float)
        | (v @ Value::Boolean(_), FieldKind::Boolean) => v,
        (Value::Integer(i), FieldKind::Text) => Value::Text(i.to_string()),
        (Value::Float(f), FieldKind::Text) => Value::Text(f.to_string()),
        (Value::Boolean(b), FieldKind::Text) => Value::Text(b.to_string()),
        _ => Value::Null,
    }
}

/// Convertit une shape en géométrie geo (`None` pour NullShape)
fn shape_to_geometry(shape: Shape, index: usize) -> Result<Option<Geometry>, SourceError> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }

    Geometry::<f64>::try_from(shape)
        .map(Some)
        .map_err(|e| SourceError::invalid_geometry(index, format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(length: u8, decimals: u8) -> Option<FieldLayout> {
        Some(FieldLayout { length, decimals })
    }

    #[test]
    fn test_field_kind() {
        assert_eq!(field_kind(FieldType::Character, layout(50, 0)), FieldKind::Text);
        assert_eq!(field_kind(FieldType::Integer, None), FieldKind::Integer);
        assert_eq!(field_kind(FieldType::Logical, layout(1, 0)), FieldKind::Boolean);
        assert_eq!(field_kind(FieldType::Date, layout(8, 0)), FieldKind::Text);
    }

    #[test]
    fn test_numeric_field_kind() {
        assert_eq!(field_kind(FieldType::Numeric, layout(10, 0)), FieldKind::Integer);
        assert_eq!(field_kind(FieldType::Numeric, layout(18, 0)), FieldKind::Integer);
        assert_eq!(field_kind(FieldType::Numeric, layout(24, 0)), FieldKind::Float);
        assert_eq!(field_kind(FieldType::Numeric, layout(12, 3)), FieldKind::Float);
        assert_eq!(field_kind(FieldType::Numeric, None), FieldKind::Float);
    }

    #[test]
    fn test_read_field_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("villes.shp");
        {
            let table = dbase::TableWriterBuilder::new()
                .add_character_field("nom".try_into().unwrap(), 50)
                .add_numeric_field("pop".try_into().unwrap(), 10, 0)
                .add_numeric_field("surface".try_into().unwrap(), 12, 3);
            let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();
            let mut record = dbase::Record::default();
            record.insert("nom".to_string(), FieldValue::Character(Some("Grenoble".into())));
            record.insert("pop".to_string(), FieldValue::Numeric(Some(158000.0)));
            record.insert("surface".to_string(), FieldValue::Numeric(Some(18.13)));
            writer
                .write_shape_and_record(&shapefile::Point::new(5.72, 45.18), &record)
                .unwrap();
        }

        let layouts = read_field_layouts(&shp.with_extension("dbf")).unwrap();
        assert_eq!(
            layouts,
            vec![
                ("nom".to_string(), FieldLayout { length: 50, decimals: 0 }),
                ("pop".to_string(), FieldLayout { length: 10, decimals: 0 }),
                ("surface".to_string(), FieldLayout { length: 12, decimals: 3 }),
            ]
        );

        let layer = read(&shp).unwrap();
        let kinds: Vec<_> = layer.fields.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FieldKind::Text, FieldKind::Integer, FieldKind::Float]);
        assert_eq!(layer.features[0].values[1], Value::Integer(158000));
        assert_eq!(layer.features[0].values[2], Value::Float(18.13));
    }

    #[test]
    fn test_field_value_character_trimmed() {
        let v = field_value(
            &FieldValue::Character(Some("Paris   ".to_string())),
            FieldKind::Text,
        );
        assert_eq!(v, Value::Text("Paris".to_string()));
    }

    #[test]
    fn test_field_value_nulls() {
        assert_eq!(
            field_value(&FieldValue::Character(None), FieldKind::Text),
            Value::Null
        );
        assert_eq!(
            field_value(&FieldValue::Numeric(None), FieldKind::Float),
            Value::Null
        );
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(Value::Float(3.0), FieldKind::Integer), Value::Integer(3));
        assert_eq!(coerce(Value::Float(3.5), FieldKind::Integer), Value::Null);
        assert_eq!(coerce(Value::Integer(2), FieldKind::Float), Value::Float(2.0));
        assert_eq!(
            coerce(Value::Integer(2), FieldKind::Text),
            Value::Text("2".to_string())
        );
    }

    #[test]
    fn test_null_shape() {
        assert!(shape_to_geometry(Shape::NullShape, 0).unwrap().is_none());
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read(Path::new("/nonexistent/roads.shp")).is_err());
    }
}
