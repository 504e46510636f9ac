//! Export vers FlatGeobuf

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use flatgeobuf::{ColumnType, FgbCrs, FgbWriter, FgbWriterOptions, GeometryType};
use geosource::{FieldKind, Layer, Value};
use geozero::{ColumnValue, PropertyProcessor};
use tracing::{debug, warn};

use super::error::WriteError;
use super::WriteSummary;

fn column_type(kind: FieldKind) -> ColumnType {
    match kind {
        FieldKind::Text => ColumnType::String,
        FieldKind::Integer => ColumnType::Long,
        FieldKind::Float => ColumnType::Double,
        FieldKind::Boolean => ColumnType::Bool,
    }
}

/// Valeur FlatGeobuf d'un attribut (`None` pour les nulls, omis du fichier)
fn column_value(value: &Value) -> Option<ColumnValue<'_>> {
    match value {
        Value::Null => None,
        Value::Text(s) => Some(ColumnValue::String(s)),
        Value::Integer(i) => Some(ColumnValue::Long(*i)),
        Value::Float(f) => Some(ColumnValue::Double(*f)),
        Value::Boolean(b) => Some(ColumnValue::Bool(*b)),
    }
}

/// Écrit une couche en FlatGeobuf
///
/// Le format n'accepte pas de feature sans géométrie: elles sont ignorées et
/// comptées dans `WriteSummary::skipped`.
pub fn write_flatgeobuf(layer: &Layer, path: &Path) -> Result<WriteSummary, WriteError> {
    let with_geometry = layer.geometry_count();
    let skipped = layer.len() - with_geometry;

    let options = FgbWriterOptions {
        write_index: with_geometry > 0,
        detect_type: true,
        promote_to_multi: true,
        crs: FgbCrs {
            code: layer.epsg.map_or(0, |epsg| epsg as i32),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut fgb = FgbWriter::create_with_options(&layer.name, GeometryType::Unknown, options)?;

    for field in &layer.fields {
        fgb.add_column(&field.name, column_type(field.kind), |_fbb, col| {
            col.nullable = true;
        });
    }

    for feature in &layer.features {
        let Some(geom) = &feature.geometry else {
            continue;
        };

        let mut property_error = None;
        fgb.add_feature_geom(geom.clone(), |feat| {
            for (idx, (field, value)) in layer.fields.iter().zip(&feature.values).enumerate() {
                let Some(value) = column_value(value) else {
                    continue;
                };
                if let Err(e) = feat.property(idx, &field.name, &value) {
                    property_error.get_or_insert(e);
                }
            }
        })?;

        if let Some(e) = property_error {
            return Err(e.into());
        }
    }

    let mut out = BufWriter::new(File::create(path)?);
    fgb.write(&mut out)?;

    if skipped > 0 {
        warn!(
            layer = %layer.name,
            skipped = skipped,
            "Features without geometry skipped (not representable in FlatGeobuf)"
        );
    }

    debug!(
        path = %path.display(),
        features = with_geometry,
        "Wrote FlatGeobuf file"
    );

    Ok(WriteSummary {
        features: with_geometry,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatgeobuf::FgbReader;
    use geo::{Geometry, LineString, Point};
    use geosource::{Feature, FieldDef};

    fn sample_layer() -> Layer {
        let mut layer = Layer::new(
            "routes",
            vec![
                FieldDef::new("nom", FieldKind::Text),
                FieldDef::new("voies", FieldKind::Integer),
            ],
            Some(2154),
        );
        layer.features.push(Feature {
            geometry: Some(Geometry::LineString(LineString::from(vec![
                (900000.0, 6450000.0),
                (900100.0, 6450100.0),
            ]))),
            values: vec![Value::Text("A48".into()), Value::Integer(4)],
        });
        layer.features.push(Feature {
            geometry: Some(Geometry::Point(Point::new(900050.0, 6450050.0))),
            values: vec![Value::Null, Value::Integer(1)],
        });
        layer.features.push(Feature {
            geometry: None,
            values: vec![Value::Text("fantôme".into()), Value::Null],
        });
        layer
    }

    #[test]
    fn test_write_flatgeobuf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.fgb");

        let summary = write_flatgeobuf(&sample_layer(), &path).unwrap();
        assert_eq!(summary.features, 2);
        assert_eq!(summary.skipped, 1);

        let mut file = std::io::BufReader::new(File::open(&path).unwrap());
        let reader = FgbReader::open(&mut file).unwrap();
        let header = reader.header();
        assert_eq!(header.features_count(), 2);
        assert_eq!(header.crs().map(|crs| crs.code()), Some(2154));

        let names: Vec<_> = header
            .columns()
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["nom", "voies"]);
    }

    #[test]
    fn test_write_without_geometries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vide.fgb");

        let mut layer = Layer::new("vide", vec![FieldDef::new("a", FieldKind::Text)], Some(4326));
        layer.features.push(Feature {
            geometry: None,
            values: vec![Value::Text("x".into())],
        });

        let summary = write_flatgeobuf(&layer, &path).unwrap();
        assert_eq!(summary.features, 0);
        assert_eq!(summary.skipped, 1);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
