//! Export vers GeoParquet 1.0 (Arrow + WKB)
//!
//! Une colonne Arrow par attribut, plus une colonne binaire contenant la
//! géométrie en WKB. Les métadonnées `geo` du pied de fichier décrivent la
//! colonne géométrique (encodage, types, emprise, CRS).

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use geo::{BoundingRect, Geometry, Rect};
use geosource::{Feature, FieldKind, Layer, Value};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde_json::json;
use tracing::debug;
use wkb::geom_to_wkb;

use super::error::WriteError;
use super::projjson::crs_projjson;
use super::WriteSummary;

/// Nombre maximal de lignes par RecordBatch / row group
const BATCH_SIZE: usize = 65_536;

/// Version de la spécification GeoParquet écrite
const GEOPARQUET_VERSION: &str = "1.0.0";

/// Écrit une couche en GeoParquet
pub fn write_geoparquet(layer: &Layer, path: &Path) -> Result<WriteSummary, WriteError> {
    let geometry_column = geometry_column_name(layer);
    let schema = build_schema(layer, &geometry_column);
    let metadata = geo_metadata(layer, &geometry_column)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(BATCH_SIZE)
        .set_key_value_metadata(Some(vec![KeyValue::new("geo".to_string(), Some(metadata))]))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let mut offset = 0;
    for chunk in layer.features.chunks(BATCH_SIZE) {
        let batch = build_batch(layer, chunk, offset, &schema)?;
        writer.write(&batch)?;
        offset += chunk.len();
    }
    writer.close()?;

    debug!(
        path = %path.display(),
        rows = layer.len(),
        geometry_column = %geometry_column,
        "Wrote GeoParquet file"
    );

    Ok(WriteSummary {
        features: layer.len(),
        skipped: 0,
    })
}

/// Nom de la colonne géométrique (`geometry`, suffixé si un attribut porte déjà ce nom)
fn geometry_column_name(layer: &Layer) -> String {
    let mut name = "geometry".to_string();
    let mut suffix = 0;
    while layer.field_index(&name).is_some() {
        suffix += 1;
        name = format!("geometry_{}", suffix);
    }
    name
}

fn arrow_type(kind: FieldKind) -> DataType {
    match kind {
        FieldKind::Text => DataType::Utf8,
        FieldKind::Integer => DataType::Int64,
        FieldKind::Float => DataType::Float64,
        FieldKind::Boolean => DataType::Boolean,
    }
}

fn build_schema(layer: &Layer, geometry_column: &str) -> SchemaRef {
    let mut fields: Vec<Field> = layer
        .fields
        .iter()
        .map(|f| Field::new(&f.name, arrow_type(f.kind), true))
        .collect();
    fields.push(Field::new(geometry_column, DataType::Binary, true));
    Arc::new(Schema::new(fields))
}

/// Construit un RecordBatch pour une tranche de features
fn build_batch(
    layer: &Layer,
    features: &[Feature],
    offset: usize,
    schema: &SchemaRef,
) -> Result<RecordBatch, WriteError> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(layer.fields.len() + 1);

    for (idx, field) in layer.fields.iter().enumerate() {
        let values = features.iter().map(|f| &f.values[idx]);
        columns.push(build_column(field.kind, values, features.len()));
    }

    let mut geometries = BinaryBuilder::with_capacity(features.len(), features.len() * 64);
    for (i, feature) in features.iter().enumerate() {
        match &feature.geometry {
            Some(geom) => {
                let bytes = geom_to_wkb(geom).map_err(|e| WriteError::Wkb {
                    index: offset + i,
                    reason: format!("{:?}", e),
                })?;
                geometries.append_value(bytes);
            }
            None => geometries.append_null(),
        }
    }
    columns.push(Arc::new(geometries.finish()));

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Construit une colonne Arrow; les valeurs d'un autre type deviennent nulles
fn build_column<'a>(
    kind: FieldKind,
    values: impl Iterator<Item = &'a Value>,
    len: usize,
) -> ArrayRef {
    match kind {
        FieldKind::Text => {
            let mut builder = StringBuilder::with_capacity(len, len * 16);
            for value in values {
                match value {
                    Value::Text(s) => builder.append_value(s),
                    Value::Integer(i) => builder.append_value(i.to_string()),
                    Value::Float(f) => builder.append_value(f.to_string()),
                    Value::Boolean(b) => builder.append_value(b.to_string()),
                    Value::Null => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldKind::Integer => {
            let mut builder = Int64Builder::with_capacity(len);
            for value in values {
                match value {
                    Value::Integer(i) => builder.append_value(*i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldKind::Float => {
            let mut builder = Float64Builder::with_capacity(len);
            for value in values {
                match value {
                    Value::Float(f) => builder.append_value(*f),
                    Value::Integer(i) => builder.append_value(*i as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldKind::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(len);
            for value in values {
                match value {
                    Value::Boolean(b) => builder.append_value(*b),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Métadonnées `geo` (JSON) du pied de fichier
fn geo_metadata(layer: &Layer, geometry_column: &str) -> Result<String, WriteError> {
    let geometry_types: BTreeSet<&'static str> = layer
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(geometry_type_name)
        .collect();

    let mut column = json!({
        "encoding": "WKB",
        "geometry_types": geometry_types,
    });

    if let Some(bbox) = layer_bbox(layer) {
        column["bbox"] = json!([bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y]);
    }
    if let Some(crs) = layer.epsg.map(crs_projjson).transpose()?.flatten() {
        column["crs"] = crs;
    }

    let metadata = json!({
        "version": GEOPARQUET_VERSION,
        "primary_column": geometry_column,
        "columns": { geometry_column: column },
    });

    Ok(serde_json::to_string(&metadata)?)
}

/// Nom GeoParquet du type de géométrie
fn geometry_type_name(geom: &Geometry) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::LineString(_) | Geometry::Line(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Emprise de toutes les géométries de la couche
fn layer_bbox(layer: &Layer) -> Option<Rect> {
    layer
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref()?.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, Polygon, LineString};
    use geosource::FieldDef;
    use parquet::file::reader::{FileReader, SerializedFileReader};

    fn sample_layer() -> Layer {
        let mut layer = Layer::new(
            "communes",
            vec![
                FieldDef::new("nom", FieldKind::Text),
                FieldDef::new("population", FieldKind::Integer),
                FieldDef::new("surface", FieldKind::Float),
                FieldDef::new("littoral", FieldKind::Boolean),
            ],
            Some(4326),
        );
        layer.features.push(Feature {
            geometry: Some(Geometry::Point(Point::new(5.72, 45.18))),
            values: vec![
                Value::Text("Grenoble".into()),
                Value::Integer(158_000),
                Value::Float(18.13),
                Value::Boolean(false),
            ],
        });
        layer.features.push(Feature {
            geometry: Some(Geometry::Polygon(Polygon::new(
                LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
                vec![],
            ))),
            values: vec![Value::Null, Value::Null, Value::Integer(2), Value::Null],
        });
        layer.features.push(Feature {
            geometry: None,
            values: vec![
                Value::Text("Sans forme".into()),
                Value::Integer(1),
                Value::Null,
                Value::Boolean(true),
            ],
        });
        layer
    }

    #[test]
    fn test_write_geoparquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("communes.parquet");

        let summary = write_geoparquet(&sample_layer(), &path).unwrap();
        assert_eq!(summary.features, 3);
        assert_eq!(summary.skipped, 0);

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let file_metadata = reader.metadata().file_metadata();
        assert_eq!(file_metadata.num_rows(), 3);

        let columns: Vec<_> = file_metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            columns,
            vec!["nom", "population", "surface", "littoral", "geometry"]
        );

        let geo = file_metadata
            .key_value_metadata()
            .unwrap()
            .iter()
            .find(|kv| kv.key == "geo")
            .and_then(|kv| kv.value.clone())
            .unwrap();
        let geo: serde_json::Value = serde_json::from_str(&geo).unwrap();
        assert_eq!(geo["version"], "1.0.0");
        assert_eq!(geo["primary_column"], "geometry");
        assert_eq!(geo["columns"]["geometry"]["encoding"], "WKB");
        // EPSG:4326 = CRS par défaut de GeoParquet, pas de clé crs
        assert!(geo["columns"]["geometry"].get("crs").is_none());
        assert_eq!(
            geo["columns"]["geometry"]["geometry_types"],
            json!(["Point", "Polygon"])
        );
        assert_eq!(
            geo["columns"]["geometry"]["bbox"],
            json!([0.0, 0.0, 5.72, 45.18])
        );
    }

    #[test]
    fn test_write_empty_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let layer = Layer::new("empty", vec![FieldDef::new("a", FieldKind::Text)], Some(3857));

        let summary = write_geoparquet(&layer, &path).unwrap();
        assert_eq!(summary.features, 0);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    }

    #[test]
    fn test_geometry_column_name_collision() {
        let layer = Layer::new(
            "t",
            vec![
                FieldDef::new("geometry", FieldKind::Text),
                FieldDef::new("geometry_1", FieldKind::Text),
            ],
            None,
        );
        assert_eq!(geometry_column_name(&layer), "geometry_2");
    }

    #[test]
    fn test_projected_crs_metadata() {
        let mut layer = sample_layer();
        layer.epsg = Some(3857);

        let geo: serde_json::Value =
            serde_json::from_str(&geo_metadata(&layer, "geometry").unwrap()).unwrap();
        let crs = &geo["columns"]["geometry"]["crs"];
        assert_eq!(crs["type"], "ProjectedCRS");
        assert_eq!(crs["id"]["code"], 3857);
        assert!(crs["base_crs"]["datum_ensemble"].is_object());
        assert!(crs["conversion"].is_object());
    }

    #[test]
    fn test_unsupported_crs_fails_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut layer = sample_layer();
        layer.epsg = Some(999_999);

        let result = write_geoparquet(&layer, &dir.path().join("x.parquet"));
        assert!(matches!(result, Err(WriteError::Crs { epsg: 999_999, .. })));
    }
}
