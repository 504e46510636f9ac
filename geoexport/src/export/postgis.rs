//! Lecture des tables PostGIS
//!
//! Une table = une couche: la colonne géométrique vient de `geometry_columns`
//! (ou de la config), les attributs de `information_schema.columns`.

use anyhow::{bail, Context, Result};
use deadpool_postgres::{Object, Pool};
use geo::Geometry;
use geosource::repair::normalize_geometry;
use geosource::{Feature, FieldDef, FieldKind, Layer, Value};
use geozero::wkb::Wkb;
use geozero::ToGeo;
use tokio_postgres::Row;
use tracing::{debug, warn};

/// Nom de colonne géométrique préféré quand une table en déclare plusieurs
const PREFERRED_GEOMETRY_COLUMN: &str = "geom";

/// Colonne géométrique d'une table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryColumn {
    pub name: String,
    /// SRID déclaré, `None` si 0 ou inconnu
    pub epsg: Option<u32>,
}

/// Structure d'une table à exporter
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub name: String,
    pub geometry: GeometryColumn,
    pub fields: Vec<FieldDef>,
}

/// Échappe un identifiant SQL (`"` doublés)
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Type d'attribut pour un `data_type` de information_schema
fn field_kind(data_type: &str) -> FieldKind {
    match data_type {
        "smallint" | "integer" | "bigint" => FieldKind::Integer,
        "real" | "double precision" | "numeric" => FieldKind::Float,
        "boolean" => FieldKind::Boolean,
        _ => FieldKind::Text,
    }
}

/// Expression SELECT d'un attribut, castée vers un type lisible côté Rust
fn select_expr(field: &FieldDef) -> String {
    let cast = match field.kind {
        FieldKind::Integer => "::int8",
        FieldKind::Float => "::float8",
        FieldKind::Boolean => "",
        FieldKind::Text => "::text",
    };
    format!("{}{}", quote_ident(&field.name), cast)
}

/// Construit la requête de lecture d'une table
///
/// Les attributs viennent en premier, la géométrie (WKB 2D) en dernière colonne.
fn build_select(schema: &str, table: &TableDescription) -> String {
    let mut columns: Vec<String> = table.fields.iter().map(select_expr).collect();
    columns.push(format!(
        "ST_AsBinary(ST_Force2D({}))",
        quote_ident(&table.geometry.name)
    ));

    format!(
        "SELECT {} FROM {}.{}",
        columns.join(", "),
        quote_ident(schema),
        quote_ident(&table.name)
    )
}

/// Liste les tables d'un schéma, triées par nom
pub async fn list_tables(pool: &Pool, schema: &str) -> Result<Vec<String>> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let rows = client
        .query(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = $1 ORDER BY table_name",
            &[&schema],
        )
        .await
        .context(format!("Failed to list tables of schema {}", schema))?;

    let tables: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
    debug!(schema = %schema, count = tables.len(), "Tables listed");
    Ok(tables)
}

/// Colonne géométrique d'une table
async fn geometry_column(
    client: &Object,
    schema: &str,
    table: &str,
    geometry_override: Option<&str>,
) -> Result<GeometryColumn> {
    let rows = client
        .query(
            "SELECT f_geometry_column::text, srid FROM geometry_columns \
             WHERE f_table_schema = $1 AND f_table_name = $2 \
             ORDER BY f_geometry_column",
            &[&schema, &table],
        )
        .await
        .context("Failed to query geometry_columns")?;

    let declared: Vec<(String, i32)> = rows.iter().map(|row| (row.get(0), row.get(1))).collect();

    let chosen = match geometry_override {
        Some(name) => declared
            .iter()
            .find(|(col, _)| col == name)
            .cloned()
            // Colonne non déclarée (vue, géométrie non typée): SRID inconnu
            .unwrap_or_else(|| (name.to_string(), 0)),
        None => match declared
            .iter()
            .find(|(col, _)| col == PREFERRED_GEOMETRY_COLUMN)
            .or_else(|| declared.first())
        {
            Some(found) => found.clone(),
            None => bail!("No geometry column found in {}.{}", schema, table),
        },
    };

    if geometry_override.is_none() && declared.len() > 1 {
        warn!(
            table = %table,
            column = %chosen.0,
            "Several geometry columns declared, exporting only one"
        );
    }

    Ok(GeometryColumn {
        name: chosen.0,
        epsg: u32::try_from(chosen.1).ok().filter(|srid| *srid > 0),
    })
}

/// Décrit une table: colonne géométrique et attributs (ordre des colonnes)
pub async fn describe_table(
    client: &Object,
    schema: &str,
    table: &str,
    geometry_override: Option<&str>,
) -> Result<TableDescription> {
    let geometry = geometry_column(client, schema, table, geometry_override).await?;

    let rows = client
        .query(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await
        .context("Failed to query information_schema.columns")?;

    let fields: Vec<FieldDef> = rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
        .filter(|(name, _)| *name != geometry.name)
        .map(|(name, data_type)| FieldDef::new(name, field_kind(&data_type)))
        .collect();

    Ok(TableDescription {
        name: table.to_string(),
        geometry,
        fields,
    })
}

fn row_value(row: &Row, index: usize, kind: FieldKind) -> Result<Value> {
    let value = match kind {
        FieldKind::Integer => row.try_get::<_, Option<i64>>(index)?.map(Value::Integer),
        FieldKind::Float => row.try_get::<_, Option<f64>>(index)?.map(Value::Float),
        FieldKind::Boolean => row.try_get::<_, Option<bool>>(index)?.map(Value::Boolean),
        FieldKind::Text => row.try_get::<_, Option<String>>(index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn row_geometry(row: &Row, index: usize) -> Result<Option<Geometry>> {
    let Some(bytes) = row.try_get::<_, Option<Vec<u8>>>(index)? else {
        return Ok(None);
    };
    let geom = Wkb(bytes).to_geo().context("Invalid WKB geometry")?;
    Ok(normalize_geometry(geom))
}

/// Charge une table entière en couche
///
/// La connexion est empruntée au pool le temps de la lecture seulement.
pub async fn load_layer(
    pool: &Pool,
    schema: &str,
    table: &str,
    geometry_override: Option<&str>,
) -> Result<Layer> {
    let client = pool.get().await.context("Failed to get connection from pool")?;

    let description = describe_table(&client, schema, table, geometry_override).await?;
    let sql = build_select(schema, &description);
    debug!(table = %table, sql = %sql, "Loading table");

    let rows = client
        .query(&sql, &[])
        .await
        .context(format!("Failed to read {}.{}", schema, table))?;
    drop(client);

    let mut layer = Layer::new(table, description.fields, description.geometry.epsg);
    let geometry_index = layer.fields.len();
    layer.features.reserve(rows.len());

    for (row_index, row) in rows.iter().enumerate() {
        let values = layer
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| row_value(row, i, field.kind))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to decode row {}", row_index))?;

        let geometry = row_geometry(row, geometry_index)
            .with_context(|| format!("Failed to decode geometry of row {}", row_index))?;

        layer.features.push(Feature { geometry, values });
    }

    debug!(
        table = %table,
        features = layer.len(),
        epsg = ?layer.epsg,
        "Table loaded"
    );

    Ok(layer)
}
