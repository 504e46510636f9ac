//! Lecture des fichiers KML
//!
//! Chaque `Placemark` du document devient une feature (les `Folder` sont
//! aplatis). Attributs: `name`, `description`, puis les clés `ExtendedData`
//! dans l'ordre de première apparition. Le CRS est toujours WGS84.

use std::collections::HashMap;
use std::path::Path;

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::types::{Feature, FieldDef, FieldKind, Layer, Value, DEFAULT_EPSG};
use crate::{layer_name, SourceError};

/// Élément XML simplifié (nom local, attributs, texte, enfants)
#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }
}

/// Placemark extrait avant construction du schéma
struct Placemark {
    name: Option<String>,
    description: Option<String>,
    data: Vec<(String, String)>,
    geometry: Option<Geometry>,
}

/// Lit un fichier KML
pub fn read(path: &Path) -> Result<Layer, SourceError> {
    let content = std::fs::read_to_string(path)?;
    let file = path.display().to_string();
    let layer = parse_str(&content, &layer_name(path))
        .map_err(|e| match e {
            SourceError::Xml(err) => SourceError::parse_error(file.clone(), err.to_string()),
            other => other,
        })?;

    debug!(
        path = %path.display(),
        features = layer.len(),
        fields = layer.fields.len(),
        "KML loaded"
    );

    Ok(layer)
}

/// Parse un document KML déjà chargé en mémoire
pub fn parse_str(content: &str, name: &str) -> Result<Layer, SourceError> {
    let root = parse_tree(content)?;
    if root.name != "kml" {
        return Err(SourceError::parse_error(
            name,
            format!("root element is <{}>, expected <kml>", root.name),
        ));
    }

    let mut placemarks = Vec::new();
    collect_placemarks(&root, &mut placemarks)?;

    // Schéma: name, description, puis les clés ExtendedData
    let mut fields = vec![
        FieldDef::new("name", FieldKind::Text),
        FieldDef::new("description", FieldKind::Text),
    ];
    let mut columns: HashMap<String, usize> = HashMap::new();
    for placemark in &placemarks {
        for (key, _) in &placemark.data {
            if !columns.contains_key(key) {
                let column = unique_column(&fields, key);
                if &column != key {
                    debug!(key = %key, column = %column, "ExtendedData key renamed");
                }
                columns.insert(key.clone(), fields.len());
                fields.push(FieldDef::new(column, FieldKind::Text));
            }
        }
    }

    let mut layer = Layer::new(name, fields, Some(DEFAULT_EPSG));
    for placemark in placemarks {
        let mut values = vec![Value::Null; layer.fields.len()];
        values[0] = placemark.name.map_or(Value::Null, Value::Text);
        values[1] = placemark.description.map_or(Value::Null, Value::Text);
        for (key, value) in placemark.data {
            if let Some(&idx) = columns.get(&key) {
                values[idx] = Value::Text(value);
            }
        }
        layer.features.push(Feature {
            geometry: placemark.geometry,
            values,
        });
    }

    Ok(layer)
}

/// Nom de colonne libre: `key`, sinon `key_1`, `key_2`…
fn unique_column(fields: &[FieldDef], key: &str) -> String {
    let taken = |name: &str| fields.iter().any(|f| f.name == name);
    if !taken(key) {
        return key.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", key, n))
        .find(|name| !taken(name))
        .unwrap_or_else(|| key.to_string())
}

/// Construit l'arbre XML du document (noms sans préfixe de namespace)
fn parse_tree(content: &str) -> Result<Node, SourceError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(t) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SourceError::parse_error(
            "kml",
            format!("unexpected end of document inside <{}>", stack[stack.len() - 1].name),
        ));
    }

    root.ok_or_else(|| SourceError::parse_error("kml", "empty document"))
}

fn start_node(e: &BytesStart) -> Result<Node, SourceError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Node {
        name,
        attrs,
        ..Default::default()
    })
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Parcourt l'arbre (Document, Folder…) et collecte les Placemark
fn collect_placemarks(node: &Node, out: &mut Vec<Placemark>) -> Result<(), SourceError> {
    for child in &node.children {
        if child.name == "Placemark" {
            let index = out.len();
            out.push(read_placemark(child, index)?);
        } else {
            collect_placemarks(child, out)?;
        }
    }
    Ok(())
}

fn read_placemark(node: &Node, index: usize) -> Result<Placemark, SourceError> {
    let name = node.child_text("name").map(str::to_string);
    let description = node.child_text("description").map(str::to_string);

    let mut data = Vec::new();
    if let Some(extended) = node.child("ExtendedData") {
        read_extended_data(extended, &mut data);
    }

    let mut geometry = None;
    for child in &node.children {
        if let Some(geom) = read_geometry(child, index)? {
            geometry = Some(geom);
            break;
        }
    }

    Ok(Placemark {
        name,
        description,
        data,
        geometry,
    })
}

/// `<Data name="k"><value>v</value></Data>` et `<SimpleData name="k">v</SimpleData>`
fn read_extended_data(node: &Node, out: &mut Vec<(String, String)>) {
    for child in &node.children {
        match child.name.as_str() {
            "Data" => {
                if let Some(key) = child.attr("name") {
                    let value = child.child_text("value").unwrap_or_default();
                    out.push((key.to_string(), value.to_string()));
                }
            }
            "SimpleData" => {
                if let Some(key) = child.attr("name") {
                    out.push((key.to_string(), child.text.trim().to_string()));
                }
            }
            _ => read_extended_data(child, out),
        }
    }
}

/// Lit un élément géométrique KML (`None` si l'élément n'en est pas un)
fn read_geometry(node: &Node, index: usize) -> Result<Option<Geometry>, SourceError> {
    let geom = match node.name.as_str() {
        "Point" => {
            let coords = read_coordinates(node, index)?;
            let coord = coords
                .first()
                .copied()
                .ok_or_else(|| SourceError::invalid_geometry(index, "Point without coordinates"))?;
            Geometry::Point(Point(coord))
        }
        "LineString" | "LinearRing" => {
            Geometry::LineString(LineString::new(read_coordinates(node, index)?))
        }
        "Polygon" => Geometry::Polygon(read_polygon(node, index)?),
        "MultiGeometry" => {
            let mut parts = Vec::new();
            for child in &node.children {
                if let Some(g) = read_geometry(child, index)? {
                    parts.push(g);
                }
            }
            homogenize(parts)
        }
        _ => return Ok(None),
    };
    Ok(Some(geom))
}

fn read_polygon(node: &Node, index: usize) -> Result<Polygon, SourceError> {
    let ring = |boundary: &Node| -> Result<LineString, SourceError> {
        let linear_ring = boundary.child("LinearRing").ok_or_else(|| {
            SourceError::invalid_geometry(index, "boundary without LinearRing")
        })?;
        Ok(LineString::new(read_coordinates(linear_ring, index)?))
    };

    let outer = node
        .child("outerBoundaryIs")
        .ok_or_else(|| SourceError::invalid_geometry(index, "Polygon without outerBoundaryIs"))?;
    let exterior = ring(outer)?;

    let interiors = node
        .children
        .iter()
        .filter(|c| c.name == "innerBoundaryIs")
        .map(ring)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::new(exterior, interiors))
}

/// Regroupe les parties d'une MultiGeometry en Multi* si elles sont homogènes
fn homogenize(parts: Vec<Geometry>) -> Geometry {
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiPoint(MultiPoint::new(points));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(l) => Some(l),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiLineString(MultiLineString::new(lines));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polys = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Polygon(p) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Geometry::MultiPolygon(MultiPolygon::new(polys));
    }
    Geometry::GeometryCollection(GeometryCollection::new_from(parts))
}

/// Parse `<coordinates>lon,lat[,alt] lon,lat[,alt] …</coordinates>`
fn read_coordinates(node: &Node, index: usize) -> Result<Vec<Coord>, SourceError> {
    let Some(text) = node.child_text("coordinates") else {
        return Ok(Vec::new());
    };
    parse_coordinates(text).map_err(|reason| SourceError::invalid_geometry(index, reason))
}

/// Les tuples sont séparés par des blancs, mais un blanc autour d'une
/// virgule (`1, 2`) reste dans le tuple.
fn parse_coordinates(text: &str) -> Result<Vec<Coord>, String> {
    let mut tuples: Vec<String> = Vec::new();
    for token in text.split_ascii_whitespace() {
        match tuples.last_mut() {
            Some(last) if last.ends_with(',') || token.starts_with(',') => last.push_str(token),
            _ => tuples.push(token.to_string()),
        }
    }

    tuples
        .iter()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let x = parse_number(parts.next(), tuple)?;
            let y = parse_number(parts.next(), tuple)?;
            Ok(Coord { x, y })
        })
        .collect()
}

fn parse_number(raw: Option<&str>, tuple: &str) -> Result<f64, String> {
    let raw = raw.ok_or_else(|| format!("incomplete coordinate tuple '{}'", tuple))?;
    fast_float::parse(raw.trim()).map_err(|_| format!("invalid coordinate '{}'", raw))
}
