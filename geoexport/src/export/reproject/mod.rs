//! Reprojection des couches vers le CRS cible
//!
//! Utilise PROJ quand la feature `reproject` est active, sinon un repli
//! pur Rust limité à WGS84 ↔ Web Mercator.

mod mercator;
#[cfg(feature = "reproject")]
mod proj_transform;

use anyhow::{Context, Result};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geosource::Layer;
use tracing::{debug, warn};

pub use mercator::MercatorDirection;

/// Reprojection entre deux EPSG
pub enum Reprojector {
    /// Pas de reprojection (source == cible)
    Identity,
    /// WGS84 ↔ Web Mercator en pur Rust
    Mercator(MercatorDirection),
    /// Reprojection via PROJ
    #[cfg(feature = "reproject")]
    Proj(proj_transform::ProjTransform),
}

impl Reprojector {
    /// Crée le reprojector le plus simple capable de faire la conversion
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        if source_epsg == target_epsg {
            return Ok(Self::Identity);
        }

        if let Some(direction) = MercatorDirection::between(source_epsg, target_epsg) {
            return Ok(Self::Mercator(direction));
        }

        #[cfg(feature = "reproject")]
        {
            let transform = proj_transform::ProjTransform::new(source_epsg, target_epsg)?;
            return Ok(Self::Proj(transform));
        }

        #[cfg(not(feature = "reproject"))]
        anyhow::bail!(
            "Reprojection from EPSG:{} to EPSG:{} requires the 'reproject' feature \
             (only 4326 <-> 3857 is available without PROJ)",
            source_epsg,
            target_epsg
        )
    }

    /// Retourne une description du reprojector utilisé
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Mercator(_) => "spherical mercator (pure Rust)",
            #[cfg(feature = "reproject")]
            Self::Proj(_) => "PROJ",
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        match self {
            Self::Identity => Ok(geom.clone()),
            Self::Mercator(direction) => {
                transform_with(geom, &mut |coords: &mut [(f64, f64)]| {
                    direction.convert_slice(coords)
                })
            }
            #[cfg(feature = "reproject")]
            Self::Proj(transform) => {
                transform_with(geom, &mut |coords: &mut [(f64, f64)]| {
                    transform.convert_slice(coords)
                })
            }
        }
    }
}

/// Reprojette une couche en place vers `target_epsg`
///
/// Si le CRS natif est inconnu, la couche est simplement étiquetée avec le
/// CRS cible (aucune transformation possible).
pub fn reproject_layer(layer: &mut Layer, target_epsg: u32) -> Result<()> {
    let Some(source_epsg) = layer.epsg else {
        warn!(
            layer = %layer.name,
            target = target_epsg,
            "Unknown source CRS, assuming target CRS without reprojection"
        );
        layer.epsg = Some(target_epsg);
        return Ok(());
    };

    let reprojector = Reprojector::new(source_epsg, target_epsg)?;
    if reprojector.is_identity() {
        return Ok(());
    }

    debug!(
        layer = %layer.name,
        source = source_epsg,
        target = target_epsg,
        method = reprojector.description(),
        "Reprojecting layer"
    );

    for (index, feature) in layer.features.iter_mut().enumerate() {
        if let Some(geom) = &feature.geometry {
            let transformed = reprojector
                .transform_geometry(geom)
                .with_context(|| format!("Failed to reproject feature {}", index))?;
            feature.geometry = Some(transformed);
        }
    }

    layer.epsg = Some(target_epsg);
    Ok(())
}

type SliceConverter<'a> = dyn FnMut(&mut [(f64, f64)]) -> Result<()> + 'a;

/// Applique une conversion par lot à chaque séquence de coordonnées
fn transform_with(geom: &Geometry, convert: &mut SliceConverter<'_>) -> Result<Geometry> {
    let result = match geom {
        Geometry::Point(p) => {
            let mut coords = [(p.x(), p.y())];
            convert(&mut coords[..])?;
            Geometry::Point(Point::new(coords[0].0, coords[0].1))
        }
        Geometry::MultiPoint(mp) => {
            let mut coords: Vec<(f64, f64)> = mp.0.iter().map(|p| (p.x(), p.y())).collect();
            convert(&mut coords[..])?;
            Geometry::MultiPoint(MultiPoint::new(
                coords.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
            ))
        }
        Geometry::LineString(ls) => Geometry::LineString(transform_linestring(ls, convert)?),
        Geometry::MultiLineString(mls) => {
            let lines = mls
                .0
                .iter()
                .map(|ls| transform_linestring(ls, convert))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiLineString(MultiLineString::new(lines))
        }
        Geometry::Polygon(p) => Geometry::Polygon(transform_polygon(p, convert)?),
        Geometry::MultiPolygon(mp) => {
            let polys = mp
                .0
                .iter()
                .map(|p| transform_polygon(p, convert))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polys))
        }
        Geometry::GeometryCollection(gc) => {
            let geoms = gc
                .0
                .iter()
                .map(|g| transform_with(g, convert))
                .collect::<Result<Vec<_>>>()?;
            Geometry::GeometryCollection(GeometryCollection::new_from(geoms))
        }
        Geometry::Line(l) => {
            let ls = LineString::new(vec![l.start, l.end]);
            Geometry::LineString(transform_linestring(&ls, convert)?)
        }
        Geometry::Rect(r) => Geometry::Polygon(transform_polygon(&r.to_polygon(), convert)?),
        Geometry::Triangle(t) => Geometry::Polygon(transform_polygon(&t.to_polygon(), convert)?),
    };
    Ok(result)
}

fn transform_linestring(ls: &LineString, convert: &mut SliceConverter<'_>) -> Result<LineString> {
    let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();
    convert(&mut coords[..])?;
    Ok(LineString::new(
        coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
    ))
}

fn transform_polygon(p: &Polygon, convert: &mut SliceConverter<'_>) -> Result<Polygon> {
    let exterior = transform_linestring(p.exterior(), convert)?;
    let interiors = p
        .interiors()
        .iter()
        .map(|ls| transform_linestring(ls, convert))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}
