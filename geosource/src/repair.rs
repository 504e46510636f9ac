//! Normalisation des géométries avant export
//!
//! Les sources KML et Shapefile contiennent régulièrement des rings non
//! fermés ou dégénérés. Les formats cibles (WKB, FlatGeobuf) les acceptent
//! mais la plupart des lecteurs les rejettent ensuite.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Polygon,
};
use tracing::warn;

/// Normalise une géométrie
///
/// - ferme les rings ouverts
/// - supprime les rings de moins de 4 points et les lignes de moins de 2 points
/// - retourne `None` si la géométrie devient vide
pub fn normalize_geometry(geom: Geometry) -> Option<Geometry> {
    match geom {
        Geometry::Point(p) => {
            (p.x().is_finite() && p.y().is_finite()).then_some(Geometry::Point(p))
        }
        Geometry::MultiPoint(mp) => {
            let points: Vec<_> = mp
                .0
                .into_iter()
                .filter(|p| p.x().is_finite() && p.y().is_finite())
                .collect();
            (!points.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(points)))
        }
        Geometry::LineString(ls) => normalize_linestring(ls).map(Geometry::LineString),
        Geometry::MultiLineString(mls) => {
            let lines: Vec<_> = mls.0.into_iter().filter_map(normalize_linestring).collect();
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        Geometry::Polygon(p) => normalize_polygon(p).map(Geometry::Polygon),
        Geometry::MultiPolygon(mp) => {
            let polys: Vec<_> = mp.0.into_iter().filter_map(normalize_polygon).collect();
            (!polys.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon::new(polys)))
        }
        Geometry::GeometryCollection(gc) => {
            let geoms: Vec<_> = gc.0.into_iter().filter_map(normalize_geometry).collect();
            (!geoms.is_empty())
                .then(|| Geometry::GeometryCollection(GeometryCollection::new_from(geoms)))
        }
        Geometry::Line(l) => Some(Geometry::LineString(LineString::new(vec![l.start, l.end]))),
        Geometry::Rect(r) => Some(Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => Some(Geometry::Polygon(t.to_polygon())),
    }
}

fn normalize_linestring(ls: LineString) -> Option<LineString> {
    let coords = dedup_coords(ls.0);
    (coords.len() >= 2).then(|| LineString::new(coords))
}

fn normalize_polygon(p: Polygon) -> Option<Polygon> {
    let (exterior, interiors) = p.into_inner();
    let exterior = close_ring(exterior)?;
    let interiors = interiors.into_iter().filter_map(close_ring).collect();
    Some(Polygon::new(exterior, interiors))
}

/// Ferme un ring ouvert; `None` s'il reste moins de 4 points
pub fn close_ring(ring: LineString) -> Option<LineString> {
    let mut coords = dedup_coords(ring.0);

    if coords.len() > 1 && !coords_equal(coords[0], coords[coords.len() - 1]) {
        let first = coords[0];
        let last = coords[coords.len() - 1];
        let gap = ((first.x - last.x).powi(2) + (first.y - last.y).powi(2)).sqrt();
        warn!(points = coords.len(), gap = gap, "Auto-closing unclosed ring");
        coords.push(first);
    }

    (coords.len() >= 4).then(|| LineString::new(coords))
}

/// Supprime les points consécutifs identiques et les coordonnées non finies
fn dedup_coords(coords: Vec<Coord>) -> Vec<Coord> {
    let mut result: Vec<Coord> = Vec::with_capacity(coords.len());
    for c in coords {
        if !(c.x.is_finite() && c.y.is_finite()) {
            continue;
        }
        if result.last().map_or(true, |&last| !coords_equal(last, c)) {
            result.push(c);
        }
    }
    result
}

/// Compare deux coordonnées avec tolérance
fn coords_equal(a: Coord, b: Coord) -> bool {
    const TOLERANCE: f64 = 1e-9;
    (a.x - b.x).abs() < TOLERANCE && (a.y - b.y).abs() < TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn test_close_open_ring() {
        let ring = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let closed = close_ring(ring).unwrap();
        assert_eq!(closed.0.len(), 5);
        assert_eq!(closed.0[0], closed.0[4]);
    }

    #[test]
    fn test_degenerate_ring_dropped() {
        let ring = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
        assert!(close_ring(ring).is_none());
    }

    #[test]
    fn test_polygon_with_bad_hole() {
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![LineString::from(vec![(1.0, 1.0), (2.0, 1.0)])],
        );
        let Some(Geometry::Polygon(p)) = normalize_geometry(Geometry::Polygon(poly)) else {
            panic!("Expected Polygon geometry");
        };
        assert_eq!(p.exterior().0.len(), 5);
        assert!(p.interiors().is_empty());
    }

    #[test]
    fn test_short_linestring_becomes_none() {
        let ls = LineString::from(vec![(1.0, 1.0), (1.0, 1.0)]);
        assert!(normalize_geometry(Geometry::LineString(ls)).is_none());
    }

    #[test]
    fn test_point_nan_dropped() {
        assert!(normalize_geometry(Geometry::Point(Point::new(f64::NAN, 1.0))).is_none());
        assert!(normalize_geometry(Geometry::Point(Point::new(2.0, 1.0))).is_some());
    }

    #[test]
    fn test_empty_collection_becomes_none() {
        let gc = GeometryCollection::<f64>::new_from(vec![]);
        assert!(normalize_geometry(Geometry::GeometryCollection(gc)).is_none());
    }
}
