//! Reprojection avec PROJ
//!
//! Ce module est disponible uniquement avec le feature `reproject`.

use anyhow::{Context, Result};
use proj::Proj;

/// Transformation PROJ entre deux EPSG
pub struct ProjTransform {
    proj: Proj,
}

impl ProjTransform {
    /// Crée une transformation (ordre des axes normalisé en x=lon, y=lat)
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let source = format!("EPSG:{}", source_epsg);
        let target = format!("EPSG:{}", target_epsg);

        let proj = Proj::new_known_crs(&source, &target, None).context(format!(
            "Failed to create projection from {} to {}",
            source, target
        ))?;

        Ok(Self { proj })
    }

    /// Transformation batch - beaucoup plus rapide que point par point
    pub fn convert_slice(&self, coords: &mut [(f64, f64)]) -> Result<()> {
        self.proj
            .convert_array(coords)
            .context("Batch coordinate transformation failed")?;

        if let Some(bad) = coords.iter().find(|(x, y)| !x.is_finite() || !y.is_finite()) {
            anyhow::bail!("Coordinate transformation produced {:?}", bad);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambert93_to_wgs84() {
        // Paris (environ): Lambert-93 X=652381, Y=6862047 → lon=2.35, lat=48.85
        let transform = ProjTransform::new(2154, 4326).unwrap();
        let mut coords = [(652381.0, 6862047.0)];
        transform.convert_slice(&mut coords).unwrap();

        let (lon, lat) = coords[0];
        assert!(lon > 2.0 && lon < 3.0, "Longitude should be around 2.35, got {}", lon);
        assert!(lat > 48.0 && lat < 49.0, "Latitude should be around 48.85, got {}", lat);
    }

    #[test]
    fn test_wgs84_to_utm() {
        let transform = ProjTransform::new(4326, 32631).unwrap();
        let mut coords = [(3.0, 0.0)];
        transform.convert_slice(&mut coords).unwrap();

        assert!((coords[0].0 - 500000.0).abs() < 1.0, "x={}", coords[0].0);
        assert!(coords[0].1.abs() < 1.0, "y={}", coords[0].1);
    }

    #[test]
    fn test_invalid_epsg() {
        assert!(ProjTransform::new(99999, 4326).is_err());
    }
}
