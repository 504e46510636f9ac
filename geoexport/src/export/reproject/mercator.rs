//! Projection Web Mercator (EPSG:3857) en pur Rust
//!
//! Aussi connu sous le nom de Pseudo-Mercator ou Spherical Mercator.
//! Seule conversion disponible sans PROJ.

use anyhow::{bail, Result};

/// Rayon équatorial WGS84 utilisé par la sphère Web Mercator
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude maximale représentable en Web Mercator
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Sens de conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MercatorDirection {
    /// EPSG:4326 → EPSG:3857
    ToWebMercator,
    /// EPSG:3857 → EPSG:4326
    ToGeographic,
}

impl MercatorDirection {
    /// Sens de conversion entre deux EPSG, `None` si la paire n'est pas supportée
    pub fn between(source_epsg: u32, target_epsg: u32) -> Option<Self> {
        match (source_epsg, target_epsg) {
            (4326, 3857) => Some(Self::ToWebMercator),
            (3857, 4326) => Some(Self::ToGeographic),
            _ => None,
        }
    }

    /// Convertit un lot de coordonnées en place
    pub fn convert_slice(&self, coords: &mut [(f64, f64)]) -> Result<()> {
        for coord in coords.iter_mut() {
            *coord = match self {
                Self::ToWebMercator => geographic_to_web_mercator(coord.0, coord.1)?,
                Self::ToGeographic => web_mercator_to_geographic(coord.0, coord.1),
            };
        }
        Ok(())
    }
}

/// Convertit longitude/latitude (degrés) vers Web Mercator (mètres)
pub fn geographic_to_web_mercator(lon: f64, lat: f64) -> Result<(f64, f64)> {
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        bail!("Coordinate ({}, {}) is outside the EPSG:4326 domain", lon, lat);
    }

    // Limiter la latitude pour éviter l'infini aux pôles
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();

    Ok((x, y))
}

/// Convertit Web Mercator (mètres) vers longitude/latitude (degrés)
pub fn web_mercator_to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}
