//! Description PROJJSON des CRS pour les métadonnées GeoParquet
//!
//! GeoParquet attend un objet PROJJSON complet (datum, système de
//! coordonnées, conversion). Sans clé `crs`, un lecteur suppose OGC:CRS84.

use serde_json::Value as JsonValue;
use tracing::debug;

use super::error::WriteError;

/// CRS implicite d'une colonne GeoParquet sans clé `crs` (longitude/latitude WGS84)
const CRS84_EPSG: u32 = 4326;

/// Définitions embarquées, utilisées quand PROJ est absent ou ne connaît pas le code
const BUNDLED: &[(u32, &str)] = &[(3857, include_str!("projjson/epsg3857.json"))];

/// PROJJSON à écrire pour un code EPSG
///
/// `None` pour EPSG:4326: les coordonnées WKB sont en longitude/latitude, ce
/// qui correspond au CRS par défaut de GeoParquet.
pub fn crs_projjson(epsg: u32) -> Result<Option<JsonValue>, WriteError> {
    if epsg == CRS84_EPSG {
        return Ok(None);
    }

    let reason = match from_proj(epsg) {
        Ok(crs) => return Ok(Some(crs)),
        Err(reason) => reason,
    };

    match BUNDLED.iter().find(|(code, _)| *code == epsg) {
        Some((_, text)) => {
            debug!(epsg, reason = %reason, "Using bundled PROJJSON definition");
            Ok(Some(serde_json::from_str(text)?))
        }
        None => Err(WriteError::Crs { epsg, reason }),
    }
}

#[cfg(feature = "reproject")]
fn from_proj(epsg: u32) -> Result<JsonValue, String> {
    let crs = proj::Proj::new(&format!("EPSG:{}", epsg)).map_err(|e| e.to_string())?;
    let text = crs.to_projjson(None, None, None).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

#[cfg(not(feature = "reproject"))]
fn from_proj(_epsg: u32) -> Result<JsonValue, String> {
    Err("built without PROJ support (feature `reproject`)".to_string())
}
