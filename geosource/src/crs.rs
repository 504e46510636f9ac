//! Détection du système de coordonnées (fichiers .prj, codes EPSG)

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Noms WKT courants sans bloc AUTHORITY
const KNOWN_CRS: &[(&str, u32)] = &[
    ("GCS_WGS_1984", 4326),
    ("WGS 84", 4326),
    ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
    ("WGS 84 / Pseudo-Mercator", 3857),
    ("RGF93_Lambert_93", 2154),
    ("RGF93 / Lambert-93", 2154),
    ("GCS_ETRS_1989", 4258),
    ("GCS_North_American_1983", 4269),
    ("ETRS_1989_UTM_Zone_32N", 25832),
    ("ETRS_1989_UTM_Zone_33N", 25833),
];

fn authority_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:AUTHORITY|ID)\s*\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#)
            .expect("static regex")
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(?:PROJCS|GEOGCS|PROJCRS|GEOGCRS)\s*\[\s*"([^"]+)""#)
            .expect("static regex")
    })
}

/// Extrait le code EPSG d'un WKT de projection
///
/// Le dernier bloc AUTHORITY du WKT est celui du CRS lui-même (les
/// précédents décrivent le datum, l'ellipsoïde, les unités…).
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    if let Some(caps) = authority_regex().captures_iter(wkt).last() {
        return caps[1].parse().ok();
    }

    let name = name_regex().captures(wkt)?.get(1)?.as_str();
    KNOWN_CRS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|&(_, epsg)| epsg)
}

/// Lit le .prj associé à un .shp (même nom, extension .prj)
///
/// Retourne `None` si le fichier est absent ou si le CRS n'est pas reconnu.
pub fn epsg_from_prj(shp_path: &Path) -> Option<u32> {
    let prj_path = ["prj", "PRJ"]
        .iter()
        .map(|ext| shp_path.with_extension(ext))
        .find(|p| p.exists())?;

    let wkt = std::fs::read_to_string(&prj_path).ok()?;
    let epsg = epsg_from_wkt(&wkt);
    if epsg.is_none() {
        tracing::debug!(prj = %prj_path.display(), "Unrecognized CRS in .prj");
    }
    epsg
}

/// Parse un identifiant de CRS saisi par l'utilisateur (`4326` ou `EPSG:4326`)
pub fn parse_epsg(input: &str) -> Result<u32, String> {
    let trimmed = input.trim();
    let code = trimmed
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
        .map(|_| &trimmed[5..])
        .unwrap_or(trimmed);

    match code.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(format!(
            "Invalid CRS: {}. Use an EPSG code like 4326 or EPSG:4326",
            input
        )),
        Ok(epsg) => Ok(epsg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsg_from_wkt_authority() {
        let wkt = r#"PROJCS["RGF93 / Lambert-93",GEOGCS["RGF93",DATUM["Reseau_Geodesique_Francais_1993",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6171"]],AUTHORITY["EPSG","4171"]],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","2154"]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(2154));
    }

    #[test]
    fn test_epsg_from_wkt_esri_name() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(4326));
    }

    #[test]
    fn test_epsg_from_wkt_unknown() {
        assert_eq!(epsg_from_wkt(r#"PROJCS["Custom_Local",UNIT["m",1]]"#), None);
        assert_eq!(epsg_from_wkt(""), None);
    }

    #[test]
    fn test_epsg_from_prj_missing() {
        assert_eq!(epsg_from_prj(Path::new("/nonexistent/roads.shp")), None);
    }

    #[test]
    fn test_parse_epsg() {
        assert_eq!(parse_epsg("4326"), Ok(4326));
        assert_eq!(parse_epsg("EPSG:2154"), Ok(2154));
        assert_eq!(parse_epsg("epsg:3857"), Ok(3857));
        assert_eq!(parse_epsg(" 4326 "), Ok(4326));
        assert!(parse_epsg("").is_err());
        assert!(parse_epsg("EPSG:").is_err());
        assert!(parse_epsg("WGS84").is_err());
        assert!(parse_epsg("0").is_err());
    }
}
