//! GeoJSON parsing for query regions and stored shapes.

use crate::error::{QuadCacheError, Result};
use geojson::GeoJson;

/// Parses a GeoJSON geometry (or a feature carrying one) into a `geo` geometry.
///
/// # Examples
///
/// ```
/// use quadcache::geojson::geometry_from_geojson;
///
/// let point = geometry_from_geojson(r#"{"type": "Point", "coordinates": [-74.0, 40.7]}"#).unwrap();
/// assert!(matches!(point, geo::Geometry::Point(_)));
///
/// assert!(geometry_from_geojson(r#"{"type": "FeatureCollection", "features": []}"#).is_err());
/// ```
pub fn geometry_from_geojson(geojson: &str) -> Result<geo::Geometry<f64>> {
    let parsed: GeoJson = geojson
        .parse()
        .map_err(|e| QuadCacheError::InvalidInput(format!("Failed to parse GeoJSON: {}", e)))?;

    let geometry = match parsed {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature.geometry.ok_or_else(|| {
            QuadCacheError::InvalidInput("GeoJSON feature has no geometry".to_string())
        })?,
        GeoJson::FeatureCollection(_) => {
            return Err(QuadCacheError::InvalidInput(
                "Expected a GeoJSON geometry or feature, got a feature collection".to_string(),
            ));
        }
    };

    geo::Geometry::<f64>::try_from(geometry).map_err(|e| {
        QuadCacheError::InvalidGeometry(format!("Unsupported GeoJSON geometry: {}", e))
    })
}

/// Serializes a `geo` geometry as a GeoJSON geometry string.
pub fn geometry_to_geojson(geometry: &geo::Geometry<f64>) -> Result<String> {
    let value = geojson::Value::from(geometry);
    let geometry = geojson::Geometry::new(value);

    serde_json::to_string(&geometry).map_err(QuadCacheError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polygon() {
        let json = r#"{
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
        }"#;
        let geometry = geometry_from_geojson(json).unwrap();
        assert!(matches!(geometry, geo::Geometry::Polygon(_)));
    }

    #[test]
    fn test_parse_feature() {
        let json = r#"{
            "type": "Feature",
            "properties": {"name": "depot"},
            "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}
        }"#;
        let geometry = geometry_from_geojson(json).unwrap();
        assert_eq!(geometry, geo::Geometry::Point(geo::Point::new(2.35, 48.85)));
    }

    #[test]
    fn test_feature_without_geometry() {
        let json = r#"{"type": "Feature", "properties": {}, "geometry": null}"#;
        assert!(matches!(
            geometry_from_geojson(json),
            Err(QuadCacheError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_roundtrip_linestring() {
        let line: geo::Geometry<f64> =
            geo::LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.5)]).into();
        let json = geometry_to_geojson(&line).unwrap();
        assert_eq!(geometry_from_geojson(&json).unwrap(), line);
    }
}
