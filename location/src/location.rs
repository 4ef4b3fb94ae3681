use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LocationError;
use crate::geohash::{self, GEOHASH_PRECISION};

/// Metadata key that always carries the derived geohash.
pub const RESERVED_GEOHASH_KEY: &str = "geohash";

/// A (longitude, latitude) pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    fn validate(&self) -> Result<(), LocationError> {
        if !self.lon.is_finite() || !self.lat.is_finite() {
            return Err(LocationError::invalid("centroid is not finite"));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(LocationError::invalid(format!(
                "longitude {} out of range",
                self.lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(LocationError::invalid(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        Ok(())
    }
}

/// Location is a deduplication-ready point of interest.
///
/// The ID carries a source namespace prefix (e.g. `"wof:id=123"`) so that
/// provenance survives joins across datasets. All fields are fixed at
/// construction; the geohash is derived from the centroid on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationRecord", into = "LocationRecord")]
pub struct Location {
    id: String,
    name: String,
    address: String,
    centroid: Point,
    custom: BTreeMap<String, String>,
}

impl Location {
    /// Create a location, rejecting records without identity, name or a
    /// usable centroid.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        centroid: Point,
    ) -> Result<Self, LocationError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(LocationError::invalid("missing id"));
        }
        if name.trim().is_empty() {
            return Err(LocationError::invalid(format!("{id}: missing name")));
        }
        centroid
            .validate()
            .map_err(|e| LocationError::invalid(format!("{id}: {e}")))?;
        Ok(Self {
            id,
            name,
            address: String::new(),
            centroid,
            custom: BTreeMap::new(),
        })
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Attach a metadata value. The reserved `geohash` key is ignored.
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != RESERVED_GEOHASH_KEY {
            self.custom.insert(key, value.into());
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn custom(&self) -> &BTreeMap<String, String> {
        &self.custom
    }

    /// The shard key: a fixed-precision geohash of the centroid.
    pub fn geohash(&self) -> String {
        geohash::encode(self.centroid.lon, self.centroid.lat, GEOHASH_PRECISION)
    }

    /// Custom metadata plus the derived geohash.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut md = self.custom.clone();
        md.insert(RESERVED_GEOHASH_KEY.to_string(), self.geohash());
        md
    }

    /// The text fed to similarity backends: `"{name}, {address}"`.
    pub fn content(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}, {}", self.name, self.address)
        }
    }
}

/// Serialized shape of a location. Deserialization goes through
/// [`Location::new`] so stored records are validated on read.
#[derive(Serialize, Deserialize)]
struct LocationRecord {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    address: String,
    centroid: Point,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    custom: BTreeMap<String, String>,
}

impl TryFrom<LocationRecord> for Location {
    type Error = LocationError;

    fn try_from(r: LocationRecord) -> Result<Self, Self::Error> {
        let mut loc = Location::new(r.id, r.name, r.centroid)?.with_address(r.address);
        for (k, v) in r.custom {
            loc = loc.with_custom(k, v);
        }
        Ok(loc)
    }
}

impl From<Location> for LocationRecord {
    fn from(l: Location) -> Self {
        Self {
            id: l.id,
            name: l.name,
            address: l.address,
            centroid: l.centroid,
            custom: l.custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_da_night() -> Location {
        Location::new(
            "wof:id=1",
            "Open Da Night",
            Point::new(-73.60033, 45.524115),
        )
        .unwrap()
        .with_address("124 rue St. Viateur o. Montreal")
    }

    #[test]
    fn test_geohash_is_deterministic() {
        let a = open_da_night();
        let b = open_da_night();
        assert_eq!(a.geohash(), b.geohash());
        assert_eq!(a.geohash(), "f25dv");
        assert_eq!(a.geohash().len(), GEOHASH_PRECISION);
    }

    #[test]
    fn test_content() {
        let l = open_da_night();
        assert_eq!(l.content(), "Open Da Night, 124 rue St. Viateur o. Montreal");

        let bare = Location::new("x:1", "Bare", Point::new(0.0, 0.0)).unwrap();
        assert_eq!(bare.content(), "Bare");
    }

    #[test]
    fn test_metadata_overrides_geohash() {
        let l = open_da_night()
            .with_custom("geohash", "zzzzz")
            .with_custom("source", "wof");
        let md = l.metadata();
        assert_eq!(md.get("geohash").map(String::as_str), Some("f25dv"));
        assert_eq!(md.get("source").map(String::as_str), Some("wof"));
        assert!(!l.custom().contains_key("geohash"));
    }

    #[test]
    fn test_invalid_records() {
        assert!(matches!(
            Location::new("", "name", Point::new(0.0, 0.0)),
            Err(LocationError::Invalid(_))
        ));
        assert!(Location::new("a:1", " ", Point::new(0.0, 0.0)).is_err());
        assert!(Location::new("a:1", "n", Point::new(181.0, 0.0)).is_err());
        assert!(Location::new("a:1", "n", Point::new(0.0, -90.5)).is_err());
        assert!(Location::new("a:1", "n", Point::new(f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let l = open_da_night();
        let json = serde_json::to_string(&l).unwrap();
        assert!(!json.contains("geohash"));
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, l);

        let bad = r#"{"id":"a:1","name":"n","centroid":{"lon":500.0,"lat":0.0}}"#;
        assert!(serde_json::from_str::<Location>(bad).is_err());
    }
}
