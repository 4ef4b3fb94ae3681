//! GeoJSON `Feature` parsing.
//!
//! The ID comes from the feature's `id` member, falling back to an `id`
//! property. Names and addresses are looked up under a few common property
//! keys. Point geometries give the centroid directly; polygons use the mean
//! of their outer ring, and any other geometry falls back to the `bbox`.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};

use placematch_location::{Location, Point};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{IngestError, ParseError};
use crate::format::{RecordIter, stop_after_io_error};
use crate::options::ParseOptions;

const NAME_KEYS: &[&str] = &["name", "wof:name", "names:primary"];
const ADDRESS_KEYS: &[&str] = &["address", "addr:full", "addr:freeform", "freeform"];

fn first_string(props: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| props.get(*k))
        .filter_map(scalar)
        .find(|s| !s.trim().is_empty())
}

/// Render a string or number property; anything else is skipped.
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn position(v: &Value) -> Option<Point> {
    let coords = v.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some(Point::new(lon, lat))
}

fn ring_mean(ring: &Value) -> Option<Point> {
    let pts: Vec<Point> = ring.as_array()?.iter().filter_map(position).collect();
    if pts.is_empty() {
        return None;
    }
    let n = pts.len() as f64;
    let lon = pts.iter().map(|p| p.lon).sum::<f64>() / n;
    let lat = pts.iter().map(|p| p.lat).sum::<f64>() / n;
    Some(Point::new(lon, lat))
}

fn bbox_center(bbox: &Value) -> Option<Point> {
    let b = bbox.as_array()?;
    let f = |i: usize| b.get(i).and_then(Value::as_f64);
    Some(Point::new((f(0)? + f(2)?) / 2.0, (f(1)? + f(3)?) / 2.0))
}

fn centroid(feature: &Map<String, Value>) -> Option<Point> {
    let from_geometry = feature.get("geometry").and_then(|g| {
        let coords = g.get("coordinates")?;
        match g.get("type")?.as_str()? {
            "Point" => position(coords),
            "Polygon" => ring_mean(coords.get(0)?),
            "MultiPolygon" => ring_mean(coords.get(0)?.get(0)?),
            _ => None,
        }
    });
    from_geometry.or_else(|| feature.get("bbox").and_then(bbox_center))
}

/// Parse one GeoJSON feature.
pub fn parse_feature(value: &Value, opts: &ParseOptions) -> Result<Location, ParseError> {
    let feature = value
        .as_object()
        .ok_or_else(|| ParseError::Malformed("feature is not an object".into()))?;
    if feature.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(ParseError::Malformed("not a GeoJSON Feature".into()));
    }
    let empty = Map::new();
    let props = feature
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let raw_id = feature
        .get("id")
        .and_then(scalar)
        .or_else(|| props.get("id").and_then(scalar))
        .ok_or_else(|| ParseError::invalid("missing id"))?;
    let id = opts.location_id(&raw_id);

    let name = first_string(props, NAME_KEYS)
        .ok_or_else(|| ParseError::invalid(format!("{id}: missing name")))?;
    let address = first_string(props, ADDRESS_KEYS).unwrap_or_default();
    if opts.require_address && address.is_empty() {
        return Err(ParseError::invalid(format!("{id}: missing address")));
    }
    let point =
        centroid(feature).ok_or_else(|| ParseError::invalid(format!("{id}: missing geometry")))?;

    let mut loc = Location::new(id, name, point)?.with_address(address);
    for (k, v) in props {
        if k == "id" || NAME_KEYS.contains(&k.as_str()) || ADDRESS_KEYS.contains(&k.as_str()) {
            continue;
        }
        if let Some(s) = scalar(v) {
            loc = loc.with_custom(k.as_str(), s);
        }
    }
    Ok(loc)
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Value>,
}

/// Read a `FeatureCollection` document.
///
/// The whole document must parse; a syntax error fails the read. Individual
/// features that do not parse are yielded as errors.
pub fn read_collection(reader: Box<dyn Read + Send>, opts: ParseOptions) -> RecordIter {
    let collection: FeatureCollection = match serde_json::from_reader(BufReader::new(reader)) {
        Ok(c) => c,
        Err(e) if e.is_io() => {
            return Box::new(std::iter::once(Err(IngestError::Io(io::Error::from(e)))));
        }
        Err(e) => {
            let err = ParseError::Malformed(format!("feature collection: {e}"));
            return Box::new(std::iter::once(Err(IngestError::from(err))));
        }
    };
    Box::new(
        collection
            .features
            .into_iter()
            .map(move |f| parse_feature(&f, &opts).map_err(IngestError::from)),
    )
}

/// Read line-delimited features, one per non-blank line.
///
/// A line that is not valid UTF-8 is reported as malformed and skipped.
/// Any other read error ends the stream.
pub fn read_lines(reader: Box<dyn Read + Send>, opts: ParseOptions) -> RecordIter {
    stop_after_io_error(
        BufReader::new(reader)
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(move |(n, line)| -> Result<Location, IngestError> {
                let line = match line {
                    Ok(line) => line,
                    Err(e) if e.kind() == ErrorKind::InvalidData => {
                        return Err(ParseError::Malformed(format!("line {}: {e}", n + 1)).into());
                    }
                    Err(e) => return Err(e.into()),
                };
                let value: Value = serde_json::from_str(&line)
                    .map_err(|e| ParseError::Malformed(format!("line {}: {e}", n + 1)))?;
                Ok(parse_feature(&value, &opts)?)
            }),
    )
}
