//! CSV row parsing.
//!
//! The header row names the columns. `id`, `name` and a coordinate pair
//! (`longitude`/`latitude` or `lon`/`lat`) are required; `address` is
//! optional. Every other non-empty column becomes custom metadata.

use std::collections::BTreeMap;
use std::io::Read;

use placematch_location::{Location, Point};

use crate::error::{IngestError, ParseError};
use crate::format::{RecordIter, stop_after_io_error};
use crate::options::ParseOptions;

const LON_KEYS: &[&str] = &["longitude", "lon", "lng"];
const LAT_KEYS: &[&str] = &["latitude", "lat"];

fn column<'a>(row: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn coordinate(row: &BTreeMap<String, String>, keys: &[&str], id: &str) -> Result<f64, ParseError> {
    let raw = column(row, keys)
        .ok_or_else(|| ParseError::invalid(format!("{id}: missing geometry")))?;
    raw.parse()
        .map_err(|_| ParseError::invalid(format!("{id}: bad coordinate {raw:?}")))
}

/// Parse one CSV row, keyed by lowercased header name.
pub fn parse_row(row: &BTreeMap<String, String>, opts: &ParseOptions) -> Result<Location, ParseError> {
    let raw_id = column(row, &["id"]).ok_or_else(|| ParseError::invalid("missing id"))?;
    let id = opts.location_id(raw_id);

    let name = column(row, &["name"])
        .ok_or_else(|| ParseError::invalid(format!("{id}: missing name")))?;
    let address = column(row, &["address"]).unwrap_or_default();
    if opts.require_address && address.is_empty() {
        return Err(ParseError::invalid(format!("{id}: missing address")));
    }
    let point = Point::new(
        coordinate(row, LON_KEYS, &id)?,
        coordinate(row, LAT_KEYS, &id)?,
    );

    let mut loc = Location::new(id, name, point)?.with_address(address);
    for (k, v) in row {
        let known = ["id", "name", "address"].contains(&k.as_str())
            || LON_KEYS.contains(&k.as_str())
            || LAT_KEYS.contains(&k.as_str());
        if !known && !v.is_empty() {
            loc = loc.with_custom(k.as_str(), v.as_str());
        }
    }
    Ok(loc)
}

/// Read a CSV file with a header row.
pub fn read_rows(reader: Box<dyn Read + Send>, opts: ParseOptions) -> RecordIter {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(|s| s.to_lowercase()).collect(),
        Err(e) => return Box::new(std::iter::once(Err(csv_error(e, "csv header: ")))),
    };

    stop_after_io_error(
        rdr.into_records()
            .map(move |record| -> Result<Location, IngestError> {
                let record = record.map_err(|e| csv_error(e, ""))?;
                let row: BTreeMap<String, String> = headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect();
                Ok(parse_row(&row, &opts)?)
            }),
    )
}

/// Read failures surface as I/O errors; anything else is a bad row.
fn csv_error(e: csv::Error, context: &str) -> IngestError {
    if !e.is_io_error() {
        return ParseError::Malformed(format!("{context}{e}")).into();
    }
    match e.into_kind() {
        csv::ErrorKind::Io(io) => IngestError::Io(io),
        kind => ParseError::Malformed(format!("{context}{kind:?}")).into(),
    }
}
