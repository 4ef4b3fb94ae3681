use std::io::Write;

use placematch_ingest::{FormatRegistry, IngestError, IngestReport, ParseOptions, ingest};
use placematch_store::{LocationStore, StoreRegistry};

const FEATURES: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","id":1,"geometry":{"type":"Point","coordinates":[-73.60033,45.524115]},
   "properties":{"name":"Open Da Night","address":"124 rue St. Viateur o. Montreal"}},
  {"type":"Feature","id":2,"geometry":{"type":"Point","coordinates":[-79.3832,43.6532]},
   "properties":{"name":"CN Tower","address":"290 Bremner Blvd Toronto"}},
  {"type":"Feature","id":3,"geometry":null,
   "properties":{"name":"Nowhere","address":"?"}}
]}"#;

fn count_in(store: &dyn LocationStore, geohash: &str) -> usize {
    let mut n = 0;
    store
        .get_with_geohash(geohash, &mut |_| {
            n += 1;
            Ok(())
        })
        .unwrap();
    n
}

#[test]
fn ingest_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("places.geojson");
    std::fs::File::create(&input)
        .unwrap()
        .write_all(FEATURES.as_bytes())
        .unwrap();

    let store = StoreRegistry::default()
        .open(&format!("redb://{}", dir.path().join("wof.redb").display()))
        .unwrap();
    let formats = FormatRegistry::default();

    for _ in 0..2 {
        let records = formats
            .open("geojson", &input, ParseOptions::new("wof"))
            .unwrap();
        let report = ingest(store.as_ref(), records).unwrap();
        assert_eq!(report, IngestReport { added: 2, skipped: 1 });
    }

    assert_eq!(count_in(store.as_ref(), "f25dv"), 1);
    assert_eq!(count_in(store.as_ref(), "dpz83"), 1);
    assert_eq!(store.get_by_id("wof:id=1").unwrap().name(), "Open Da Night");
}

#[test]
fn ingest_lines_and_csv() {
    let dir = tempfile::tempdir().unwrap();
    let lines = dir.path().join("places.geojsonl");
    std::fs::write(
        &lines,
        concat!(
            r#"{"type":"Feature","id":"abc","geometry":{"type":"Point","coordinates":[-73.6001,45.5242]},"properties":{"name":"Open Da Night","address":"124 St. Viateur"}}"#,
            "\n",
            "not json\n",
        ),
    )
    .unwrap();
    let rows = dir.path().join("places.csv");
    std::fs::write(
        &rows,
        "id,name,address,longitude,latitude\nx1,Cafe Olympico,124 St Viateur W,-73.6001,45.5242\n",
    )
    .unwrap();

    let store = StoreRegistry::default().open("memory://").unwrap();
    let formats = FormatRegistry::default();

    let mut total = IngestReport::default();
    total.merge(
        ingest(
            store.as_ref(),
            formats
                .open("geojsonl", &lines, ParseOptions::new("ovtr"))
                .unwrap(),
        )
        .unwrap(),
    );
    total.merge(
        ingest(
            store.as_ref(),
            formats.open("csv", &rows, ParseOptions::new("ovtr")).unwrap(),
        )
        .unwrap(),
    );

    assert_eq!(total, IngestReport { added: 2, skipped: 1 });
    assert_eq!(count_in(store.as_ref(), "f25dv"), 2);
    assert!(store.get_by_id("ovtr:id=abc").is_ok());
    assert!(store.get_by_id("ovtr:id=x1").is_ok());
}

#[test]
fn undecodable_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let lines = dir.path().join("places.geojsonl");
    let mut body = Vec::new();
    body.extend_from_slice(br#"{"type":"Feature","id":1,"geometry":{"type":"Point","coordinates":[-73.6001,45.5242]},"properties":{"name":"Open Da Night","address":"124 St. Viateur"}}"#);
    body.extend_from_slice(b"\n{\"name\": \"\xff\"}\n");
    body.extend_from_slice(br#"{"type":"Feature","id":2,"geometry":{"type":"Point","coordinates":[-79.3832,43.6532]},"properties":{"name":"CN Tower","address":"290 Bremner Blvd"}}"#);
    std::fs::write(&lines, body).unwrap();

    let store = StoreRegistry::default().open("memory://").unwrap();
    let records = FormatRegistry::default()
        .open("geojsonl", &lines, ParseOptions::new("ovtr"))
        .unwrap();
    let report = ingest(store.as_ref(), records).unwrap();
    assert_eq!(report, IngestReport { added: 2, skipped: 1 });
}

#[test]
fn unreadable_input_fails_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = StoreRegistry::default().open("memory://").unwrap();
    let formats = FormatRegistry::default();

    // Opening a directory succeeds; every read of it fails.
    for format in ["geojsonl", "csv", "geojson"] {
        let Ok(records) = formats.open(format, dir.path(), ParseOptions::new("ovtr")) else {
            continue;
        };
        let results: Vec<_> = records.take(100).collect();
        assert_eq!(results.len(), 1, "{format}");
        assert!(matches!(results[0], Err(IngestError::Io(_))), "{format}");
    }

    let records = formats
        .open("geojsonl", dir.path(), ParseOptions::new("ovtr"))
        .unwrap();
    assert!(matches!(ingest(store.as_ref(), records), Err(IngestError::Io(_))));
}
