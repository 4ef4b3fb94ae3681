use serde::Serialize;

/// MatchRow is one candidate pair, as written to a [`MatchSink`](crate::MatchSink).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRow {
    pub geohash: String,
    pub source_id: String,
    pub target_id: String,
    /// Content of the source location.
    #[serde(rename = "source")]
    pub source_content: String,
    /// Content of the target location.
    #[serde(rename = "target")]
    pub target_content: String,
    pub similarity: f32,
}

/// CSV column names, in output order.
pub const CSV_HEADER: [&str; 6] = [
    "geohash",
    "source_id",
    "target_id",
    "source",
    "target",
    "similarity",
];
