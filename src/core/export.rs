// VoteTally - core/export.rs
//
// CSV and JSON export of scope aggregates.
// Core layer: writes to any Write trait object.

use crate::core::aggregation::{LeaderboardRow, ScopeAggregation};
use crate::core::model::UserId;
use crate::util::error::ExportError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// Output format for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Which aggregate to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Leaderboard,
    Series,
    Histogram { author: Option<UserId> },
}

#[derive(Serialize)]
struct SeriesRow {
    author: u64,
    sequence: u64,
    score: i64,
}

#[derive(Serialize)]
struct HistogramRow {
    score: i64,
    count: u64,
}

fn series_rows(aggregation: &ScopeAggregation) -> Vec<SeriesRow> {
    let mut rows: Vec<SeriesRow> = aggregation
        .authors()
        .flat_map(|author| {
            aggregation.series(*author).iter().map(|p| SeriesRow {
                author: author.0,
                sequence: p.sequence,
                score: p.score,
            })
        })
        .collect();
    rows.sort_by_key(|r| r.sequence);
    rows
}

fn histogram_rows(histogram: BTreeMap<i64, u64>) -> Vec<HistogramRow> {
    histogram
        .into_iter()
        .map(|(score, count)| HistogramRow { score, count })
        .collect()
}

/// Export one aggregate of `aggregation`. Returns the number of rows written.
pub fn export<W: Write>(
    aggregation: &ScopeAggregation,
    kind: ExportKind,
    format: ExportFormat,
    writer: W,
) -> Result<usize, ExportError> {
    match kind {
        ExportKind::Leaderboard => {
            let rows: Vec<LeaderboardRow> = aggregation.leaderboard().rows;
            write_rows(&rows, format, writer)
        }
        ExportKind::Series => write_rows(&series_rows(aggregation), format, writer),
        ExportKind::Histogram { author } => {
            write_rows(&histogram_rows(aggregation.histogram(author)), format, writer)
        }
    }
}

fn write_rows<T: Serialize, W: Write>(
    rows: &[T],
    format: ExportFormat,
    writer: W,
) -> Result<usize, ExportError> {
    match format {
        ExportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for row in rows {
                csv_writer
                    .serialize(row)
                    .map_err(|e| ExportError::Csv { source: e })?;
            }
            csv_writer
                .flush()
                .map_err(|e| ExportError::Io { source: e })?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(writer, rows)
                .map_err(|e| ExportError::Json { source: e })?;
        }
    }
    Ok(rows.len())
}
