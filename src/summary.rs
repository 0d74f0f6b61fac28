//! Run summary: width vector and key/value summary text files (§6)
//!
//! Plain-text output, not NetCDF: the width vector is one integer per line
//! of length `G`, and the summary is key/value lines. Both are written
//! straight through `std::fs`/`std::io`, matching the upstream tool's plain
//! `.txt` side files rather than routing through the binary container.

use crate::error::BmatrixError;
use crate::reduce::WidthStats;
use std::io::Write;
use std::path::Path;

/// Everything the summary file reports, per §6's field list.
pub struct RunSummary {
    pub infile: String,
    pub varname: String,
    pub dfact: usize,
    pub thresh: f64,
    pub retained_count: u64,
    pub opref: String,
    /// Max possible ribbon width, reported as `G` (not `G - 1`) by design (§9).
    pub g: usize,
    pub stats: Option<WidthStats>,
    pub wall_clock_seconds: f64,
}

/// Write the width vector, one integer per line, to
/// `{prefix}.width.{thresh}.{dfact}.txt`.
pub fn write_width_vector(prefix: &str, thresh: f64, dfact: usize, width: &[i64]) -> Result<(), BmatrixError> {
    let path = format!("{prefix}.width.{thresh}.{dfact}.txt");
    write_lines(&path, width.iter().map(|w| w.to_string()))
}

/// Write the key/value summary to `{prefix}.summary.{thresh}.{dfact}.txt`.
pub fn write_summary(summary: &RunSummary) -> Result<(), BmatrixError> {
    let path = format!(
        "{}.summary.{}.{}.txt",
        summary.opref, summary.thresh, summary.dfact
    );
    let (max_width, avg_width, avg_width_trimmed, argmax_row) = match summary.stats {
        Some(s) => (s.max_width, s.avg_width, s.avg_width_trimmed, s.argmax_row as i64),
        None => (0, 0.0, 0.0, -1),
    };
    let lines = [
        format!("infile={}", summary.infile),
        format!("varname={}", summary.varname),
        format!("dfact={}", summary.dfact),
        format!("thresh={}", summary.thresh),
        format!("retained_count={}", summary.retained_count),
        format!("opref={}", summary.opref),
        format!("max_possible_width={}", summary.g),
        format!("max_width={max_width}"),
        format!("avg_width={avg_width}"),
        format!("avg_width_trimmed={avg_width_trimmed}"),
        format!("argmax_row={argmax_row}"),
        format!("wall_clock_seconds={}", summary.wall_clock_seconds),
    ];
    write_lines(&path, lines.into_iter())
}

fn write_lines(path: &str, lines: impl Iterator<Item = String>) -> Result<(), BmatrixError> {
    let mut f = std::fs::File::create(Path::new(path))?;
    for line in lines {
        writeln!(f, "{line}")?;
    }
    Ok(())
}
