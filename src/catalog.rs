//! Earthquake catalog loading and spatial binning.
//!
//! Catalogs are plain text, one event per line, whitespace-separated fields
//! in fixed column order: `longitude latitude year month day magnitude
//! depth`. The column layout is a compatibility contract with the upstream
//! catalog producers and is preserved exactly. Files are streamed line by
//! line; nothing but the resulting count vector is held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::Region;

/// A single parsed seismic event.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub longitude: f64,
    pub latitude: f64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub magnitude: f64,
    pub depth: f64,
}

/// Observed event counts, one per grid cell, row-major cell order.
/// Built once per time-slice query and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CountVector {
    counts: Vec<u64>,
}

impl CountVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            counts: vec![0; len],
        }
    }

    /// Construct from raw per-cell counts (mainly for tests and replays).
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn increment(&mut self, index: usize) {
        self.counts[index] += 1;
    }
}

/// Filter parameters for one time-slice query.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub year: i32,
    pub min_magnitude: f64,
    pub max_depth: f64,
}

/// Result of binning one time slice of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogSlice {
    /// Per-cell observed counts for the requested year.
    pub counts: CountVector,
    /// Events whose year matched, before any other filter.
    pub total_in_year: u64,
    /// Events that passed every filter and were binned.
    pub total_in_region: u64,
    /// Malformed lines skipped during the load.
    pub skipped_lines: u64,
}

/// Parse one catalog line. At least seven fields are required; trailing
/// fields are ignored for forward compatibility with annotated catalogs.
pub fn parse_line(line: &str, line_no: u64) -> Result<Observation> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(Error::Parse {
            line: line_no,
            reason: format!("expected 7 fields, found {}", fields.len()),
        });
    }

    fn num<T: std::str::FromStr>(field: &str, name: &str, line_no: u64) -> Result<T> {
        field.parse().map_err(|_| Error::Parse {
            line: line_no,
            reason: format!("non-numeric {name}: {field:?}"),
        })
    }

    Ok(Observation {
        longitude: num(fields[0], "longitude", line_no)?,
        latitude: num(fields[1], "latitude", line_no)?,
        year: num(fields[2], "year", line_no)?,
        month: num(fields[3], "month", line_no)?,
        day: num(fields[4], "day", line_no)?,
        magnitude: num(fields[5], "magnitude", line_no)?,
        depth: num(fields[6], "depth", line_no)?,
    })
}

fn passes_filters(obs: &Observation, region: &Region, query: &CatalogQuery) -> bool {
    region.contains(obs.longitude, obs.latitude)
        && obs.depth <= query.max_depth
        && obs.magnitude >= query.min_magnitude
}

/// Stream the catalog and bin the events of one year into per-cell counts.
///
/// Malformed lines are logged and skipped; the load never aborts on them.
pub fn load_slice(
    path: impl AsRef<Path>,
    region: &Region,
    query: &CatalogQuery,
) -> Result<CatalogSlice> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut counts = CountVector::zeros(region.cell_count());
    let mut total_in_year = 0u64;
    let mut skipped_lines = 0u64;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = i as u64 + 1;
        let obs = match parse_line(&line, line_no) {
            Ok(obs) => obs,
            Err(e) => {
                log::warn!("skipping catalog line: {e}");
                skipped_lines += 1;
                continue;
            }
        };
        if obs.year != query.year {
            continue;
        }
        total_in_year += 1;
        if passes_filters(&obs, region, query) {
            let index = region.cell_index(obs.longitude, obs.latitude)?;
            counts.increment(index);
        }
    }

    let total_in_region = counts.total();
    Ok(CatalogSlice {
        counts,
        total_in_year,
        total_in_region,
        skipped_lines,
    })
}

/// Mean filtered event count per grid cell over the training window
/// `[start_year, start_year + window_years)`, the Poisson rate that keys
/// the genome quantile transform.
pub fn mean_rate(
    path: impl AsRef<Path>,
    region: &Region,
    query: &CatalogQuery,
    start_year: i32,
    window_years: u32,
) -> Result<f64> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let end_year = start_year + window_years as i32;
    let mut window_events = 0u64;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let obs = match parse_line(&line, i as u64 + 1) {
            Ok(obs) => obs,
            Err(e) => {
                log::warn!("skipping catalog line: {e}");
                continue;
            }
        };
        if obs.year >= start_year && obs.year < end_year && passes_filters(&obs, region, query) {
            window_events += 1;
        }
    }

    Ok(window_events as f64 / region.cell_count() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn region_2x2() -> Region {
        Region::new(0.0, 2.0, 0.0, 2.0, 2, 2).unwrap()
    }

    fn write_catalog(lines: &[&str]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn parses_fixed_column_order() {
        let obs = parse_line("139.52 35.71 2005 3 14 4.2 38.5", 1).unwrap();
        assert_eq!(obs.longitude, 139.52);
        assert_eq!(obs.latitude, 35.71);
        assert_eq!(obs.year, 2005);
        assert_eq!(obs.month, 3);
        assert_eq!(obs.day, 14);
        assert_eq!(obs.magnitude, 4.2);
        assert_eq!(obs.depth, 38.5);
    }

    #[test]
    fn rejects_short_and_non_numeric_lines() {
        assert!(matches!(
            parse_line("139.52 35.71 2005", 3),
            Err(Error::Parse { line: 3, .. })
        ));
        assert!(parse_line("x 35.71 2005 3 14 4.2 38.5", 1).is_err());
    }

    #[test]
    fn bins_filtered_events_per_cell() {
        // Three events in cell 0, one in cell 3, plus records that must be
        // filtered out by year, magnitude, depth, and bounds.
        let f = write_catalog(&[
            "0.5 0.5 2005 1 1 3.0 10.0",
            "0.4 0.6 2005 2 2 3.5 20.0",
            "0.6 0.4 2005 3 3 4.0 30.0",
            "1.5 1.5 2005 4 4 3.0 10.0",
            "0.5 0.5 2004 1 1 3.0 10.0", // wrong year
            "0.5 0.5 2005 1 1 1.0 10.0", // below magnitude threshold
            "0.5 0.5 2005 1 1 3.0 500.0", // too deep
            "5.0 0.5 2005 1 1 3.0 10.0", // outside region
        ]);
        let query = CatalogQuery {
            year: 2005,
            min_magnitude: 2.5,
            max_depth: 100.0,
        };
        let slice = load_slice(f.path(), &region_2x2(), &query).unwrap();
        assert_eq!(slice.counts.as_slice(), &[3, 0, 0, 1]);
        assert_eq!(slice.total_in_year, 7);
        assert_eq!(slice.total_in_region, 4);
        assert_eq!(slice.skipped_lines, 0);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let f = write_catalog(&[
            "0.5 0.5 2005 1 1 3.0 10.0",
            "garbage line",
            "0.5 abc 2005 1 1 3.0 10.0",
            "1.5 1.5 2005 1 1 3.0 10.0",
        ]);
        let query = CatalogQuery {
            year: 2005,
            min_magnitude: 2.5,
            max_depth: 100.0,
        };
        let slice = load_slice(f.path(), &region_2x2(), &query).unwrap();
        assert_eq!(slice.skipped_lines, 2);
        assert_eq!(slice.total_in_region, 2);
    }

    #[test]
    fn mean_rate_spans_the_training_window() {
        let f = write_catalog(&[
            "0.5 0.5 2000 1 1 3.0 10.0",
            "0.5 0.5 2001 1 1 3.0 10.0",
            "0.5 0.5 2004 1 1 3.0 10.0",
            "0.5 0.5 2005 1 1 3.0 10.0", // outside the window
        ]);
        let query = CatalogQuery {
            year: 2005,
            min_magnitude: 2.5,
            max_depth: 100.0,
        };
        let rate = mean_rate(f.path(), &region_2x2(), &query, 2000, 5).unwrap();
        // 3 window events over 4 cells.
        assert!((rate - 0.75).abs() < 1e-12);
    }
}
