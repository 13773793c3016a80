//! Epoch rows and the parsed, quality-masked lightcurve of one object.

use std::sync::OnceLock;
use std::io::BufRead;
use std::path::Path;

use crate::error::{Error, Result};
use crate::photometry::{ZERO_POINT, magnitudes_to_fluxes};

/// Flag value at or above which an epoch is dropped by default.
pub const DEFAULT_QUALITY_THRESHOLD: u32 = 32768;

/// One row of a raw block: `hmjd mag magerr clrcoeff catflags`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRow {
    /// Heliocentric MJD, days.
    pub time: f64,
    pub mag: f64,
    pub mag_err: f64,
    pub color_term: f64,
    pub quality_flags: u32,
}

impl EpochRow {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut it = line.split_whitespace();
        let mut next = |name: &str| {
            it.next()
                .ok_or_else(|| format!("epoch row is missing {name}"))
        };
        let time = parse_float(next("hmjd")?, "hmjd")?;
        let mag = parse_float(next("mag")?, "mag")?;
        let mag_err = parse_float(next("magerr")?, "magerr")?;
        let color_term = parse_float(next("clrcoeff")?, "clrcoeff")?;
        let raw_flags = next("catflags")?;
        let quality_flags = raw_flags
            .parse::<u32>()
            .map_err(|_| format!("cannot parse catflags from {raw_flags:?}"))?;
        Ok(EpochRow {
            time,
            mag,
            mag_err,
            color_term,
            quality_flags,
        })
    }

    fn is_finite(&self) -> bool {
        self.time.is_finite() && self.mag.is_finite() && self.mag_err.is_finite()
    }
}

fn parse_float(raw: &str, name: &str) -> std::result::Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("cannot parse {name} from {raw:?}"))
}

/// Per-read parameters. Two reads with different options produce
/// independent lightcurves and statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadOptions {
    /// Drop epochs with `quality_flags >= threshold`. `None` keeps all.
    pub quality_threshold: Option<u32>,
    /// Colour of the source; each magnitude is corrected by
    /// `color_term · color`.
    pub color: f64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            quality_threshold: Some(DEFAULT_QUALITY_THRESHOLD),
            color: 0.0,
        }
    }
}

impl ReadOptions {
    pub fn keeps(&self, flags: u32) -> bool {
        self.quality_threshold.is_none_or(|t| flags < t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mag_median: f64,
    pub mag_std: f64,
    pub flux_median: f64,
    pub flux_std: f64,
}

/// Parsed epochs of one object, sorted by time.
#[derive(Debug, Clone)]
pub struct Lightcurve {
    times: Vec<f64>,
    mags: Vec<f64>,
    mag_errs: Vec<f64>,
    color_terms: Vec<f64>,
    quality_flags: Vec<u32>,
    fluxes: Vec<f64>,
    flux_errs: Vec<f64>,
    summary: OnceLock<Summary>,
}

impl Lightcurve {
    /// Apply colour correction, quality mask, finiteness filter and a stable
    /// time sort, in that order.
    pub fn from_rows(rows: impl IntoIterator<Item = EpochRow>, options: &ReadOptions) -> Self {
        let mut kept: Vec<EpochRow> = rows
            .into_iter()
            .map(|mut row| {
                row.mag += row.color_term * options.color;
                row
            })
            .filter(|row| options.keeps(row.quality_flags))
            .filter(EpochRow::is_finite)
            .collect();
        kept.sort_by(|a, b| a.time.total_cmp(&b.time));

        let times = kept.iter().map(|r| r.time).collect();
        let mags: Vec<f64> = kept.iter().map(|r| r.mag).collect();
        let mag_errs: Vec<f64> = kept.iter().map(|r| r.mag_err).collect();
        let (fluxes, flux_errs) = magnitudes_to_fluxes(&mags, &mag_errs, ZERO_POINT);
        Lightcurve {
            times,
            mags,
            mag_errs,
            color_terms: kept.iter().map(|r| r.color_term).collect(),
            quality_flags: kept.iter().map(|r| r.quality_flags).collect(),
            fluxes,
            flux_errs,
            summary: OnceLock::new(),
        }
    }

    /// Parse epoch rows from `reader`, positioned just after a header line,
    /// up to the next header or EOF.
    ///
    /// `path` and `offset` (the header's offset) label errors; the error's
    /// line number counts from the header.
    pub fn read_block<R: BufRead>(
        reader: &mut R,
        path: &Path,
        offset: u64,
        options: &ReadOptions,
    ) -> Result<Self> {
        let mut rows = Vec::new();
        let mut buf = Vec::new();
        let mut line_no = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = std::str::from_utf8(&buf).map_err(|_| {
                Error::corruption(
                    path,
                    line_no,
                    format!("object at offset {offset}: epoch row is not valid UTF-8"),
                )
            })?;
            if line.starts_with('#') {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let row = EpochRow::parse(line).map_err(|msg| {
                Error::corruption(path, line_no, format!("object at offset {offset}: {msg}"))
            })?;
            rows.push(row);
        }
        Ok(Self::from_rows(rows, options))
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn mags(&self) -> &[f64] {
        &self.mags
    }

    pub fn mag_errs(&self) -> &[f64] {
        &self.mag_errs
    }

    pub fn color_terms(&self) -> &[f64] {
        &self.color_terms
    }

    pub fn quality_flags(&self) -> &[u32] {
        &self.quality_flags
    }

    pub fn fluxes(&self) -> &[f64] {
        &self.fluxes
    }

    pub fn flux_errs(&self) -> &[f64] {
        &self.flux_errs
    }

    /// Median and population standard deviation of magnitude and flux.
    /// Computed on first call; NaN for an empty lightcurve.
    pub fn summary(&self) -> Summary {
        *self.summary.get_or_init(|| Summary {
            mag_median: median(&self.mags),
            mag_std: std_dev(&self.mags),
            flux_median: median(&self.fluxes),
            flux_std: std_dev(&self.fluxes),
        })
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}
