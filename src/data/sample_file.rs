//! Sample and profile file format.
//!
//! Both file kinds share the same layout:
//!
//! ```text
//! comp: {name} V_range: {start}-{end} , V_Step: {step}V, Delay: {delay} ms
//! Date :{YYYY-MM-DD}
//! {column header}
//! {rows, space separated}
//! ```
//!
//! The two header lines are parsed into a typed [`SweepHeader`]; the column
//! header and rows are handled by `csv` with a space delimiter, so a row type's
//! serde field names are its column names.

use crate::component::ComponentUnderTest;
use crate::error::{AppResult, DaqError};
use crate::sweep::SweepConfig;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Column layout of a record type stored in these files.
pub trait Record: Serialize + DeserializeOwned {
    /// Column names, in field order.
    const COLUMNS: &'static [&'static str];
}

/// One measured point, as reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSampleRow {
    /// Instrument-reported voltage (V)
    pub voltage: f64,
    /// Instrument-reported current
    pub current: f64,
}

impl Record for RawSampleRow {
    const COLUMNS: &'static [&'static str] = &["voltage", "current"];
}

/// Position-wise statistics across all repeats of a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    /// Mean voltage
    #[serde(rename = "avg_voltages")]
    pub mean_voltage: f64,
    /// Population standard deviation of voltage
    #[serde(rename = "std_voltages")]
    pub std_voltage: f64,
    /// Mean current
    #[serde(rename = "avg_current")]
    pub mean_current: f64,
    /// Population standard deviation of current
    #[serde(rename = "std_current")]
    pub std_current: f64,
}

impl Record for AggregatedRow {
    const COLUMNS: &'static [&'static str] =
        &["avg_voltages", "std_voltages", "avg_current", "std_current"];
}

/// The two header lines of every sample or profile file.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepHeader {
    /// Component name
    pub component: String,
    /// First commanded voltage
    pub start_voltage: f64,
    /// Last commanded voltage
    pub end_voltage: f64,
    /// Voltage step
    pub step: f64,
    /// Inter-sample delay
    pub delay: Duration,
    /// Capture date
    pub date: NaiveDate,
}

impl SweepHeader {
    /// Header describing `sweep` over `component`, captured on `date`.
    pub fn new(component: &ComponentUnderTest, sweep: &SweepConfig, date: NaiveDate) -> Self {
        Self {
            component: component.name().to_string(),
            start_voltage: sweep.start_voltage,
            end_voltage: sweep.end_voltage,
            step: sweep.step(),
            delay: sweep.inter_sample_delay,
            date,
        }
    }

    /// Same as [`new`](Self::new) with today's local date.
    pub fn today(component: &ComponentUnderTest, sweep: &SweepConfig) -> Self {
        Self::new(component, sweep, chrono::Local::now().date_naive())
    }

    /// Parse the first two lines of a file.
    pub fn parse(first: &str, second: &str) -> Result<Self, String> {
        let rest = first
            .trim_end()
            .strip_prefix("comp: ")
            .ok_or("missing 'comp:' header")?;
        let (component, rest) = rest
            .rsplit_once(" V_range: ")
            .ok_or("missing 'V_range:' field")?;
        let (range, rest) = rest
            .split_once(" , V_Step: ")
            .ok_or("missing 'V_Step:' field")?;
        let (step, rest) = rest
            .split_once("V, Delay: ")
            .ok_or("missing 'Delay:' field")?;
        let delay_ms = rest
            .strip_suffix(" ms")
            .ok_or("delay is not in ms")?
            .trim();

        let (start, end) = split_range(range).ok_or_else(|| format!("bad range {:?}", range))?;
        let delay_ms: f64 = parse_number(delay_ms, "delay")?;
        if delay_ms < 0.0 {
            return Err(format!("negative delay {}", delay_ms));
        }

        let date = second
            .trim()
            .strip_prefix("Date")
            .ok_or("missing 'Date' line")?
            .trim_start_matches([' ', ':']);
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("bad date {:?}: {}", date, e))?;

        Ok(Self {
            component: component.to_string(),
            start_voltage: parse_number(start, "start voltage")?,
            end_voltage: parse_number(end, "end voltage")?,
            step: parse_number(step.trim(), "step")?,
            delay: Duration::from_micros((delay_ms * 1000.0).round() as u64),
            date,
        })
    }
}

impl fmt::Display for SweepHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delay_ms = self.delay.as_micros() as f64 / 1000.0;
        writeln!(
            f,
            "comp: {} V_range: {}-{} , V_Step: {}V, Delay: {} ms",
            self.component, self.start_voltage, self.end_voltage, self.step, delay_ms
        )?;
        writeln!(f, "Date :{}", self.date.format("%Y-%m-%d"))
    }
}

fn parse_number(text: &str, what: &str) -> Result<f64, String> {
    text.parse::<f64>()
        .map_err(|_| format!("{} {:?} is not a number", what, text))
}

/// Split `"{start}-{end}"` where either side may itself be negative or use an exponent.
fn split_range(range: &str) -> Option<(&str, &str)> {
    let bytes = range.as_bytes();
    (1..bytes.len())
        .find(|&i| {
            bytes[i] == b'-' && (bytes[i - 1].is_ascii_digit() || bytes[i - 1] == b'.')
        })
        .map(|i| (&range[..i], &range[i + 1..]))
}

/// A parsed sample or profile file.
#[derive(Debug, Clone)]
pub struct SampleFile<T> {
    /// Where it was read from
    pub path: PathBuf,
    /// Typed header
    pub header: SweepHeader,
    /// Data rows in file order
    pub rows: Vec<T>,
}

impl<T: Record> SampleFile<T> {
    /// Read and parse a whole file.
    pub fn read(path: &Path) -> AppResult<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| DaqError::filesystem(path, e))?;
        Self::parse(path, &text)
    }

    /// Parse file contents; `path` is only used for error reporting.
    pub fn parse(path: &Path, text: &str) -> AppResult<Self> {
        let format_err = |reason: String| DaqError::SampleFormat {
            path: path.to_path_buf(),
            reason,
        };

        let (first, rest) = text
            .split_once('\n')
            .ok_or_else(|| format_err("truncated header".to_string()))?;
        let (second, body) = rest
            .split_once('\n')
            .ok_or_else(|| format_err("truncated header".to_string()))?;
        let header = SweepHeader::parse(first, second).map_err(format_err)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let columns = reader
            .headers()
            .map_err(|e| format_err(format!("column header: {}", e)))?;
        if columns.iter().ne(T::COLUMNS.iter().copied()) {
            return Err(format_err(format!(
                "expected columns {:?}, found {:?}",
                T::COLUMNS,
                columns.iter().collect::<Vec<_>>()
            )));
        }

        let rows = reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| format_err(format!("data row: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }
}

/// Row-at-a-time writer: header lines, column header, then flushed records.
///
/// Every appended row is flushed before `append` returns, so an interrupted
/// sweep leaves all completed rows intact on disk.
pub struct SampleWriter<T> {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
    _record: PhantomData<T>,
}

impl<T: Record> SampleWriter<T> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path, header: &SweepHeader) -> AppResult<Self> {
        let fs_err = |e| DaqError::filesystem(path, e);

        let mut file = File::create(path).map_err(fs_err)?;
        file.write_all(header.to_string().as_bytes())
            .map_err(fs_err)?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(T::COLUMNS)
            .map_err(|e| DaqError::filesystem(path, e.into()))?;
        writer.flush().map_err(fs_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
            _record: PhantomData,
        })
    }

    /// Append and flush one row.
    pub fn append(&mut self, row: &T) -> AppResult<()> {
        self.writer
            .serialize(row)
            .map_err(|e| DaqError::filesystem(&self.path, e.into()))?;
        self.writer
            .flush()
            .map_err(|e| DaqError::filesystem(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, sync and close the file, returning the row count.
    pub fn finish(self) -> AppResult<usize> {
        let path = self.path;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| {
                DaqError::filesystem(
                    &path,
                    std::io::Error::new(e.error().kind(), e.error().to_string()),
                )
            })?;
        file.sync_all().map_err(|e| DaqError::filesystem(&path, e))?;
        Ok(self.rows)
    }
}
