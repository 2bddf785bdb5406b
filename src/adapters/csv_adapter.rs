//! CSV file data adapter.
//!
//! Each symbol lives in `{SYMBOL}.csv` under the data directory with a header
//! row naming `date,open,high,low,close,volume` (case-insensitive, any order).

use crate::domain::error::SwingtraderError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

impl From<CsvRow> for PriceBar {
    fn from(row: CsvRow) -> Self {
        PriceBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.filter(|v| v.is_finite()).unwrap_or(0.0) as i64,
        }
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Every parseable row in the file, in file order.
    fn read_all(&self, symbol: &str) -> Result<Vec<PriceBar>, SwingtraderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| SwingtraderError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| SwingtraderError::DataSource {
                reason: format!("{}: bad header: {}", path.display(), e),
            })?
            .iter()
            .map(|h| h.to_lowercase())
            .collect::<csv::StringRecord>();
        reader.set_headers(headers);

        let mut bars = Vec::new();
        let mut skipped = 0usize;
        for row in reader.deserialize::<CsvRow>() {
            match row {
                Ok(row) => bars.push(PriceBar::from(row)),
                Err(e) => {
                    skipped += 1;
                    debug!(symbol, error = %e, "unparseable row");
                }
            }
        }
        if skipped > 0 {
            warn!(symbol, skipped, "skipped unparseable rows");
        }

        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SwingtraderError> {
        let mut bars: Vec<PriceBar> = self
            .read_all(symbol)?
            .into_iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .collect();
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, SwingtraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| SwingtraderError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SwingtraderError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && let Some(stem) = path.file_stem() {
                symbols.push(stem.to_string_lossy().to_uppercase());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SwingtraderError> {
        if !self.csv_path(symbol).exists() {
            return Ok(None);
        }
        let bars = self.read_all(symbol)?;
        let first = bars.iter().map(|b| b.date).min();
        let last = bars.iter().map(|b| b.date).max();
        Ok(first.zip(last).map(|(f, l)| (f, l, bars.len())))
    }
}
