pub mod csv_loader;

use perpkit_core::{Candle, Timeframe};
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors from candle storage.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A directory of candle CSV files, one per pair and timeframe
/// (`BTC-USDT_1h.csv`).
pub struct CsvCandleStore {
    pub directory: PathBuf,
}

impl CsvCandleStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, pair: &str, timeframe: Timeframe) -> PathBuf {
        self.directory.join(format!("{}_{}.csv", pair, timeframe))
    }

    pub fn load(&self, pair: &str, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
        let path = self.path_for(pair, timeframe);
        if !path.exists() {
            return Err(DataError::NotFound(format!(
                "CSV file not found: {}",
                path.display()
            )));
        }
        csv_loader::load_candles_from_csv(&path)
    }

    /// Write candles, replacing any existing file for the pair and timeframe.
    pub fn save(
        &self,
        pair: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<PathBuf, DataError> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.path_for(pair, timeframe);
        csv_loader::write_candles_to_csv(&path, candles)?;
        info!(pair, %timeframe, candles = candles.len(), path = %path.display(), "Saved candles");
        Ok(path)
    }

    /// `(pair, timeframe)` for every well-named CSV file in the directory.
    pub fn available(&self) -> Result<Vec<(String, Timeframe)>, DataError> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if let Some(key) = parse_file_name(&path) {
                found.push(key);
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.to_millis().cmp(&b.1.to_millis())));
        Ok(found)
    }
}

fn parse_file_name(path: &Path) -> Option<(String, Timeframe)> {
    if path.extension()? != "csv" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (pair, timeframe) = stem.rsplit_once('_')?;
    Some((pair.to_string(), timeframe.parse().ok()?))
}
