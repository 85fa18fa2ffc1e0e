use crate::DataError;
use chrono::{DateTime, NaiveDateTime, Utc};
use perpkit_core::{Candle, RawCandle};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

/// Load OHLCV candles from a CSV file.
///
/// Expected columns (case-insensitive, flexible ordering):
/// `timestamp` (or `date`, `datetime`, `time`), `open`, `high`, `low`,
/// `close`, `volume`. Timestamps may be epoch milliseconds, epoch seconds or
/// common date formats.
pub fn load_candles_from_csv(path: &Path) -> Result<Vec<Candle>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::ParseError(format!("Failed to open CSV: {}", e)))?;

    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let columns = CandleColumns::resolve(&headers)?;
    let mut candles = reader
        .records()
        .map(|result| {
            let record =
                result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;
            columns.read(&record)
        })
        .collect::<Result<Vec<_>, _>>()?;

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[derive(Serialize)]
struct CandleRow {
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Write candles with an epoch-millisecond `timestamp` column.
pub fn write_candles_to_csv(path: &Path, candles: &[Candle]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DataError::ParseError(format!("Failed to create CSV: {}", e)))?;

    for candle in candles {
        writer
            .serialize(CandleRow {
                timestamp: candle.timestamp.timestamp_millis(),
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            })
            .map_err(|e| DataError::ParseError(format!("CSV write error: {}", e)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Candles in the exchange's `[ms, o, h, l, c, v]` shape, for seeding a
/// simulated exchange from stored history.
pub fn to_raw_candles(candles: &[Candle]) -> Vec<RawCandle> {
    candles
        .iter()
        .map(|c| {
            RawCandle(
                c.timestamp.timestamp_millis(),
                c.open,
                c.high,
                c.low,
                c.close,
                c.volume,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "date", "datetime", "time"];
const VOLUME_ALIASES: &[&str] = &["volume", "vol", "v"];
/// Header aliases for open, high, low and close, in that order.
const PRICE_ALIASES: [(&str, &[&str]); 4] = [
    ("open", &["open", "o"]),
    ("high", &["high", "h"]),
    ("low", &["low", "l"]),
    ("close", &["close", "c"]),
];

/// Column indices of a candle file, resolved once from its header row.
struct CandleColumns {
    timestamp: usize,
    prices: [usize; 4],
    volume: Option<usize>,
}

impl CandleColumns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, DataError> {
        let require = |name: &str, aliases: &[&str]| {
            find_column(headers, aliases)
                .ok_or_else(|| DataError::ParseError(format!("No {} column found", name)))
        };

        let timestamp = require("timestamp", TIMESTAMP_ALIASES)?;
        let mut prices = [0; 4];
        for (slot, (name, aliases)) in prices.iter_mut().zip(PRICE_ALIASES) {
            *slot = require(name, aliases)?;
        }
        Ok(Self {
            timestamp,
            prices,
            volume: find_column(headers, VOLUME_ALIASES),
        })
    }

    fn read(&self, record: &csv::StringRecord) -> Result<Candle, DataError> {
        let mut ohlc = [Decimal::ZERO; 4];
        for ((value, idx), (name, _)) in ohlc.iter_mut().zip(self.prices).zip(PRICE_ALIASES) {
            *value = parse_decimal(field(record, idx)?, name)?;
        }
        let [open, high, low, close] = ohlc;
        let volume = match self.volume {
            Some(idx) => parse_decimal(field(record, idx)?, "volume")?,
            None => Decimal::ZERO,
        };

        Ok(Candle {
            timestamp: parse_timestamp(field(record, self.timestamp)?)?,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.contains(&header.trim().to_lowercase().as_str()))
}

fn field(record: &csv::StringRecord, idx: usize) -> Result<&str, DataError> {
    record.get(idx).ok_or_else(|| {
        DataError::ParseError(format!("Short CSV record, missing column {}", idx))
    })
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, DataError> {
    Decimal::from_str(s.trim())
        .map_err(|e| DataError::ParseError(format!("Failed to parse {} '{}': {}", field, s, e)))
}

/// Integers above this are read as milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DataError> {
    let s = s.trim();

    if let Ok(ts) = s.parse::<i64>() {
        let parsed = if ts.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(ts)
        } else {
            DateTime::from_timestamp(ts, 0)
        };
        return parsed.ok_or_else(|| {
            DataError::ParseError(format!("Timestamp out of range: '{}'", s))
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without a timezone, assume UTC
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(midnight) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(DataError::ParseError(format!(
        "Unable to parse timestamp: '{}'",
        s
    )))
}
