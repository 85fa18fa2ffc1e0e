use chrono::DateTime;
use perpkit_core::{params, AdapterError, Candle, Params, RawCandle, Timeframe};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One paginated candle request, bounds in milliseconds (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl CandleWindow {
    /// Request parameters; the exchange takes whole seconds as strings.
    pub fn params(&self) -> Params {
        params(json!({
            "start_time": (self.start_ms / 1000).to_string(),
            "end_time": (self.end_ms / 1000).to_string(),
        }))
    }

    pub fn span_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Split `[end_ms - limit * interval, end_ms]` into request windows of at
/// most `max_per_request` candles. Consecutive windows are separated by 1 ms
/// so a boundary timestamp is requested only once.
pub fn candle_windows(
    end_ms: i64,
    limit: u32,
    timeframe: Timeframe,
    max_per_request: u32,
) -> Vec<CandleWindow> {
    let interval = timeframe.to_millis();
    let step = i64::from(max_per_request.max(1)) * interval;
    let start_ms = end_ms - i64::from(limit) * interval;

    let mut windows = Vec::new();
    let mut current = start_ms;
    while current < end_ms {
        windows.push(CandleWindow {
            start_ms: current,
            end_ms: (current + step).min(end_ms),
        });
        current += step + 1;
    }
    windows
}

/// Concatenate per-window results, order them by time and drop repeated
/// timestamps (the first occurrence wins).
pub fn merge_candles(batches: Vec<Vec<RawCandle>>) -> Result<Vec<Candle>, AdapterError> {
    let mut raw: Vec<RawCandle> = batches.into_iter().flatten().collect();
    raw.sort_by_key(|c| c.timestamp());
    raw.dedup_by_key(|c| c.timestamp());

    raw.into_iter()
        .map(|RawCandle(ts, open, high, low, close, volume)| {
            let timestamp = DateTime::from_timestamp_millis(ts).ok_or_else(|| {
                AdapterError::Malformed(format!("candle timestamp out of range: {}", ts))
            })?;
            Ok(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}
