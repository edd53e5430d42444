use crate::error::EngineError;
use crate::models::Candle;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rolling window of candles for one symbol
///
/// Candles are kept in strictly increasing time order. Once the window
/// holds `max_candles`, every append evicts the oldest candle. The buffer
/// has a single writer: all mutation goes through `append`.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new candle buffer
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep (at least 1)
    pub fn new(max_candles: usize) -> Self {
        let max_candles = max_candles.max(1);
        Self {
            candles: VecDeque::with_capacity(max_candles + 1),
            max_candles,
        }
    }

    /// Append a candle
    ///
    /// Rejects malformed candles and candles whose time does not advance
    /// past the last stored candle. A rejected candle leaves the buffer
    /// untouched.
    pub fn append(&mut self, candle: Candle) -> Result<(), EngineError> {
        candle.validate()?;

        if let Some(last) = self.candles.back() {
            if candle.time <= last.time {
                return Err(EngineError::StaleCandle {
                    time: candle.time,
                    last: last.time,
                });
            }
        }

        self.candles.push_back(candle);

        // Remove oldest if exceeds max
        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }

        Ok(())
    }

    /// Closes from index `start` to the newest candle (0 = whole window)
    pub fn closes_since(&self, start: usize) -> Vec<f64> {
        self.candles.iter().skip(start).map(|c| c.close).collect()
    }

    /// All candles, oldest first
    pub fn candles(&self) -> impl Iterator<Item = &Candle> + '_ {
        self.candles.iter()
    }

    /// Get the N most recent candles
    pub fn recent(&self, n: usize) -> Vec<Candle> {
        self.candles.iter().rev().take(n).rev().copied().collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_candles
    }
}

/// Break in candle continuity, e.g. across a stream reconnect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gap {
    pub from: i64,
    pub to: i64,
    pub missing_secs: i64,
}

/// Find non-contiguous neighbours in a candle sequence
///
/// # Arguments
/// * `candles` - Candles in time order
/// * `interval_secs` - Expected time between candle opens
///
/// # Returns
/// Every adjacent pair whose spacing exceeds `interval_secs`. Missing
/// periods are reported, never interpolated.
pub fn detect_gaps<'a>(
    candles: impl IntoIterator<Item = &'a Candle>,
    interval_secs: i64,
) -> Vec<Gap> {
    if interval_secs <= 0 {
        return Vec::new();
    }

    let mut gaps = Vec::new();
    let mut prev: Option<&Candle> = None;

    for candle in candles {
        if let Some(p) = prev {
            if let Some(gap) = gap_between(p, candle, interval_secs) {
                gaps.push(gap);
            }
        }
        prev = Some(candle);
    }

    gaps
}

/// Gap between two consecutive candles, if any
pub fn gap_between(prev: &Candle, next: &Candle, interval_secs: i64) -> Option<Gap> {
    let delta = next.time - prev.time;
    if interval_secs > 0 && delta > interval_secs {
        Some(Gap {
            from: prev.time,
            to: next.time,
            missing_secs: delta - interval_secs,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_candle(time: i64, price: f64) -> Candle {
        Candle {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_new_buffer() {
        let buffer = CandleBuffer::new(100);
        assert_eq!(buffer.capacity(), 100);
        assert!(buffer.is_empty());
        assert!(buffer.closes_since(0).is_empty());
    }

    #[test]
    fn test_append_candle() {
        let mut buffer = CandleBuffer::new(100);
        let result = buffer.append(create_test_candle(60, 100.0));
        assert!(result.is_ok());
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.last().map(|c| c.time), Some(60));
    }

    #[test]
    fn test_closes_in_order() {
        let mut buffer = CandleBuffer::new(100);

        buffer.append(create_test_candle(60, 100.0)).unwrap();
        buffer.append(create_test_candle(120, 101.0)).unwrap();
        buffer.append(create_test_candle(180, 102.0)).unwrap();

        assert_eq!(buffer.closes_since(0), vec![100.0, 101.0, 102.0]);
        assert_eq!(buffer.closes_since(1), vec![101.0, 102.0]);
        assert!(buffer.closes_since(5).is_empty());
    }

    #[test]
    fn test_max_candles_limit() {
        let mut buffer = CandleBuffer::new(5);

        // Add 10 candles
        for i in 0..10 {
            buffer
                .append(create_test_candle(60 * (i + 1), 100.0 + i as f64))
                .unwrap();
        }

        let candles: Vec<Candle> = buffer.candles().copied().collect();
        assert_eq!(candles.len(), 5); // Should only keep last 5

        // Should have prices 105-109
        assert_eq!(candles[0].close, 105.0);
        assert_eq!(candles[4].close, 109.0);
        assert!(candles.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = CandleBuffer::new(100);
        for i in 0..137 {
            buffer
                .append(create_test_candle(60 * (i + 1), 50.0 + i as f64))
                .unwrap();
            assert!(buffer.len() <= 100);
        }
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.closes_since(0)[0], 50.0 + 37.0);
    }

    #[test]
    fn test_rejects_stale_time() {
        let mut buffer = CandleBuffer::new(10);
        buffer.append(create_test_candle(120, 100.0)).unwrap();

        let same = buffer.append(create_test_candle(120, 101.0));
        assert_eq!(
            same,
            Err(EngineError::StaleCandle {
                time: 120,
                last: 120
            })
        );

        let older = buffer.append(create_test_candle(60, 99.0));
        assert!(older.is_err());

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.closes_since(0), vec![100.0]);
    }

    #[test]
    fn test_rejects_malformed() {
        let mut buffer = CandleBuffer::new(10);

        let result = buffer.append(create_test_candle(0, 100.0));
        assert!(result.unwrap_err().is_malformed());

        let mut bad = create_test_candle(60, 100.0);
        bad.close = f64::NAN;
        assert!(buffer.append(bad).unwrap_err().is_malformed());

        assert!(buffer.is_empty());
    }

    #[test]
    fn test_get_recent_candles() {
        let mut buffer = CandleBuffer::new(100);

        for i in 0..10 {
            buffer
                .append(create_test_candle(60 * (i + 1), 100.0 + i as f64))
                .unwrap();
        }

        let recent = buffer.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].close, 107.0); // Last 3: 107, 108, 109
        assert_eq!(recent[2].close, 109.0);
    }

    #[test]
    fn test_detect_gaps() {
        let candles = vec![
            create_test_candle(60, 1.0),
            create_test_candle(120, 1.0),
            create_test_candle(300, 1.0),
            create_test_candle(360, 1.0),
        ];

        let gaps = detect_gaps(&candles, 60);
        assert_eq!(
            gaps,
            vec![Gap {
                from: 120,
                to: 300,
                missing_secs: 120
            }]
        );
        assert!(detect_gaps(&candles, 0).is_empty());
        assert!(detect_gaps(&candles[..2], 60).is_empty());
    }
}
