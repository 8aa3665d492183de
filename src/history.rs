//! Rolling per-server population history and hourly aggregation.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::{PopulationSample, Store};

/// Default retention window in hours.
pub const DEFAULT_HISTORY_HOURS: u32 = 12;

/// Aggregated population for one hour bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyStat {
    pub date_hour: u32,
    pub avg: f64,
    pub max: u32,
}

/// Encode a timestamp as its UTC hour bucket, `YYYYMMDDHH`.
///
/// Buckets compare in time order as plain integers for years 0 through 4294.
/// Later timestamps saturate to `u32::MAX`.
pub fn hour_bucket(dt: DateTime<Utc>) -> u32 {
    let year = dt.year().max(0) as u64;
    let bucket = year * 1_000_000
        + dt.month() as u64 * 10_000
        + dt.day() as u64 * 100
        + dt.hour() as u64;
    u32::try_from(bucket).unwrap_or(u32::MAX)
}

/// Population history for one server, kept in the shared [`Store`].
#[derive(Clone)]
pub struct HistoryBuffer {
    server_id: String,
    store: Arc<Store>,
    retention: ChronoDuration,
}

impl HistoryBuffer {
    pub fn new(server_id: impl Into<String>, store: Arc<Store>, retention_hours: u32) -> Self {
        Self {
            server_id: server_id.into(),
            store,
            retention: ChronoDuration::hours(retention_hours as i64),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Record a sample for the hour containing `now`, then drop everything at or
    /// before the hour `retention` earlier.
    ///
    /// Does nothing if the store has not been loaded.
    pub fn add(&self, players_num: u32, now: DateTime<Utc>) {
        let date_hour = hour_bucket(now);
        // A window reaching past chrono's range keeps everything.
        let floor = now
            .checked_sub_signed(self.retention)
            .map_or(0, hour_bucket);

        let pruned = self.store.update(&self.server_id, |samples| {
            samples.push(PopulationSample {
                date_hour,
                players_num,
            });
            let before = samples.len();
            samples.retain(|s| s.date_hour > floor);
            before - samples.len()
        });

        match pruned {
            Some(n) if n > 0 => tracing::debug!(
                "History: pruned {} samples for {} (floor {})",
                n,
                self.server_id,
                floor
            ),
            Some(_) => {}
            None => tracing::debug!(
                "History: store not loaded, skipping sample for {}",
                self.server_id
            ),
        }
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> Vec<PopulationSample> {
        self.store.samples(&self.server_id).unwrap_or_default()
    }

    /// Average and maximum player count per hour bucket, ascending by bucket.
    pub fn stats(&self) -> Vec<HourlyStat> {
        aggregate_hourly(&self.samples())
    }
}

/// Group samples by hour bucket and compute mean and max for each.
pub fn aggregate_hourly(samples: &[PopulationSample]) -> Vec<HourlyStat> {
    // bucket -> (sum, count, max)
    let mut grouped: BTreeMap<u32, (u64, u64, u32)> = BTreeMap::new();

    for s in samples {
        let entry = grouped.entry(s.date_hour).or_insert((0, 0, 0));
        entry.0 += s.players_num as u64;
        entry.1 += 1;
        entry.2 = entry.2.max(s.players_num);
    }

    grouped
        .into_iter()
        .map(|(date_hour, (sum, count, max))| HourlyStat {
            date_hour,
            avg: sum as f64 / count as f64,
            max,
        })
        .collect()
}
