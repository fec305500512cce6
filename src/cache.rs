use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tracing::debug;

use crate::models::{PracticeRecord, RadarDimension, RangeMode, TrendPoint};
use crate::radar::{build_radar, DEFAULT_RECENT_N};
use crate::summary::build_summary;
use crate::trend::build_trend;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthSnapshot {
    pub range: RangeMode,
    pub trend: Vec<TrendPoint>,
    pub radar: Vec<RadarDimension>,
    pub summary: String,
}

impl GrowthSnapshot {
    pub fn compute<Tz: TimeZone>(
        records: &[PracticeRecord],
        range: RangeMode,
        recent_n: usize,
        now: &DateTime<Tz>,
    ) -> Self {
        Self {
            range,
            trend: build_trend(records, range, now),
            radar: build_radar(records, recent_n),
            summary: build_summary(records, &now.timezone()),
        }
    }
}

/// `<latest timestamp millis>-<record count>-<range id>`. The count covers
/// every supplied record, scored or not.
pub fn signature(records: &[PracticeRecord], range: RangeMode) -> String {
    let latest = records
        .iter()
        .map(|record| record.timestamp)
        .max()
        .map(|timestamp| timestamp.timestamp_millis())
        .unwrap_or(0);
    format!("{latest}-{}-{}", records.len(), range.id())
}

/// Memoizes growth snapshots by input signature, evicting in insertion order.
/// The evaluation clock is not part of the key.
#[derive(Debug)]
pub struct AggregationCache {
    capacity: usize,
    recent_n: usize,
    entries: HashMap<String, Arc<GrowthSnapshot>>,
    order: VecDeque<String>,
}

impl Default for AggregationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RECENT_N)
    }
}

impl AggregationCache {
    pub fn new(capacity: usize, recent_n: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent_n,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn aggregate<Tz: TimeZone>(
        &mut self,
        records: &[PracticeRecord],
        range: RangeMode,
        now: &DateTime<Tz>,
    ) -> Arc<GrowthSnapshot> {
        let key = signature(records, range);
        if let Some(snapshot) = self.entries.get(&key) {
            debug!(signature = %key, "growth cache hit");
            return Arc::clone(snapshot);
        }

        debug!(signature = %key, records = records.len(), "growth cache miss");
        let snapshot = Arc::new(GrowthSnapshot::compute(records, range, self.recent_n, now));
        self.entries.insert(key.clone(), Arc::clone(&snapshot));
        self.order.push_back(key);

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }

        snapshot
    }

    pub fn clear_cache(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }
}
