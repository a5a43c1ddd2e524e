use std::collections::VecDeque;

use serde::Serialize;

use crate::utils::now_epoch_ms;

const DEFAULT_WINDOW_SIZE: usize = 256;
const ENCODE_P95_TARGET_US: u64 = 5_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub average_us: u64,
    pub p95_us: u64,
    pub max_us: u64,
}

impl MetricSummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            average_us: 0,
            p95_us: 0,
            max_us: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub generated_at_ms: u64,
    pub encode: MetricSummary,
    pub decode: MetricSummary,
    pub channel_writes: u64,
    pub skipped_writes: u64,
    pub over_limit_blocks: u64,
    pub codec_failures: u64,
    pub navigations_applied: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingMetric {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingMetric {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_us: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_us);
    }

    fn summary(&self) -> MetricSummary {
        if self.values.is_empty() {
            return MetricSummary::empty();
        }

        let samples = self.values.len();
        let sum: u64 = self.values.iter().sum();
        let average_us = sum / samples as u64;
        let max_us = self.values.iter().copied().max().unwrap_or(0);

        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let p95_index = ((samples as f64 * 0.95).ceil() as usize)
            .saturating_sub(1)
            .min(samples - 1);

        MetricSummary {
            samples,
            average_us,
            p95_us: sorted[p95_index],
            max_us,
        }
    }
}

#[derive(Debug)]
pub struct SyncMetrics {
    encode_us: RollingMetric,
    decode_us: RollingMetric,
    channel_writes: u64,
    skipped_writes: u64,
    over_limit_blocks: u64,
    codec_failures: u64,
    navigations_applied: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            encode_us: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            decode_us: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            channel_writes: 0,
            skipped_writes: 0,
            over_limit_blocks: 0,
            codec_failures: 0,
            navigations_applied: 0,
        }
    }

    pub fn record_encode(&mut self, elapsed_us: u64) {
        self.encode_us.record(elapsed_us);
    }

    pub fn record_decode(&mut self, elapsed_us: u64) {
        self.decode_us.record(elapsed_us);
    }

    pub fn record_write(&mut self) {
        self.channel_writes += 1;
    }

    pub fn record_skipped_write(&mut self) {
        self.skipped_writes += 1;
    }

    pub fn record_over_limit(&mut self) {
        self.over_limit_blocks += 1;
    }

    pub fn record_codec_failure(&mut self) {
        self.codec_failures += 1;
    }

    pub fn record_navigation(&mut self) {
        self.navigations_applied += 1;
    }

    pub fn report(&self) -> SyncReport {
        let encode = self.encode_us.summary();
        let decode = self.decode_us.summary();

        let mut warnings = Vec::new();
        if self.over_limit_blocks > 0 {
            warnings.push(format!(
                "Blocked {} saves because the document no longer fits in the link.",
                self.over_limit_blocks
            ));
        }
        if self.codec_failures > 0 {
            warnings.push(format!(
                "{} encode/decode operations failed.",
                self.codec_failures
            ));
        }
        if encode.samples > 0 && encode.p95_us > ENCODE_P95_TARGET_US {
            warnings.push(format!(
                "Encode P95 latency {}us exceeded target {}us.",
                encode.p95_us, ENCODE_P95_TARGET_US
            ));
        }

        SyncReport {
            generated_at_ms: now_epoch_ms(),
            encode,
            decode,
            channel_writes: self.channel_writes,
            skipped_writes: self.skipped_writes,
            over_limit_blocks: self.over_limit_blocks,
            codec_failures: self.codec_failures,
            navigations_applied: self.navigations_applied,
            warnings,
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
