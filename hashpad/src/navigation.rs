//! Moves encoded documents between the engine and the channel.
//!
//! Reads never write back, and writes are gated on the capacity ceiling and on the channel
//! already holding the same value.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capacity::{CapacitySnapshot, assess};
use crate::channel::{Channel, WriteMode};
use crate::codec::try_decode;
use crate::config::EngineConfig;
use crate::metrics::SyncMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRead {
    Empty,
    Document { text: String, encoded: String },
    /// The channel is non-empty but does not decode. Callers must not treat this as an empty
    /// document.
    Unreadable { encoded: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Unchanged,
    OverLimit,
}

pub struct NavigationBridge<C> {
    channel: C,
    write_mode: WriteMode,
    max_length: usize,
    max_decoded_bytes: usize,
}

impl<C: Channel> NavigationBridge<C> {
    pub fn new(channel: C, config: &EngineConfig) -> Self {
        Self {
            channel,
            write_mode: config.write_mode,
            max_length: config.max_channel_length,
            max_decoded_bytes: config.max_decoded_bytes,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn assess(&self, encoded: &str) -> CapacitySnapshot {
        assess(encoded, self.max_length)
    }

    pub fn read(&self, metrics: &mut SyncMetrics) -> ChannelRead {
        let encoded = self.channel.read();
        if encoded.is_empty() {
            return ChannelRead::Empty;
        }

        let started = Instant::now();
        let decoded = try_decode(&encoded, self.max_decoded_bytes);
        metrics.record_decode(started.elapsed().as_micros() as u64);

        match decoded {
            Ok(text) if !text.is_empty() => ChannelRead::Document { text, encoded },
            Ok(_) => {
                warn!(len = encoded.len(), "channel value decoded to nothing");
                metrics.record_codec_failure();
                ChannelRead::Unreadable { encoded }
            }
            Err(err) => {
                warn!(len = encoded.len(), "channel value is unreadable: {err}");
                metrics.record_codec_failure();
                ChannelRead::Unreadable { encoded }
            }
        }
    }

    /// Writes `encoded` unless it would exceed the ceiling or the channel already holds it.
    pub fn publish(&mut self, encoded: &str, metrics: &mut SyncMetrics) -> PublishOutcome {
        let snapshot = self.assess(encoded);
        if snapshot.over_limit {
            warn!(
                len = encoded.len(),
                max_length = self.max_length,
                percent_used = snapshot.percent_used(),
                "document exceeds link capacity; keeping previous link"
            );
            metrics.record_over_limit();
            return PublishOutcome::OverLimit;
        }

        if self.channel.read() == encoded {
            debug!(len = encoded.len(), "channel already holds document; skipping write");
            metrics.record_skipped_write();
            return PublishOutcome::Unchanged;
        }

        self.channel.write(encoded, self.write_mode);
        metrics.record_write();
        info!(
            len = encoded.len(),
            mode = ?self.write_mode,
            percent_used = snapshot.percent_used(),
            "document written to link"
        );
        PublishOutcome::Written
    }
}
