//! Ingest glue: one decoded frame into buffer and aggregator

use tracing::{debug, warn};

use super::aggregator::CategoryAggregator;
use super::buffer::EventBuffer;
use super::config::{MapConfig, TimestampPolicy};
use super::wire::{Event, WireDecoder};

/// Outcome of ingesting one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub dropped: usize,
    pub trailing_bytes: usize,
}

/// xorshift64* generator for staggered arrival delays
#[derive(Debug, Clone)]
pub struct Jitter {
    state: u64,
}

impl Jitter {
    pub fn with_seed(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        Self {
            state: seed.max(1),
        }
    }

    /// Seed from the OS (or browser) entropy source
    pub fn from_entropy() -> Self {
        let mut seed = [0u8; 8];
        if let Err(e) = getrandom::getrandom(&mut seed) {
            warn!(error = %e, "No entropy source, using fixed jitter seed");
            return Self::with_seed(0x9E37_79B9_7F4A_7C15);
        }
        Self::with_seed(u64::from_le_bytes(seed))
    }

    /// Uniform value in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        let bits = self.state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}

/// Everything the render loop reads, fed by the connection
pub struct MapState {
    pub buffer: EventBuffer,
    pub aggregator: CategoryAggregator,
    decoder: WireDecoder,
    timestamps: TimestampPolicy,
    jitter: Jitter,
}

impl MapState {
    pub fn new(config: &MapConfig) -> Self {
        let registry = config.registry();
        let decoder = WireDecoder::new(registry.len(), config.coordinates);
        Self {
            buffer: EventBuffer::new(config.window_secs(), config.max_events),
            aggregator: CategoryAggregator::new(registry),
            decoder,
            timestamps: config.timestamps,
            jitter: Jitter::from_entropy(),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Decode a frame, count each hit and queue its event for display
    pub fn ingest(&mut self, frame: &[u8], now: f64) -> IngestReport {
        let records = self.decoder.decode(frame, now);
        let mut report = IngestReport {
            trailing_bytes: records.trailing_bytes(),
            ..Default::default()
        };

        let mut batch: Vec<Event> = Vec::with_capacity(records.len());
        for result in records {
            match result {
                Ok(event) => {
                    self.aggregator.record_hit(event.category);
                    report.accepted += 1;
                    match self.timestamps {
                        TimestampPolicy::Simultaneous => batch.push(event),
                        TimestampPolicy::Staggered { max_delay } => {
                            let delay = self.jitter.next_f64() * max_delay.as_secs_f64();
                            self.buffer.stage(event.delayed(delay));
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Dropping record");
                    report.dropped += 1;
                }
            }
        }
        self.buffer.push(batch);

        debug!(
            frame_len = frame.len(),
            accepted = report.accepted,
            dropped = report.dropped,
            trailing = report.trailing_bytes,
            "Frame ingested"
        );
        report
    }
}
