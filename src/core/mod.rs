//! Platform-agnostic core module - shared between the browser app, the desktop app and the CLI

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod registry;
pub mod state;
pub mod wire;

pub use aggregator::{CategoryAggregator, CategoryStats};
pub use buffer::EventBuffer;
pub use config::{ConfigError, MapConfig, TimestampPolicy};
pub use registry::{Category, CategoryRegistry, Rgb};
pub use state::{IngestReport, Jitter, MapState};
pub use wire::{CategoryId, CoordinatePolicy, DecodeError, Event, WireDecoder};
