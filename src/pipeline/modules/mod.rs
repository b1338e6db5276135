//! Built-in modules.
//!
//! Small modules that exercise the full module contract: a bounded image
//! source, an in-place filter and a counting sink.

mod invert;
mod null_sink;
mod pattern_source;

pub use invert::Invert;
pub use null_sink::NullSink;
pub use pattern_source::PatternSource;
