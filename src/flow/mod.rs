//! Flow control between the sink and its upstream reader.
//!
//! Provides:
//! - Queue-length backpressure decisions
//! - The `Reader` capability the sink pauses and resumes
//! - A watch-based pause gate for producer tasks

pub mod backpressure;
pub mod gate;
pub mod reader;
