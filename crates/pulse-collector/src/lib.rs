//! Metric samplers for the agent: process-runtime gauges and host-level
//! gauges, each behind the same [`Collector`] trait.

pub mod runtime;
pub mod system;

use anyhow::Result;
use pulse_common::types::Metric;

pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn collect(&mut self) -> Result<Vec<Metric>>;
}
