use crate::Collector;
use anyhow::Result;
use pulse_common::types::Metric;
use sysinfo::System;

/// Samples host-level gauges: total and free memory plus per-core CPU
/// utilisation (`CPUutilization1..N`, one gauge per logical CPU).
pub struct SystemCollector {
    system: System,
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters; utilisation is measured between refreshes.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut points = vec![
            Metric::gauge("TotalMemory", self.system.total_memory() as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
        ];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(Metric::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
        Ok(points)
    }
}
