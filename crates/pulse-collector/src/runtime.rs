use crate::Collector;
use anyhow::Result;
use pulse_common::types::Metric;
use rand::Rng;
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

/// Samples the observed process itself: a fixed map of named gauges covering
/// memory, CPU, uptime and disk IO, plus a `RandomValue` gauge that changes
/// on every poll.
pub struct RuntimeCollector {
    system: System,
    pid: Pid,
}

impl RuntimeCollector {
    pub fn new() -> Result<Self> {
        let pid = get_current_pid().map_err(|e| anyhow::anyhow!("resolve own pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow::anyhow!("own process vanished from the process table"))?;

        let disk = process.disk_usage();
        let mut points = vec![
            Metric::gauge("ResidentMemory", process.memory() as f64),
            Metric::gauge("VirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("CpuUsage", process.cpu_usage() as f64),
            Metric::gauge("RunTime", process.run_time() as f64),
            Metric::gauge("DiskReadBytes", disk.read_bytes as f64),
            Metric::gauge("DiskWrittenBytes", disk.written_bytes as f64),
            Metric::gauge("TotalDiskReadBytes", disk.total_read_bytes as f64),
            Metric::gauge("TotalDiskWrittenBytes", disk.total_written_bytes as f64),
        ];
        points.push(Metric::gauge(
            "RandomValue",
            rand::thread_rng().gen::<f64>() * 100.0,
        ));
        Ok(points)
    }
}
