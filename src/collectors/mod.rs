//! Process metric collection: sample processes on demand, filter by owner, derive gauges.

mod cpu;
mod process;
#[cfg(target_os = "linux")]
mod procfs;

use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::CollectorConfig;

pub use cpu::CpuTracker;
pub use process::{
    Attribute, AttributeUnavailable, ProcessHandle, ProcessSource, SampleError, SysinfoProcess,
    SysinfoSource,
};

/// Label names shared by every gauge family, in label-value order.
pub const LABEL_NAMES: [&str; 4] = ["name", "pid", "cmd", "user"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Memory,
    OpenFiles,
}

impl MetricKind {
    /// Emission order within one process.
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::OpenFiles];
}

/// Static description of one gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeDescriptor {
    pub kind: MetricKind,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: [&'static str; 4],
}

pub static DESCRIPTORS: [GaugeDescriptor; 3] = [
    GaugeDescriptor {
        kind: MetricKind::Cpu,
        name: "describe_node_process_cpu_info",
        help: "node process cpu monitor",
        labels: LABEL_NAMES,
    },
    GaugeDescriptor {
        kind: MetricKind::Memory,
        name: "describe_node_process_memory_info",
        help: "node process memory monitor",
        labels: LABEL_NAMES,
    },
    GaugeDescriptor {
        kind: MetricKind::OpenFiles,
        name: "describe_node_process_openfiles_info",
        help: "node process openfiles monitor",
        labels: LABEL_NAMES,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLabels {
    pub name: String,
    pub pid: String,
    pub cmd: String,
    pub user: String,
}

impl ProcessLabels {
    /// Values in `LABEL_NAMES` order.
    pub fn values(&self) -> [&str; 4] {
        [&self.name, &self.pid, &self.cmd, &self.user]
    }
}

/// One gauge value for one process in one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeObservation {
    pub kind: MetricKind,
    pub value: f64,
    pub labels: ProcessLabels,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Sample(#[from] SampleError),
}

/// Derived values of one process that passed every accessor.
struct ProcessSample {
    labels: ProcessLabels,
    cpu: f64,
    memory: f64,
    open_files: f64,
}

/// Orchestrates a sampler pass per scrape and turns it into gauge observations.
pub struct ProcessMetricsCollector<S> {
    source: S,
    privileged_user: String,
    cpu: CpuTracker,
}

impl<S: ProcessSource> ProcessMetricsCollector<S> {
    pub fn new(source: S, config: &CollectorConfig) -> Self {
        Self {
            source,
            privileged_user: config.privileged_user.clone(),
            cpu: CpuTracker::new(),
        }
    }

    /// The three gauge families, independent of any sample.
    pub fn describe(&self) -> &'static [GaugeDescriptor] {
        &DESCRIPTORS
    }

    /// Run a fresh sampler pass now. Each CPU sample is timestamped right after its read.
    pub fn collect(&self) -> Result<Vec<GaugeObservation>, CollectError> {
        self.run(None)
    }

    /// Run a fresh sampler pass with every CPU sample timestamped at `now`.
    pub fn collect_at(&self, now: Instant) -> Result<Vec<GaugeObservation>, CollectError> {
        self.run(Some(now))
    }

    fn run(&self, clock: Option<Instant>) -> Result<Vec<GaugeObservation>, CollectError> {
        let timer = Instant::now();
        let started = clock.unwrap_or(timer);
        let handles = self.source.processes()?;
        let total_memory = self.source.total_memory()?;

        let mut seen = HashSet::with_capacity(handles.len());
        let mut observations = Vec::new();
        for handle in &handles {
            let sample = match self.sample(handle, total_memory, clock, &mut seen) {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(e) => {
                    trace!(
                        pid = e.pid,
                        attribute = %e.attribute,
                        reason = %e.reason,
                        "process skipped"
                    );
                    continue;
                }
            };
            for kind in MetricKind::ALL {
                let value = match kind {
                    MetricKind::Cpu => sample.cpu,
                    MetricKind::Memory => sample.memory,
                    MetricKind::OpenFiles => sample.open_files,
                };
                if value != 0.0 {
                    observations.push(GaugeObservation {
                        kind,
                        value,
                        labels: sample.labels.clone(),
                    });
                }
            }
        }
        self.cpu.retain(&seen, started);

        debug!(
            processes = handles.len(),
            observations = observations.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "collection pass"
        );
        Ok(observations)
    }

    /// `Ok(None)` for processes outside the owner filter; `Err` on the first failing accessor.
    fn sample(
        &self,
        handle: &S::Handle,
        total_memory: u64,
        clock: Option<Instant>,
        seen: &mut HashSet<u32>,
    ) -> Result<Option<ProcessSample>, AttributeUnavailable> {
        let user = handle.username()?;
        if user != self.privileged_user {
            return Ok(None);
        }
        let name = handle.name()?;

        let pid = handle.pid();
        let cpu_time = handle.cpu_time()?;
        let at = clock.unwrap_or_else(Instant::now);
        seen.insert(pid);
        let cpu = self.cpu.observe(pid, handle.start_time(), cpu_time, at);

        let memory = memory_share(handle.resident_memory()?, total_memory);
        let open_files = handle.open_files()? as f64;
        let cmd = handle.cmdline()?;

        Ok(Some(ProcessSample {
            labels: ProcessLabels {
                name,
                pid: pid.to_string(),
                cmd,
                user,
            },
            cpu,
            memory,
            open_files,
        }))
    }
}

/// Resident memory as a percentage of total physical memory.
pub fn memory_share(resident_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    resident_bytes as f64 * 100.0 / total_bytes as f64
}
