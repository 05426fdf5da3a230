//! Process sampler: enumerate processes and read per-process facts (cross-platform via sysinfo).

use std::fmt;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, System, UpdateKind, Users};
use thiserror::Error;

/// Enumeration-level failure. Fatal to the scrape that hit it.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("process introspection is not supported on this platform")]
    Unsupported,
    #[error("cannot enumerate processes: {0}")]
    Enumeration(String),
    #[error("total system memory is unavailable")]
    TotalMemory,
}

/// Per-process fact a handle can fail to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    User,
    Name,
    Cmdline,
    CpuTime,
    Memory,
    OpenFiles,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attribute::User => "user",
            Attribute::Name => "name",
            Attribute::Cmdline => "cmdline",
            Attribute::CpuTime => "cpu_time",
            Attribute::Memory => "memory",
            Attribute::OpenFiles => "open_files",
        })
    }
}

/// One attribute of one process could not be read (exited, permission denied, kernel thread...).
#[derive(Debug, Clone, Error)]
#[error("{attribute} unavailable for pid {pid}: {reason}")]
pub struct AttributeUnavailable {
    pub pid: u32,
    pub attribute: Attribute,
    pub reason: String,
}

impl AttributeUnavailable {
    pub fn new(pid: u32, attribute: Attribute, reason: impl Into<String>) -> Self {
        Self {
            pid,
            attribute,
            reason: reason.into(),
        }
    }
}

/// A process seen by one enumeration pass. Accessors fail independently.
pub trait ProcessHandle {
    fn pid(&self) -> u32;
    /// Start time in seconds since epoch; tells a reused pid apart from its predecessor.
    fn start_time(&self) -> u64;
    fn username(&self) -> Result<String, AttributeUnavailable>;
    fn name(&self) -> Result<String, AttributeUnavailable>;
    fn cmdline(&self) -> Result<String, AttributeUnavailable>;
    /// Cumulative user + system CPU time since the process started.
    fn cpu_time(&self) -> Result<Duration, AttributeUnavailable>;
    /// Resident set size in bytes.
    fn resident_memory(&self) -> Result<u64, AttributeUnavailable>;
    fn open_files(&self) -> Result<u64, AttributeUnavailable>;
}

/// Source of process handles. Each call to `processes` must return fresh, independent handles.
pub trait ProcessSource: Send + Sync {
    type Handle: ProcessHandle;

    fn processes(&self) -> Result<Vec<Self::Handle>, SampleError>;
    /// Total physical memory in bytes, read fresh on every call.
    fn total_memory(&self) -> Result<u64, SampleError>;
}

/// Process facts captured by sysinfo during one refresh; procfs facts are read on access.
#[derive(Debug, Clone)]
pub struct SysinfoProcess {
    pid: u32,
    start_time: u64,
    name: String,
    cmd: Vec<String>,
    user: Option<String>,
    memory: u64,
}

impl ProcessHandle for SysinfoProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn start_time(&self) -> u64 {
        self.start_time
    }

    fn username(&self) -> Result<String, AttributeUnavailable> {
        self.user
            .clone()
            .ok_or_else(|| AttributeUnavailable::new(self.pid, Attribute::User, "unknown owner"))
    }

    fn name(&self) -> Result<String, AttributeUnavailable> {
        if self.name.is_empty() {
            return Err(AttributeUnavailable::new(self.pid, Attribute::Name, "empty name"));
        }
        Ok(self.name.clone())
    }

    fn cmdline(&self) -> Result<String, AttributeUnavailable> {
        Ok(self.cmd.join(" "))
    }

    #[cfg(target_os = "linux")]
    fn cpu_time(&self) -> Result<Duration, AttributeUnavailable> {
        super::procfs::cpu_time(self.pid)
            .map_err(|e| AttributeUnavailable::new(self.pid, Attribute::CpuTime, e.to_string()))
    }

    // Handles are only produced on Linux; see `SysinfoSource::refresh`.
    #[cfg(not(target_os = "linux"))]
    fn cpu_time(&self) -> Result<Duration, AttributeUnavailable> {
        Err(AttributeUnavailable::new(self.pid, Attribute::CpuTime, "not supported"))
    }

    fn resident_memory(&self) -> Result<u64, AttributeUnavailable> {
        Ok(self.memory)
    }

    #[cfg(target_os = "linux")]
    fn open_files(&self) -> Result<u64, AttributeUnavailable> {
        super::procfs::open_fds(self.pid)
            .map_err(|e| AttributeUnavailable::new(self.pid, Attribute::OpenFiles, e.to_string()))
    }

    #[cfg(not(target_os = "linux"))]
    fn open_files(&self) -> Result<u64, AttributeUnavailable> {
        Err(AttributeUnavailable::new(self.pid, Attribute::OpenFiles, "not supported"))
    }
}

/// Production source. Holds no state: every pass builds its own `System`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSource;

impl SysinfoSource {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSource for SysinfoSource {
    type Handle = SysinfoProcess;

    fn processes(&self) -> Result<Vec<SysinfoProcess>, SampleError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SampleError::Unsupported);
        }
        self.refresh()
    }

    fn total_memory(&self) -> Result<u64, SampleError> {
        let mut sys = System::new();
        sys.refresh_memory();
        match sys.total_memory() {
            0 => Err(SampleError::TotalMemory),
            total => Ok(total),
        }
    }
}

impl SysinfoSource {
    /// CPU time and descriptor counts come from /proc, so no other platform can be sampled.
    #[cfg(not(target_os = "linux"))]
    fn refresh(&self) -> Result<Vec<SysinfoProcess>, SampleError> {
        Err(SampleError::Unsupported)
    }

    #[cfg(target_os = "linux")]
    fn refresh(&self) -> Result<Vec<SysinfoProcess>, SampleError> {
        let leaders = super::procfs::thread_group_leaders()
            .map_err(|e| SampleError::Enumeration(e.to_string()))?;

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_memory()
                .with_cmd(UpdateKind::Always)
                .with_user(UpdateKind::Always),
        );
        let users = Users::new_with_refreshed_list();

        let mut out = Vec::with_capacity(sys.processes().len());
        for (pid, proc_) in sys.processes() {
            let pid = pid.as_u32();
            if !leaders.contains(&pid) {
                continue;
            }
            let user = proc_
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|u| u.name().to_string());
            out.push(SysinfoProcess {
                pid,
                start_time: proc_.start_time(),
                name: proc_.name().to_string(),
                cmd: proc_.cmd().to_vec(),
                user,
                memory: proc_.memory(),
            });
        }

        // The exporter itself is always running, so an empty list means the OS query failed.
        if out.is_empty() {
            return Err(SampleError::Enumeration("no processes visible".into()));
        }
        out.sort_unstable_by_key(|p| p.pid);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(user: Option<&str>, name: &str, cmd: &[&str]) -> SysinfoProcess {
        SysinfoProcess {
            pid: 42,
            start_time: 1,
            name: name.to_string(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            user: user.map(String::from),
            memory: 4096,
        }
    }

    #[test]
    fn cmdline_joins_arguments_with_spaces() {
        let h = handle(Some("root"), "sshd", &["/usr/sbin/sshd", "-D"]);
        assert_eq!(h.cmdline().unwrap(), "/usr/sbin/sshd -D");
    }

    #[test]
    fn kernel_thread_has_empty_cmdline() {
        let h = handle(Some("root"), "kworker/0:1", &[]);
        assert_eq!(h.cmdline().unwrap(), "");
    }

    #[test]
    fn missing_owner_is_unavailable() {
        let err = handle(None, "sshd", &[]).username().unwrap_err();
        assert_eq!(err.attribute, Attribute::User);
        assert_eq!(err.pid, 42);
    }

    #[test]
    fn empty_name_is_unavailable() {
        let err = handle(Some("root"), "", &[]).name().unwrap_err();
        assert_eq!(err.attribute, Attribute::Name);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_pass_includes_own_process() {
        let source = SysinfoSource::new();
        let procs = source.processes().unwrap();
        let me = std::process::id();
        assert!(procs.iter().any(|p| p.pid() == me));
        assert!(source.total_memory().unwrap() > 0);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn unsupported_platform_fails_enumeration() {
        assert!(matches!(
            SysinfoSource::new().processes(),
            Err(SampleError::Unsupported)
        ));
    }
}
