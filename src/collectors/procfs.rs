//! Linux `/proc` facts sysinfo does not expose: cumulative CPU time, descriptor count, tgids.

use std::collections::HashSet;
use std::time::Duration;

use procfs::process::{all_processes, Process};
use procfs::ProcResult;

/// Pids listed in `/proc`. Thread ids are reachable under `/proc` but never listed.
pub fn thread_group_leaders() -> ProcResult<HashSet<u32>> {
    let mut pids = HashSet::new();
    // Entries that vanish between readdir and open are simply absent.
    for proc_ in all_processes()?.flatten() {
        if let Ok(pid) = u32::try_from(proc_.pid()) {
            pids.insert(pid);
        }
    }
    Ok(pids)
}

/// Cumulative user + system CPU time of `pid`.
pub fn cpu_time(pid: u32) -> ProcResult<Duration> {
    let stat = Process::new(pid as i32)?.stat()?;
    Ok(ticks_to_duration(
        stat.utime + stat.stime,
        procfs::ticks_per_second(),
    ))
}

/// Number of open file descriptors of `pid`.
pub fn open_fds(pid: u32) -> ProcResult<u64> {
    Ok(Process::new(pid as i32)?.fd_count()? as u64)
}

fn ticks_to_duration(ticks: u64, per_second: u64) -> Duration {
    let per_second = per_second.max(1);
    let secs = ticks / per_second;
    let rem = ticks % per_second;
    Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / per_second)
}
