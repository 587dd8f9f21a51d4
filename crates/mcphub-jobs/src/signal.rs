//! Process-group signalling for job subprocesses.
//!
//! Each job runs as the leader of its own process group, so signalling the
//! group also reaches anything the command forked.

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> bool {
    // Never signal our own group (pid 0) or init.
    if pid <= 1 {
        return false;
    }
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes plain integers and has no memory-safety requirements.
    unsafe { libc::kill(-pgid, signal) == 0 }
}

/// Ask the job's process group to exit.
#[cfg(unix)]
pub(crate) fn terminate(pid: u32) -> bool {
    signal_group(pid, libc::SIGTERM)
}

/// Kill the job's process group.
#[cfg(unix)]
pub(crate) fn kill(pid: u32) -> bool {
    signal_group(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
pub(crate) fn terminate(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub(crate) fn kill(_pid: u32) -> bool {
    false
}
