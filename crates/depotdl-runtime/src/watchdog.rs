//! Worker-side parent liveness watchdog.
//!
//! A worker whose supervisor died must not keep downloading into the void.
//! The watchdog polls the parent pid and takes down the worker's own
//! process group the moment the parent disappears, so engine children die
//! with it. It is the mirror image of the supervisor-side kill paths; the
//! two are independent and both safe to fire.

#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use depotdl_core::exit_code;

#[cfg(unix)]
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the background task that watches the supervisor.
///
/// On Unix it probes `parent_pid` with a null signal once a second and,
/// when the probe reports the pid gone, SIGKILLs the worker's own process
/// group — the worker is the group leader, so anything the engine spawned
/// dies with it and cannot linger with both sides dead. No equivalent
/// probe is wired up elsewhere; orphaned workers there rely on the
/// supervisor-side `kill_on_drop`.
pub(crate) fn spawn_parent_watchdog(parent_pid: i32) {
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if !parent_alive(parent_pid) {
                    tracing::warn!("parent process {parent_pid} is gone, exiting");
                    crate::shutdown::kill_group(std::process::id());
                    // Only reached if the group signal failed.
                    std::process::exit(exit_code::UNKNOWN_ERROR);
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        let _ = parent_pid;
        tracing::debug!("parent liveness watching is not implemented on this platform");
    }
}

/// Whether `pid` still exists, via the null-signal probe.
#[cfg(unix)]
fn parent_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // EPERM still proves existence; only ESRCH means gone.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
