//! Forceful teardown of a worker and everything it spawned.

use std::io;

use tokio::process::Child;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;

/// Kill the worker's whole process tree and reap it.
///
/// Workers get no graceful-shutdown phase: by the time this runs the
/// supervisor has already decided the session is over, so the kill must not
/// depend on the worker cooperating.
///
/// # Platform behavior
/// - Unix: SIGKILL to the process group created at spawn, so descendants
///   go down with the worker
/// - Windows: `Child::kill`, which cannot reach grandchildren
///
/// Safe to call on a worker that already exited, any number of times.
pub async fn terminate(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            kill_group(pid);
        }
        child.wait().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        match child.kill().await {
            Ok(()) => Ok(()),
            // kill on an already-exited process reports InvalidInput
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Send SIGKILL to `pid`'s process group, tolerating races with exit.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!("failed to signal worker group {pid}: {e}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;
    use tokio::process::Command;
    use tokio::time::sleep;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_terminate_kills_a_running_worker() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("failed to spawn sleep");

        assert_ok!(terminate(&mut child).await);

        let status = child.wait().await.expect("wait after terminate");
        assert!(!status.success());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_kill_group_reaches_descendants() {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        use tokio::io::{AsyncBufReadExt, BufReader};

        // Group leader that reports its child's pid, then waits on it —
        // the shape of a worker whose engine spawned a helper.
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30 & echo $!; wait")
            .stdout(std::process::Stdio::piped())
            .process_group(0)
            .spawn()
            .expect("failed to spawn sh");

        let stdout = child.stdout.take().unwrap();
        let grandchild: i32 = BufReader::new(stdout)
            .lines()
            .next_line()
            .await
            .unwrap()
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        kill_group(child.id().unwrap());
        child.wait().await.unwrap();

        // The grandchild must go down with the group, not survive
        // re-parented to init.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match kill(Pid::from_raw(grandchild), None) {
                Err(Errno::ESRCH) => break,
                _ if zombie(grandchild) => break,
                _ if tokio::time::Instant::now() > deadline => {
                    panic!("grandchild {grandchild} survived the group kill");
                }
                _ => sleep(Duration::from_millis(50)).await,
            }
        }
    }

    /// Whether `pid` is a killed-but-unreaped process.
    #[cfg(unix)]
    fn zombie(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            // State is the first field after the parenthesized comm.
            stat.rsplit(')')
                .next()
                .unwrap_or("")
                .trim_start()
                .starts_with('Z')
        })
    }

    #[tokio::test]
    async fn test_terminate_tolerates_an_exited_worker() {
        let mut child = Command::new("echo")
            .arg("done")
            .stdout(std::process::Stdio::null())
            .spawn()
            .expect("failed to spawn echo");

        // Give it time to exit before tearing it down.
        sleep(Duration::from_millis(100)).await;

        terminate(&mut child).await.expect("terminate after exit");
        terminate(&mut child).await.expect("terminate twice");
    }
}
