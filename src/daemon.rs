//! Background process supervision.
//!
//! Standard pid-file daemon control: `start` spawns a detached child and
//! records its pid, `stop` sends SIGTERM and waits, `status` probes the
//! recorded pid. Stale pid files (dead pid, unreadable content) are detected
//! and cleaned up. `start` is idempotent while the recorded pid is alive.
//!
//! Termination between events is safe by construction: pending work lives in
//! the durable event queue and replays on the next start.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Read the recorded pid, or `None` for a missing, empty, or garbled file.
pub fn read_pid(pid_file: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(pid_file).ok()?;
    content.trim().parse::<u32>().ok()
}

/// Probe liveness of `pid` with signal 0.
pub fn is_pid_running(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Spawn `cmd` detached and record its pid.
///
/// If the pid file already names a live process, that pid is returned and
/// nothing is spawned.
pub fn start_background(cmd: &[String], pid_file: &Path) -> Result<u32> {
    if let Some(pid) = read_pid(pid_file) {
        if is_pid_running(pid) {
            return Ok(pid);
        }
    }

    let (program, args) = cmd
        .split_first()
        .context("Daemon command must not be empty")?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let pid = child.id();
    if let Some(parent) = pid_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(pid_file, format!("{}\n", pid))
        .with_context(|| format!("Failed to write {}", pid_file.display()))?;

    Ok(pid)
}

/// Stop the recorded process with SIGTERM, waiting up to `timeout_s`.
///
/// Returns whether a live process was stopped. A stale pid file is removed
/// either way.
pub fn stop_background(pid_file: &Path, timeout_s: f64) -> Result<bool> {
    let pid = match read_pid(pid_file) {
        Some(pid) => pid,
        None => return Ok(false),
    };

    if !is_pid_running(pid) {
        let _ = std::fs::remove_file(pid_file);
        return Ok(false);
    }

    Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Failed to signal daemon")?;

    let deadline = Instant::now() + Duration::from_secs_f64(timeout_s.max(0.0));
    while is_pid_running(pid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    let _ = std::fs::remove_file(pid_file);
    Ok(true)
}

/// `(running, pid)` for the recorded process.
pub fn status_background(pid_file: &Path) -> (bool, Option<u32>) {
    match read_pid(pid_file) {
        Some(pid) => (is_pid_running(pid), Some(pid)),
        None => (false, None),
    }
}

/// Stop the recorded process, then start `cmd` fresh.
pub fn restart_background(cmd: &[String], pid_file: &Path, timeout_s: f64) -> Result<u32> {
    stop_background(pid_file, timeout_s)?;
    start_background(cmd, pid_file)
}
