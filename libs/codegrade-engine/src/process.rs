// Child-process plumbing shared by the compiler and the sandbox
use crate::config::ResourceLimits;
use codegrade_common::config::TRUNCATION_MARKER;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Put the child in a fresh process group so the whole tree can be killed,
/// and make sure a dropped handle never leaves it running.
pub(crate) fn isolate_process_group(cmd: &mut Command) {
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
}

/// SIGKILL every process in the group led by `pid`.
/// ESRCH (group already gone) is not an error.
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let Ok(pgid) = libc::pid_t::try_from(pid) else { return };

    // SAFETY: killpg takes plain integers and touches no memory
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid = pgid, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: Option<u32>) {}

/// Apply resource limits in the child between fork and exec
#[cfg(unix)]
pub(crate) fn apply_resource_limits(cmd: &mut Command, limits: &ResourceLimits) {
    let limits = limits.clone();
    // SAFETY: the closure only calls setrlimit, which is async-signal-safe
    unsafe {
        cmd.pre_exec(move || set_rlimits(&limits));
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_resource_limits(_cmd: &mut Command, _limits: &ResourceLimits) {}

#[cfg(unix)]
fn set_rlimits(limits: &ResourceLimits) -> io::Result<()> {
    const MIB: u64 = 1024 * 1024;

    set_rlimit(libc::RLIMIT_CORE, 0)?;
    if let Some(mb) = limits.memory_limit_mb {
        set_rlimit(libc::RLIMIT_AS, mb.saturating_mul(MIB))?;
    }
    if let Some(secs) = limits.cpu_time_limit_secs {
        set_rlimit(libc::RLIMIT_CPU, secs)?;
    }
    if let Some(mb) = limits.max_file_size_mb {
        set_rlimit(libc::RLIMIT_FSIZE, mb.saturating_mul(MIB))?;
    }
    if let Some(count) = limits.max_processes {
        set_rlimit(libc::RLIMIT_NPROC, count)?;
    }
    Ok(())
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type RlimitResource = libc::c_int;

#[cfg(unix)]
fn set_rlimit(resource: RlimitResource, value: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid, initialized rlimit for the duration of the call
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Drain `reader` to EOF, keeping at most `cap` bytes.
/// Returns the kept bytes and whether anything was dropped.
pub(crate) async fn read_capped<R>(mut reader: R, cap: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        let remaining = cap.saturating_sub(kept.len());
        if n <= remaining {
            kept.extend_from_slice(&chunk[..n]);
        } else {
            kept.extend_from_slice(&chunk[..remaining]);
            truncated = true;
        }
    }

    Ok((kept, truncated))
}

/// Cut `text` to `max_chars` characters, appending the truncation marker
/// when anything was removed
pub(crate) fn cap_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Byte budget that always holds more than `max_chars` UTF-8 characters,
/// so `cap_chars` can still tell whether the cap was exceeded
pub(crate) fn byte_budget_for_chars(max_chars: usize) -> usize {
    max_chars.saturating_add(1).saturating_mul(4)
}
