//! Process hardening for a server that holds signing and field keys.
//!
//! Core dumps are disabled before any secret is read, and all pages are
//! pinned with `mlockall` once configuration says that is wanted. Both are
//! no-ops on non-Unix targets.

/// A hardening syscall failed.
#[derive(Debug, thiserror::Error)]
#[error("{call} failed: {source}")]
pub struct HardeningError {
    /// The syscall that failed, as written in C.
    pub call: &'static str,
    #[source]
    pub source: std::io::Error,
}

#[cfg(unix)]
fn check(call: &'static str, rc: libc::c_int) -> Result<(), HardeningError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(HardeningError {
            call,
            source: std::io::Error::last_os_error(),
        })
    }
}

/// Set `RLIMIT_CORE` to 0 so a crash never writes key material to disk.
///
/// # Errors
///
/// Returns [`HardeningError`] if `setrlimit` fails.
#[cfg(unix)]
pub fn disable_core_dumps() -> Result<(), HardeningError> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, initialized `rlimit` that outlives the
    // call. `setrlimit` only reads it.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };
    check("setrlimit(RLIMIT_CORE, 0)", rc)
}

#[cfg(not(unix))]
pub fn disable_core_dumps() -> Result<(), HardeningError> {
    Ok(())
}

/// Pin current and future pages so secrets are never swapped out.
///
/// Needs `CAP_IPC_LOCK` or root on Linux. Set `TRUSTGATE_DISABLE_MLOCK=true`
/// to skip it in development.
///
/// # Errors
///
/// Returns [`HardeningError`] if `mlockall` fails.
#[cfg(unix)]
pub fn lock_memory() -> Result<(), HardeningError> {
    // SAFETY: `mlockall` takes only flags and touches no caller memory.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    check("mlockall(MCL_CURRENT | MCL_FUTURE)", rc)
}

#[cfg(not(unix))]
pub fn lock_memory() -> Result<(), HardeningError> {
    Ok(())
}
