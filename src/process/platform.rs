//! Platform specifics for process handling.

/// Exit status reported by the non-graceful kill path.
pub const FORCE_KILL_EXIT_CODE: i32 = 137;

/// Returns the OS suffix used for `command<OS>` configuration keys.
#[must_use]
pub fn os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "Darwin"
    } else if cfg!(target_os = "freebsd") {
        "FreeBSD"
    } else {
        "Linux"
    }
}

/// Terminates the current process immediately, without running any
/// shutdown steps.
pub fn force_kill_current() -> ! {
    tracing::warn!("Force killing process {}", std::process::id());

    #[cfg(unix)]
    {
        // SAFETY: kill(2) on our own pid has no memory-safety preconditions.
        unsafe {
            libc::kill(std::process::id() as libc::pid_t, libc::SIGKILL);
        }
    }

    // Reached on Windows, or if SIGKILL delivery failed.
    std::process::exit(FORCE_KILL_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_name_is_known_suffix() {
        assert!(["Windows", "Darwin", "FreeBSD", "Linux"].contains(&os_name()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_os_name_linux() {
        assert_eq!(os_name(), "Linux");
    }
}
