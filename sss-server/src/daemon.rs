//! Detaching from the controlling terminal.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Daemon {
    /// The original process; it should exit with status 0.
    Parent,
    /// The detached child; it carries on serving.
    Child,
}

/// Forks, starts a new session in the child and points its stdio at `/dev/null`.
///
/// Call before any thread is spawned: the child only inherits the calling thread.
pub fn daemonize() -> io::Result<Daemon> {
    // SAFETY: no other threads exist yet, so the child starts from a consistent state.
    match unsafe { libc::fork() } {
        -1 => return Err(io::Error::last_os_error()),
        0 => {}
        _ => return Ok(Daemon::Parent),
    }

    // SAFETY: plain syscall without pointer arguments.
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }

    let devnull = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(devnull.as_raw_fd(), target) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(Daemon::Child)
}
