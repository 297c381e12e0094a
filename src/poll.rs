//! Thin wrapper over `poll(2)` shared by the channel interface and the multiplexer.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Readable (normal or priority data).
pub(crate) const READ_EVENTS: libc::c_short = libc::POLLIN | libc::POLLPRI;
/// Writable.
pub(crate) const WRITE_EVENTS: libc::c_short = libc::POLLOUT;
/// Peer gone or stream in error; reported whether requested or not.
pub(crate) const HANGUP_EVENTS: libc::c_short = libc::POLLHUP | libc::POLLERR;

/// Convert a wait timeout to `poll(2)` milliseconds.
///
/// `None` blocks indefinitely (`-1`). Non-zero durations shorter than a
/// millisecond round up so that they still wait.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) if d.is_zero() => 0,
        Some(d) => d.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int,
    }
}

/// Build a `pollfd` entry.
pub(crate) fn entry(fd: RawFd, events: libc::c_short) -> libc::pollfd {
    libc::pollfd {
        fd,
        events,
        revents: 0,
    }
}

/// Wait until at least one descriptor in `fds` has an event, or the timeout expires.
///
/// Returns the number of descriptors with non-zero `revents`.
pub(crate) fn wait(fds: &mut [libc::pollfd], timeout: Option<Duration>) -> io::Result<usize> {
    // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd for the
    // duration of the call, and its length is passed alongside the pointer.
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout_ms(timeout),
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_micros(10))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(250))), 250);
        assert_eq!(
            timeout_ms(Some(Duration::from_secs(u64::MAX))),
            libc::c_int::MAX
        );
    }

    #[test]
    fn test_wait_empty_set_times_out() {
        let mut fds: Vec<libc::pollfd> = Vec::new();
        assert_eq!(wait(&mut fds, Some(Duration::ZERO)).unwrap(), 0);
    }
}
