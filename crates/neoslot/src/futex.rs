//! # Futex
//!
//! Thread-level wait/notify on a single `AtomicU32`.
//!
//! On Linux this is the `futex` syscall (private variant, since both sides of a
//! slot live in one address space). Everywhere else a polling fallback re-checks
//! the word with a short sleep, which keeps the same contract at a higher wakeup
//! latency.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Blocks while `*word == expected`, for at most `timeout`.
///
/// May return early (spurious wakeup, signal, value already changed). Callers
/// must re-check their condition in a loop.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: d.subsec_nanos() as _,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // EAGAIN (value already changed), EINTR and ETIMEDOUT all mean "re-check".
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            ts_ptr,
        );
    }
}

/// Wakes every thread blocked in [`futex_wait`] on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
        );
    }
}

#[cfg(not(target_os = "linux"))]
const POLL_INTERVAL: Duration = Duration::from_micros(50);

#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    use std::sync::atomic::Ordering;

    if word.load(Ordering::Acquire) != expected {
        return;
    }
    let nap = timeout.map_or(POLL_INTERVAL, |t| t.min(POLL_INTERVAL));
    std::thread::sleep(nap);
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_word: &AtomicU32) {
    // pollers notice the store on their next check
}
