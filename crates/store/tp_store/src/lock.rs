//! Advisory exclusive file lock, blocking until acquired.
//!
//! Serializes cache population across processes sharing the same source
//! directory: builders and readers both wait on the same lock so nobody can
//! observe a half-written archive.

#![allow(unsafe_code)] // flock(2) has no safe stdlib equivalent

use std::fs::OpenOptions;
use std::path::Path;

pub struct FileLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: std::fs::File,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is held.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // advisory lock only; keep any contents
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd as _;
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        // On non-unix we just hold the file handle open.

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd as _;
            // Best-effort unlock.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // Do NOT remove the lock file: a waiter may already hold an fd to it,
        // and removal would let a newcomer lock a fresh file concurrently.
    }
}
