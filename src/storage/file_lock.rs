use std::fs::File;
use std::path::Path;
use crate::core::error::{Error, ErrorKind, Result};

/// Exclusive advisory lock held on an open index file
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    pub fn acquire(file: &File, path: &Path) -> Result<Self> {
        let file = file.try_clone()?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    return Err(Error {
                        kind: ErrorKind::Io,
                        context: format!("Index file {} is locked by another process", path.display()),
                    });
                }
            }
        }

        #[cfg(not(unix))]
        let _ = path;

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
