//! Mirror stdout and stderr into a log file
//!
//! Each stream is swapped for a pipe whose reader thread copies every chunk
//! into the log and then to the original stream, so the terminal keeps
//! seeing everything.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::constants::logs;

static REDIRECTED: OnceCell<PathBuf> = OnceCell::new();

/// Append-only log that moves itself to `<name>.1` when it grows too big
pub struct RotatingLog {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    size: u64,
}

impl RotatingLog {
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            file,
            size,
        })
    }

    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".1");
        PathBuf::from(name)
    }

    pub fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.size > 0 && self.size + chunk.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(chunk)?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        fs::rename(&self.path, self.rotated_path())?;
        self.file = open_append(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Tee fds 1 and 2 into `log_path`.
///
/// Only the first call redirects; later calls return the path in use.
pub fn redirect_std_out(log_path: &Path) -> Result<PathBuf> {
    REDIRECTED
        .get_or_try_init(|| {
            let log = Arc::new(Mutex::new(RotatingLog::open(log_path, logs::TEE_MAX_BYTES)?));
            tee_fd(libc::STDOUT_FILENO, log.clone())?;
            tee_fd(libc::STDERR_FILENO, log)?;
            Ok::<_, anyhow::Error>(log_path.to_path_buf())
        })
        .cloned()
}

/// Route `target_fd` through a pipe copied into `log` and the original target
fn tee_fd(target_fd: RawFd, log: Arc<Mutex<RotatingLog>>) -> Result<thread::JoinHandle<()>> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    // SAFETY: `fds` has room for the two descriptors pipe() writes
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error()).context("Failed to create pipe");
    }
    let [read_end, write_end] = fds;

    // SAFETY: plain descriptor calls; every failure path closes what was opened
    let original = unsafe { libc::dup(target_fd) };
    if original < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(read_end);
            libc::close(write_end);
        }
        return Err(err).context("Failed to duplicate stream");
    }
    if unsafe { libc::dup2(write_end, target_fd) } < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(read_end);
            libc::close(write_end);
            libc::close(original);
        }
        return Err(err).context("Failed to redirect stream");
    }
    unsafe { libc::close(write_end) };

    // SAFETY: both descriptors were just created and are owned by the thread
    let mut reader = unsafe { File::from_raw_fd(read_end) };
    let mut forward = unsafe { File::from_raw_fd(original) };

    thread::Builder::new()
        .name(format!("herald-tee-{target_fd}"))
        .spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                let n = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                };
                let chunk = &buffer[..n];
                let _ = log.lock().write_all(chunk);
                let _ = forward.write_all(chunk);
            }
        })
        .context("Failed to spawn tee thread")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_rotates_when_full() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("app.log");
        let mut log = RotatingLog::open(&path, 10).unwrap();

        log.write_all(b"12345678").unwrap();
        log.write_all(b"abcd").unwrap();

        assert_eq!(fs::read_to_string(log.rotated_path()).unwrap(), "12345678");
        assert_eq!(fs::read_to_string(&path).unwrap(), "abcd");
    }

    #[test]
    fn test_reopening_continues_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        RotatingLog::open(&path, 10).unwrap().write_all(b"123456").unwrap();

        let mut log = RotatingLog::open(&path, 10).unwrap();
        log.write_all(b"7890x").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "7890x");
    }

    #[test]
    fn test_tee_copies_to_log_and_original() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        let log = Arc::new(Mutex::new(RotatingLog::open(&path, 1024).unwrap()));

        // A pipe stands in for stdout: its write end is the teed stream
        let mut fds: [libc::c_int; 2] = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [sink, target] = fds;

        let handle = tee_fd(target, log).unwrap();
        let mut stream = unsafe { File::from_raw_fd(target) };
        stream.write_all(b"hello\n").unwrap();
        drop(stream);
        handle.join().unwrap();

        let mut forwarded = String::new();
        unsafe { File::from_raw_fd(sink) }
            .read_to_string(&mut forwarded)
            .unwrap();
        assert_eq!(forwarded, "hello\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
