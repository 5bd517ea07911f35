//! Stdout-backed terminal.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::core::terminal::Terminal;

#[cfg(unix)]
use libc::{self, c_int};

const FALLBACK_COLUMNS: u16 = 80;
const FALLBACK_ROWS: u16 = 24;

#[cfg(unix)]
fn wait_writable(fd: c_int) -> std::io::Result<()> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, -1) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if result == 0 {
            continue;
        }
        if (fds.revents & libc::POLLOUT) != 0 {
            return Ok(());
        }

        return Err(std::io::Error::other(format!(
            "poll(POLLOUT) returned revents=0x{:x}",
            fds.revents
        )));
    }
}

#[cfg(unix)]
fn write_all_fd_with<FWrite, FWait>(
    fd: c_int,
    bytes: &[u8],
    mut write_once: FWrite,
    mut wait_writable: FWait,
) -> std::io::Result<()>
where
    FWrite: FnMut(c_int, &[u8]) -> std::io::Result<usize>,
    FWait: FnMut(c_int) -> std::io::Result<()>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(fd, &bytes[written..]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write returned 0",
                ));
            }
            Ok(count) => {
                let remaining = bytes.len() - written;
                if count > remaining {
                    return Err(std::io::Error::other(
                        "write returned more bytes than requested",
                    ));
                }
                written += count;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                wait_writable(fd)?;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_fd(fd: c_int, data: &str) -> std::io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    write_all_fd_with(
        fd,
        data.as_bytes(),
        |fd, buf| {
            let result = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
            if result < 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(result as usize)
            }
        },
        wait_writable,
    )
}

#[cfg(unix)]
fn read_winsize(fd: c_int) -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(not(unix))]
fn read_winsize() -> Option<(u16, u16)> {
    None
}

/// Terminal writing to the process's stdout.
///
/// Dimensions are read on every call so a resize between redraws is picked
/// up; when stdout is not a tty they fall back to 80x24.
#[derive(Debug, Default)]
pub struct ProcessTerminal {
    write_log_path: Option<PathBuf>,
    write_log_failed: bool,
    write_failed: bool,
}

impl ProcessTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors every write into `path`, for debugging redraw output.
    pub fn with_write_log(mut self, path: Option<PathBuf>) -> Self {
        self.write_log_path = path;
        self
    }

    fn dimensions(&self) -> Option<(u16, u16)> {
        #[cfg(unix)]
        {
            read_winsize(libc::STDOUT_FILENO)
        }
        #[cfg(not(unix))]
        {
            read_winsize()
        }
    }

    fn write_stdout(&self, data: &str) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            write_fd(libc::STDOUT_FILENO, data)
        }
        #[cfg(not(unix))]
        {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data.as_bytes())?;
            stdout.flush()
        }
    }

    fn log_write(&mut self, data: &str) {
        if self.write_log_failed {
            return;
        }
        let Some(path) = self.write_log_path.as_ref() else {
            return;
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(data.as_bytes()));
        if let Err(error) = result {
            tracing::warn!(path = %path.display(), %error, "disabling terminal write log");
            self.write_log_failed = true;
        }
    }
}

impl Terminal for ProcessTerminal {
    fn write(&mut self, data: &str) {
        if let Err(error) = self.write_stdout(data) {
            if !self.write_failed {
                tracing::error!(%error, "failed to write to terminal");
                self.write_failed = true;
            }
        }
        self.log_write(data);
    }

    fn columns(&self) -> u16 {
        self.dimensions()
            .map(|(cols, _)| cols)
            .unwrap_or(FALLBACK_COLUMNS)
    }

    fn rows(&self) -> u16 {
        self.dimensions()
            .map(|(_, rows)| rows)
            .unwrap_or(FALLBACK_ROWS)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::write_all_fd_with;
    use std::io;

    #[test]
    fn write_all_fd_with_retries_on_eintr_and_writes_all_bytes() {
        let data = b"hello";
        let mut out = Vec::new();
        let mut calls = 0;
        write_all_fd_with(
            1,
            data,
            |_, buf| {
                calls += 1;
                match calls {
                    1 => Err(io::Error::from(io::ErrorKind::Interrupted)),
                    2 => {
                        out.extend_from_slice(&buf[..2]);
                        Ok(2)
                    }
                    _ => {
                        out.extend_from_slice(buf);
                        Ok(buf.len())
                    }
                }
            },
            |_| unreachable!("wait_writable should not be called for EINTR"),
        )
        .expect("write_all_fd_with failed");

        assert_eq!(out, data);
    }

    #[test]
    fn write_all_fd_with_waits_for_writable_on_would_block_and_retries() {
        let data = b"xyz";
        let mut out = Vec::new();
        let mut calls = 0;
        let events = std::cell::RefCell::new(Vec::new());
        write_all_fd_with(
            1,
            data,
            |_, buf| {
                events.borrow_mut().push("write");
                calls += 1;
                if calls == 1 {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                out.extend_from_slice(buf);
                Ok(buf.len())
            },
            |_| {
                events.borrow_mut().push("wait");
                Ok(())
            },
        )
        .expect("write_all_fd_with failed");

        assert_eq!(out, data);
        assert_eq!(events.into_inner(), vec!["write", "wait", "write"]);
    }

    #[test]
    fn zero_length_write_is_an_error() {
        let err = write_all_fd_with(1, b"a", |_, _| Ok(0), |_| Ok(()))
            .expect_err("zero write should fail");
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
