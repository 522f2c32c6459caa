//! Interactive launch under a pseudo-terminal.
//!
//! ```text
//!  host tty ──raw──► stdin ──► PTY master ──► slave ──► child (setsid, ctty)
//!  host tty ◄────── stdout ◄── PTY master ◄── slave ◄── child
//!  SIGWINCH ──self-pipe──► relay poll ──TIOCSWINSZ──► PTY master
//! ```
//!
//! The relay runs on the calling thread and blocks until the child closes
//! the terminal. Exactly one `SIGWINCH` handler is installed for the life
//! of the child and the previous disposition is restored when the relay
//! ends, whatever the outcome. The handler writes one byte to a pipe the
//! relay polls, so a resize is forwarded immediately even when the signal
//! lands on another thread. Callers on an async runtime should run
//! [`run_attached`] through `spawn_blocking`.

use crate::error::{Error, Result};

#[cfg(unix)]
pub use unix::run_attached;

/// Interactive launch is only available on Unix hosts.
#[cfg(not(unix))]
pub fn run_attached(argv: &[String]) -> Result<i32> {
    let _ = argv;
    Err(Error::Terminal(
        "interactive mode requires a Unix host".to_string(),
    ))
}

#[cfg(unix)]
mod unix {
    use std::io::{self, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};
    use std::sync::atomic::{AtomicI32, Ordering};

    use tracing::{debug, warn};

    use super::{Error, Result};
    use crate::engine::exit_code_from_status;
    use crate::host;

    const RELAY_BUF_SIZE: usize = 8192;

    /// Write end of the resize pipe, or -1 while no handler is installed.
    static WINCH_WAKE_FD: AtomicI32 = AtomicI32::new(-1);

    extern "C" fn on_winch(_signal: libc::c_int) {
        let fd = WINCH_WAKE_FD.load(Ordering::SeqCst);
        if fd >= 0 {
            let byte = 1u8;
            // SAFETY: write is async-signal-safe; the pipe is non-blocking, so
            // a full pipe drops the byte while a wakeup is already pending.
            unsafe {
                libc::write(fd, (&byte as *const u8).cast(), 1);
            }
        }
    }

    /// Spawns `argv` on a fresh pseudo-terminal and relays I/O until the
    /// child exits.
    ///
    /// Returns the child's exit code, or `128 + n` when killed by signal `n`.
    ///
    /// # Errors
    ///
    /// - [`Error::Spawn`] if the program cannot be started
    /// - [`Error::Terminal`] if the PTY cannot be set up or relayed
    pub fn run_attached(argv: &[String]) -> Result<i32> {
        let Some((program, rest)) = argv.split_first() else {
            return Err(Error::Spawn {
                program: String::new(),
                reason: "empty command".to_string(),
            });
        };

        let (master, slave) = open_pty()?;
        let winsize = WinsizePassthrough::install(master.as_raw_fd());

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::from(clone_fd(&slave)?))
            .stdout(Stdio::from(clone_fd(&slave)?))
            .stderr(Stdio::from(clone_fd(&slave)?));

        // SAFETY: only async-signal-safe calls run between fork and exec.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|e| Error::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;
        drop(command);
        drop(slave);
        debug!(program = %program, pid = child.id(), "Spawned attached child");

        let relay_result = {
            let _raw = RawModeGuard::enter(libc::STDIN_FILENO);
            relay(master.as_raw_fd(), winsize.as_ref())
        };
        drop(winsize);

        let status = child
            .wait()
            .map_err(|e| Error::Terminal(format!("failed to wait for child: {e}")))?;
        relay_result?;
        Ok(exit_code_from_status(status))
    }

    fn open_pty() -> Result<(OwnedFd, OwnedFd)> {
        let mut master: RawFd = -1;
        let mut slave: RawFd = -1;
        // SAFETY: out-pointers are valid; name, termios and winsize are optional.
        let rc = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut::<libc::termios>() as _,
                std::ptr::null_mut::<libc::winsize>() as _,
            )
        };
        if rc != 0 {
            return Err(Error::Terminal(format!(
                "openpty failed: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: openpty returned two fresh descriptors we now own.
        let (master, slave) = unsafe { (OwnedFd::from_raw_fd(master), OwnedFd::from_raw_fd(slave)) };
        set_cloexec(master.as_raw_fd())?;
        set_cloexec(slave.as_raw_fd())?;
        Ok((master, slave))
    }

    fn set_cloexec(fd: RawFd) -> Result<()> {
        // SAFETY: fd is open for the duration of the call.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        if rc == -1 {
            return Err(Error::Terminal(format!(
                "fcntl(FD_CLOEXEC) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn clone_fd(fd: &OwnedFd) -> Result<OwnedFd> {
        fd.try_clone()
            .map_err(|e| Error::Terminal(format!("failed to duplicate pty: {e}")))
    }

    /// Copies I/O between the host and the PTY master until the master
    /// reports end of file or `EIO` (all slave ends closed).
    fn relay(master: RawFd, winsize: Option<&WinsizePassthrough>) -> Result<()> {
        let mut buf = [0u8; RELAY_BUF_SIZE];
        let mut stdin_open = true;
        let mut stdout = io::stdout().lock();

        loop {
            let mut fds = [
                libc::pollfd {
                    fd: master,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: if stdin_open { libc::STDIN_FILENO } else { -1 },
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: winsize.map_or(-1, WinsizePassthrough::wake_fd),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            // Negative descriptors are ignored by poll.
            // SAFETY: fds is a valid array of fds.len() entries.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Terminal(format!("poll failed: {err}")));
            }

            if let Some(ws) = winsize
                && fds[2].revents & libc::POLLIN != 0
            {
                ws.drain();
                ws.forward();
            }

            let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
            if fds[0].revents & ready != 0 {
                match read_fd(master, &mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        stdout
                            .write_all(&buf[..n])
                            .and_then(|()| stdout.flush())
                            .map_err(|e| Error::Terminal(format!("failed to write output: {e}")))?;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    // EIO: the child side of the terminal is gone.
                    Err(e) if e.raw_os_error() == Some(libc::EIO) => return Ok(()),
                    Err(e) => return Err(Error::Terminal(format!("failed to read pty: {e}"))),
                }
            }

            if stdin_open && fds[1].revents & ready != 0 {
                match read_fd(libc::STDIN_FILENO, &mut buf) {
                    Ok(0) => stdin_open = false,
                    Ok(n) => write_all_fd(master, &buf[..n])
                        .map_err(|e| Error::Terminal(format!("failed to write pty: {e}")))?,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(error = %e, "Stopped reading stdin");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for writes of buf.len() bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn write_all_fd(fd: RawFd, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            // SAFETY: data is valid for reads of data.len() bytes.
            let n = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            data = &data[n as usize..];
        }
        Ok(())
    }

    // =========================================================================
    // Raw Mode
    // =========================================================================

    /// Puts a terminal into raw mode and restores it on drop.
    struct RawModeGuard {
        fd: RawFd,
        saved: libc::termios,
    }

    impl RawModeGuard {
        /// Returns `None` when `fd` is not a terminal.
        fn enter(fd: RawFd) -> Option<Self> {
            // SAFETY: isatty only inspects the descriptor.
            if unsafe { libc::isatty(fd) } != 1 {
                return None;
            }
            // SAFETY: termios is plain old data filled in by tcgetattr.
            let mut saved: libc::termios = unsafe { std::mem::zeroed() };
            if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
                warn!("tcgetattr failed, leaving terminal mode unchanged");
                return None;
            }
            let mut raw = saved;
            // SAFETY: raw is a valid termios copy.
            unsafe {
                libc::cfmakeraw(&mut raw);
                if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
                    warn!("tcsetattr failed, leaving terminal mode unchanged");
                    return None;
                }
            }
            Some(Self { fd, saved })
        }
    }

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            // SAFETY: restores the attributes captured in enter().
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
            }
        }
    }

    // =========================================================================
    // Window Size Passthrough
    // =========================================================================

    /// Forwards host window-size changes to the PTY.
    ///
    /// Active only while host stdout is a terminal. Installs the `SIGWINCH`
    /// handler and its wake pipe on creation and restores the previous
    /// disposition on drop.
    struct WinsizePassthrough {
        master: RawFd,
        wake_read: OwnedFd,
        wake_write: OwnedFd,
        previous: libc::sigaction,
    }

    impl WinsizePassthrough {
        fn install(master: RawFd) -> Option<Self> {
            if !host::stdout_is_terminal() {
                debug!("stdout is not a terminal, window size passthrough disabled");
                return None;
            }
            let guard = Self::install_handler(master)?;
            guard.forward();
            Some(guard)
        }

        /// Creates the wake pipe and installs the handler, without the
        /// terminal check or the initial size copy.
        fn install_handler(master: RawFd) -> Option<Self> {
            let (wake_read, wake_write) = match wake_pipe() {
                Ok(pipe) => pipe,
                Err(e) => {
                    warn!(error = %e, "failed to create SIGWINCH wake pipe");
                    return None;
                }
            };
            WINCH_WAKE_FD.store(wake_write.as_raw_fd(), Ordering::SeqCst);

            // SAFETY: sigaction structs are plain old data; the handler only
            // calls write on a descriptor this guard keeps open.
            let previous = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_winch as extern "C" fn(libc::c_int) as usize;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);
                let mut previous: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(libc::SIGWINCH, &action, &mut previous) != 0 {
                    WINCH_WAKE_FD.store(-1, Ordering::SeqCst);
                    warn!("failed to install SIGWINCH handler");
                    return None;
                }
                previous
            };

            Some(Self {
                master,
                wake_read,
                wake_write,
                previous,
            })
        }

        fn wake_fd(&self) -> RawFd {
            self.wake_read.as_raw_fd()
        }

        /// Empties the wake pipe; one forward covers every pending resize.
        fn drain(&self) {
            let mut buf = [0u8; 64];
            while matches!(read_fd(self.wake_fd(), &mut buf), Ok(n) if n > 0) {}
        }

        /// Copies the host window size onto the PTY.
        fn forward(&self) {
            // SAFETY: winsize is plain old data filled in by the ioctl.
            unsafe {
                let mut size: libc::winsize = std::mem::zeroed();
                if libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut size) == 0 {
                    libc::ioctl(self.master, libc::TIOCSWINSZ, &size);
                }
            }
        }
    }

    impl Drop for WinsizePassthrough {
        fn drop(&mut self) {
            // SAFETY: restores the disposition captured in install_handler().
            unsafe {
                libc::sigaction(libc::SIGWINCH, &self.previous, std::ptr::null_mut());
            }
            // The write end closes after this, once no handler can use it.
            let _ = WINCH_WAKE_FD.compare_exchange(
                self.wake_write.as_raw_fd(),
                -1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    /// Non-blocking, close-on-exec pipe `(read, write)`.
    fn wake_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds: [RawFd; 2] = [-1, -1];
        // SAFETY: fds has room for the two descriptors pipe fills in.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe returned two fresh descriptors we now own.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            // SAFETY: fd is open for the duration of the calls.
            let ok = unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                flags != -1
                    && libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) != -1
                    && libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) != -1
            };
            if !ok {
                return Err(io::Error::last_os_error());
            }
        }
        Ok((read, write))
    }

    #[cfg(test)]
    mod tests {
        use std::sync::Mutex;
        use std::time::Duration;

        use super::*;

        // Every test here touches the process-wide SIGWINCH disposition.
        static SIGNAL_STATE: Mutex<()> = Mutex::new(());

        fn winch_handler() -> libc::sighandler_t {
            // SAFETY: a null new action only queries the current one.
            unsafe {
                let mut current: libc::sigaction = std::mem::zeroed();
                libc::sigaction(libc::SIGWINCH, std::ptr::null(), &mut current);
                current.sa_sigaction
            }
        }

        fn sh(script: &str) -> Vec<String> {
            vec!["sh".to_string(), "-c".to_string(), script.to_string()]
        }

        #[test]
        fn test_exit_code_propagates() {
            let _state = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            assert_eq!(run_attached(&sh("exit 3")).unwrap(), 3);
        }

        #[test]
        fn test_missing_program_is_spawn_error() {
            let _state = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            let argv = vec!["/nonexistent/dockhand-test-binary".to_string()];
            assert!(matches!(run_attached(&argv), Err(Error::Spawn { .. })));
        }

        #[test]
        fn test_empty_argv_rejected() {
            assert!(matches!(run_attached(&[]), Err(Error::Spawn { .. })));
        }

        #[test]
        fn test_winch_disposition_unchanged_after_run() {
            let _state = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            let before = winch_handler();

            assert_eq!(run_attached(&sh("exit 0")).unwrap(), 0);

            assert_eq!(winch_handler(), before);
            assert_eq!(WINCH_WAKE_FD.load(Ordering::SeqCst), -1);
        }

        #[test]
        fn test_handler_installed_then_restored() {
            let _state = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            let before = winch_handler();
            let (master, _slave) = open_pty().unwrap();

            let guard = WinsizePassthrough::install_handler(master.as_raw_fd()).unwrap();
            assert_eq!(
                winch_handler(),
                on_winch as extern "C" fn(libc::c_int) as libc::sighandler_t
            );
            assert!(WINCH_WAKE_FD.load(Ordering::SeqCst) >= 0);

            drop(guard);
            assert_eq!(winch_handler(), before);
            assert_eq!(WINCH_WAKE_FD.load(Ordering::SeqCst), -1);
        }

        #[test]
        fn test_resize_wakes_poll_on_another_thread() {
            let _state = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            let (master, _slave) = open_pty().unwrap();
            let guard = WinsizePassthrough::install_handler(master.as_raw_fd()).unwrap();
            let wake = guard.wake_fd();

            let waiter = std::thread::spawn(move || {
                let mut fds = [libc::pollfd {
                    fd: wake,
                    events: libc::POLLIN,
                    revents: 0,
                }];
                loop {
                    // SAFETY: fds is a valid one-element array.
                    let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 5_000) };
                    if rc == -1 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return rc;
                }
            });
            std::thread::sleep(Duration::from_millis(50));
            // SAFETY: SIGWINCH is handled by on_winch while the guard lives.
            unsafe {
                libc::kill(libc::getpid(), libc::SIGWINCH);
            }

            assert_eq!(waiter.join().unwrap(), 1, "poll should wake on resize");
            guard.drain();
            drop(guard);
        }
    }
}
