//! Termination-class signals this process reacts to.
//!
//! When wrapping a command they are passed on to the child so the wrapper is
//! invisible to process managers; when reading stdin they end the read loop.

use std::io;

#[cfg(unix)]
pub use unix::TerminationSignals;

#[cfg(not(unix))]
pub use fallback::TerminationSignals;

#[cfg(unix)]
mod unix {
    use std::future::poll_fn;
    use std::io;
    use std::task::Poll;

    use tokio::signal::unix::{signal, Signal, SignalKind};

    const FORWARDED: [libc::c_int; 6] = [
        libc::SIGINT,
        libc::SIGTERM,
        libc::SIGQUIT,
        libc::SIGHUP,
        libc::SIGUSR1,
        libc::SIGUSR2,
    ];

    pub struct TerminationSignals {
        streams: Vec<(i32, Signal)>,
    }

    impl TerminationSignals {
        /// Must be called from within a tokio runtime.
        pub fn install() -> io::Result<Self> {
            let mut streams = Vec::with_capacity(FORWARDED.len());
            for signo in FORWARDED {
                streams.push((signo, signal(SignalKind::from_raw(signo))?));
            }
            Ok(TerminationSignals { streams })
        }

        /// Waits for the next signal and returns its number.
        pub async fn recv(&mut self) -> Option<i32> {
            poll_fn(|cx| {
                let mut open = false;
                for (signo, stream) in self.streams.iter_mut() {
                    match stream.poll_recv(cx) {
                        Poll::Ready(Some(())) => return Poll::Ready(Some(*signo)),
                        Poll::Ready(None) => {}
                        Poll::Pending => open = true,
                    }
                }
                if open {
                    Poll::Pending
                } else {
                    Poll::Ready(None)
                }
            })
            .await
        }
    }

    pub(super) fn send(pid: u32, signo: i32) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, signo) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use std::io;

    pub struct TerminationSignals;

    impl TerminationSignals {
        pub fn install() -> io::Result<Self> {
            Ok(TerminationSignals)
        }

        pub async fn recv(&mut self) -> Option<i32> {
            tokio::signal::ctrl_c().await.ok().map(|_| 2)
        }
    }
}

/// Deliver `signo` to the process `pid`.
#[cfg(unix)]
pub fn forward(pid: u32, signo: i32) -> io::Result<()> {
    unix::send(pid, signo)
}

#[cfg(not(unix))]
pub fn forward(_pid: u32, _signo: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signal forwarding needs a unix platform",
    ))
}
