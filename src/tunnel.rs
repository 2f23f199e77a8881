//! Tunnel descriptor I/O.
//!
//! The platform hands over an already configured tun descriptor. It is
//! switched to non-blocking mode and driven through the reactor, so a
//! pending read is just a registered interest: dropping it on shutdown
//! does not leave a thread parked in `read(2)`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A packet-oriented tunnel descriptor. Each read yields one packet and
/// each write sends one.
pub struct Tunnel {
    inner: AsyncFd<File>,
}

impl Tunnel {
    /// Take over an open descriptor.
    pub fn new(file: File) -> io::Result<Self> {
        set_nonblocking(file.as_raw_fd())?;
        Ok(Self {
            inner: AsyncFd::new(file)?,
        })
    }

    /// # Safety
    ///
    /// `fd` must be an open descriptor that nothing else owns or closes.
    pub unsafe fn from_raw_fd(fd: RawFd) -> io::Result<Self> {
        // SAFETY: ownership is transferred by the caller.
        Self::new(unsafe { File::from_raw_fd(fd) })
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, with no pointer arguments.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl AsyncRead for Tunnel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for Tunnel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;

            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixDatagram;
    use std::time::{Duration, Instant};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// A datagram socket pair keeps packet boundaries, like a tun device.
    fn tunnel_pair() -> (Tunnel, UnixDatagram) {
        let (ours, peer) = UnixDatagram::pair().unwrap();
        let file = File::from(OwnedFd::from(ours));
        (Tunnel::new(file).unwrap(), peer)
    }

    #[tokio::test]
    async fn reads_and_writes_whole_packets() {
        let (mut tunnel, peer) = tunnel_pair();

        peer.send(b"first").unwrap();
        peer.send(b"second").unwrap();

        let mut buf = [0u8; 64];
        let len = tunnel.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"first");
        let len = tunnel.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"second");

        tunnel.write_all(b"reply").await.unwrap();
        let len = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"reply");
    }

    #[test]
    fn pending_read_does_not_hold_up_runtime_shutdown() {
        let (ours, _peer) = UnixDatagram::pair().unwrap();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut tunnel = Tunnel::new(File::from(OwnedFd::from(ours))).unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                let _ = tunnel.read(&mut buf).await;
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
