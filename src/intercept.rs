//! Tunnel intercept loop.
//!
//! One reader pulls packets off the tunnel in arrival order. Each DNS
//! datagram becomes its own task, bounded by a semaphore, and every reply
//! funnels through a single writer task so packets are never interleaved
//! on the outbound stream.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::packet::DnsDatagram;
use crate::resolver::{BlockReason, QueryAction, Resolver};
use crate::stats::Stats;
use crate::store::StoreError;
use crate::upstream::Upstream;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;
pub const DEFAULT_MTU: usize = 1500;

/// Reads packets from a tunnel and answers the DNS ones.
pub struct InterceptLoop {
    resolver: Arc<Resolver>,
    upstream: Arc<dyn Upstream>,
    stats: Arc<Stats>,
    max_in_flight: usize,
    mtu: usize,
}

impl InterceptLoop {
    pub fn new(resolver: Arc<Resolver>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            resolver,
            upstream,
            stats: Arc::new(Stats::new()),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Reload the blocklist snapshot. Safe while queries are in flight.
    pub fn refresh_snapshot(&self) -> Result<usize, StoreError> {
        self.resolver.refresh_snapshot()
    }

    /// Reload the snapshot if the store changed since the last load.
    pub fn refresh_if_changed(&self) -> Result<Option<usize>, StoreError> {
        self.resolver.refresh_if_changed()
    }

    /// Run until the tunnel reaches end of stream or fails.
    ///
    /// On end of stream, queries already dispatched are allowed to finish
    /// and their replies are written before returning. Dropping the
    /// returned future aborts all in-flight work instead.
    pub async fn run<R, W>(&self, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(self.max_in_flight);
        let mut writer_task = tokio::spawn(write_packets(writer, rx));
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut buf = vec![0u8; self.mtu];

        info!(
            "Intercept loop started ({} blocklist entries, max {} in flight)",
            self.resolver.blocked_count(),
            self.max_in_flight
        );

        loop {
            while tasks.try_join_next().is_some() {}

            let len = tokio::select! {
                read = reader.read(&mut buf) => read?,
                written = &mut writer_task => {
                    return match written {
                        Ok(Ok(())) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "tunnel writer stopped")),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(io::Error::other(e)),
                    };
                }
            };

            if len == 0 {
                info!("Tunnel closed");
                break;
            }

            let Some(datagram) = DnsDatagram::decode(&buf[..len]) else {
                continue;
            };

            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(io::Error::other)?;
            let resolver = self.resolver.clone();
            let upstream = self.upstream.clone();
            let stats = self.stats.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let _permit = permit;
                if let Some(packet) = handle_query(datagram, resolver, upstream, &stats).await {
                    let _ = tx.send(packet).await;
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        drop(tx);

        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// Decide one query and build the reply packet, if any.
async fn handle_query(
    datagram: DnsDatagram,
    resolver: Arc<Resolver>,
    upstream: Arc<dyn Upstream>,
    stats: &Stats,
) -> Option<Vec<u8>> {
    let start = Instant::now();

    let decided = tokio::task::spawn_blocking(move || {
        let action = resolver.process_query(&datagram.payload);
        (datagram, action)
    })
    .await;
    let (datagram, action) = match decided {
        Ok(decided) => decided,
        Err(e) => {
            error!("Query decision task failed: {}", e);
            return None;
        }
    };

    match action {
        QueryAction::Drop => {
            stats.record_dropped(start.elapsed());
            None
        }
        QueryAction::Blocked {
            response,
            domain,
            reason,
        } => {
            let elapsed = start.elapsed();
            match reason {
                BlockReason::List => stats.record_blocked_by_list(elapsed),
                _ => stats.record_blocked_by_rule(elapsed),
            }
            debug!(
                "{} BLOCKED ({:?}) total={:.3}ms",
                domain,
                reason,
                elapsed.as_secs_f64() * 1000.0
            );
            Some(datagram.reply(&response))
        }
        QueryAction::Forward { domain } => {
            let upstream_start = Instant::now();
            match upstream.forward(&datagram.payload).await {
                Some(reply) => {
                    let elapsed = start.elapsed();
                    stats.record_forwarded(elapsed);
                    debug!(
                        "{} FORWARDED total={:.3}ms upstream={:.3}ms",
                        domain,
                        elapsed.as_secs_f64() * 1000.0,
                        upstream_start.elapsed().as_secs_f64() * 1000.0
                    );
                    Some(datagram.reply(&reply))
                }
                None => {
                    stats.record_upstream_failure(start.elapsed());
                    debug!("{} DROPPED (no upstream reply)", domain);
                    None
                }
            }
        }
    }
}

/// Sole owner of the tunnel's outbound side.
async fn write_packets<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        writer.write_all(&packet).await?;
        writer.flush().await?;
    }
    Ok(())
}
