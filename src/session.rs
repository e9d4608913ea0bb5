
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::frame::{self, Flag, StreamId};
use crate::stream::Stream;

type StreamKey = (StreamId, u32);

/// Owns the UDP socket for one client session: a single ephemeral-port
/// socket shared by every open stream, a monotonic `rid` counter, and the
/// registry that the background receive loop demultiplexes frames into.
pub struct Session {
    socket: Arc<UdpSocket>,
    mtu: usize,
    next_rid: AtomicU32,
    streams: Mutex<HashMap<StreamKey, Arc<Stream>>>,
    shutdown: CancellationToken,
}

impl Session {
    /// Binds an ephemeral local socket, connects it to `config`'s remote
    /// endpoint, and spawns the background receive loop. Returned wrapped in
    /// an `Arc` because streams created by this session hold a `Weak`
    /// back-reference to it.
    pub async fn connect(config: &ClientConfig) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let remote: SocketAddr = config
            .remote_addr()
            .parse()
            .map_err(|e| Error::Other(format!("invalid remote address: {e}")))?;
        socket.connect(remote).await?;
        log::debug!("session bound to {}, remote {}", socket.local_addr()?, remote);

        let session = Arc::new(Session {
            socket: Arc::new(socket),
            mtu: config.mtu,
            next_rid: AtomicU32::new(0),
            streams: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        Arc::clone(&session).spawn_receive_loop();
        Ok(session)
    }

    fn spawn_receive_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; self.mtu];
            loop {
                tokio::select! {
                    biased;

                    _ = self.shutdown.cancelled() => {
                        log::debug!("session receive loop cancelled");
                        break;
                    }
                    result = self.socket.recv(&mut buf) => {
                        match result {
                            Ok(n) => self.route(&buf[..n]).await,
                            Err(err) => {
                                log::debug!("session receive loop exiting: {}", err);
                                break;
                            }
                        }
                    }
                }
            }

            let mut streams = self.streams.lock().await;
            for (_, stream) in streams.drain() {
                stream.notify_close();
            }
        });
    }

    async fn route(&self, buf: &[u8]) {
        let header = match frame::Header::parse(buf) {
            Ok(h) => h,
            Err(err) => {
                log::warn!("dropping malformed frame: {}", err);
                return;
            }
        };
        let key = (header.sid(), header.rid());

        match header.flag() {
            Flag::Psh => {
                if header.length() == 0 {
                    return;
                }
                let streams = self.streams.lock().await;
                if let Some(stream) = streams.get(&key) {
                    log::trace!("routing {} byte psh fragment to stream", header.length());
                    stream.push_buffer(buf.to_vec()).await;
                } else {
                    log::trace!("dropping psh for unknown stream");
                }
            }
            Flag::Dne => {
                let streams = self.streams.lock().await;
                if let Some(stream) = streams.get(&key) {
                    log::trace!("dne for stream");
                    stream.notify_done();
                }
            }
            Flag::Fin => {
                let mut streams = self.streams.lock().await;
                if let Some(stream) = streams.remove(&key) {
                    log::debug!("fin for stream, forgetting mapping");
                    stream.notify_close();
                }
            }
            Flag::Syn | Flag::Nop => {
                // Advisory/reserved; the client never reacts to either.
            }
        }
    }

    /// Opens a new stream: generates a random 128-bit sid, allocates the
    /// next `rid`, sends an advisory SYN, registers the stream, and returns
    /// it.
    pub async fn open(self: &Arc<Self>, deadline: Option<Duration>) -> Result<Arc<Stream>> {
        let sid: StreamId = rand::random();
        self.open_keyed(sid, deadline).await
    }

    /// Opens a follow-up stream reusing `existing`'s sid under a fresh rid --
    /// groups a retry or continuation under the same logical conversation.
    /// `deadline` is authoritative for the new stream; a prior stream's
    /// deadline is never extended or inherited.
    pub async fn open_with_existing(
        self: &Arc<Self>,
        existing: &Arc<Stream>,
        deadline: Option<Duration>,
    ) -> Result<Arc<Stream>> {
        self.open_keyed(existing.sid(), deadline).await
    }

    async fn open_keyed(self: &Arc<Self>, sid: StreamId, deadline: Option<Duration>) -> Result<Arc<Stream>> {
        let rid = self.next_rid.fetch_add(1, Ordering::Relaxed);
        self.write_frame(Flag::Syn, sid, rid, 0, &[]).await?;

        let max_fragment = self.mtu - frame::HEADER_SIZE;
        let stream = Arc::new(Stream::new(Arc::downgrade(self), sid, rid, max_fragment, deadline));
        self.streams.lock().await.insert((sid, rid), Arc::clone(&stream));
        log::debug!("opened stream rid={}", rid);
        Ok(stream)
    }

    /// Sends one datagram to the session's remote endpoint.
    pub async fn write_frame(&self, flag: Flag, sid: StreamId, rid: u32, seqid: u16, payload: &[u8]) -> Result<()> {
        let buf = frame::build(flag, sid, rid, seqid, payload)?;
        self.socket.send(&buf).await?;
        Ok(())
    }

    /// Removes a `(sid, rid)` mapping once its stream no longer needs
    /// routing (the caller closed it, or the session already forgot it on
    /// FIN).
    pub(crate) async fn forget(&self, key: StreamKey) {
        self.streams.lock().await.remove(&key);
    }

    /// Stops the receive loop and synthesizes a close on every still
    /// registered stream. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
