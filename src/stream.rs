
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::error::{Error, Result};
use crate::frame::{self, Flag, StreamId};
use crate::session::Session;

/// One logical request/response conversation multiplexed over a session's
/// socket, keyed by `(sid, rid)`.
///
/// Single-producer (the session's receive loop) / single-consumer (the RPC
/// caller). The back-reference to the session is a [`Weak`] pointer -- the
/// session holds the strong `Arc<Stream>` for as long as the stream is
/// registered, so the pair never forms a reference cycle.
pub struct Stream {
    session: Weak<Session>,
    sid: StreamId,
    rid: u32,
    max_fragment: usize,
    deadline: Option<Duration>,
    inbound: Mutex<Vec<Vec<u8>>>,
    notify: Notify,
    done: AtomicBool,
    closed: AtomicBool,
    deadline_expired: AtomicBool,
    deadline_armed: AtomicBool,
}

impl Stream {
    pub(crate) fn new(
        session: Weak<Session>,
        sid: StreamId,
        rid: u32,
        max_fragment: usize,
        deadline: Option<Duration>,
    ) -> Self {
        Stream {
            session,
            sid,
            rid,
            max_fragment,
            deadline,
            inbound: Mutex::new(Vec::new()),
            notify: Notify::new(),
            done: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            deadline_expired: AtomicBool::new(false),
            deadline_armed: AtomicBool::new(false),
        }
    }

    pub fn sid(&self) -> StreamId {
        self.sid
    }

    pub fn rid(&self) -> u32 {
        self.rid
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Splits `payload` into PSH fragments of at most `max_fragment` bytes,
    /// each with a monotonically increasing `seqid` starting at 0, followed
    /// by a single DNE. A zero-length payload emits no PSH frames, only the
    /// terminating DNE.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        let mut seqid: u16 = 0;
        for chunk in payload.chunks(self.max_fragment.max(1)) {
            self.send_frame(Flag::Psh, seqid, chunk).await?;
            seqid = seqid.wrapping_add(1);
        }
        self.send_frame(Flag::Dne, 0, &[]).await
    }

    /// Blocks until a terminating signal (DNE or FIN) is observed, or the
    /// configured deadline fires, then returns the PSH payloads received
    /// since the previous call, concatenated in `seqid` order.
    ///
    /// Takes `self: &Arc<Self>` because a deadline, if configured, is
    /// enforced by a background task that outlives this call and needs its
    /// own strong reference to the stream.
    pub async fn read(self: &Arc<Self>) -> Result<Vec<u8>> {
        self.arm_deadline();

        let mut fragments: Vec<(u16, Vec<u8>)> = Vec::new();
        loop {
            let notified = self.notify.notified();

            {
                let mut q = self.inbound.lock().await;
                fragments.extend(q.drain(..).filter_map(|buf| {
                    frame::Header::parse(&buf)
                        .ok()
                        .map(|h| (h.seqid(), h.payload().to_vec()))
                }));
            }

            if self.deadline_expired.load(Ordering::Acquire) {
                return Err(Error::Timeout);
            }

            if self.done.swap(false, Ordering::AcqRel) {
                return Ok(Self::assemble(fragments));
            }

            if self.closed.load(Ordering::Acquire) {
                return Ok(Self::assemble(fragments));
            }

            notified.await;
        }
    }

    /// Sorts by `seqid` and collapses duplicates, keeping the last-arrived
    /// fragment for any repeated `seqid` -- a later insert into the map
    /// overwrites an earlier one with the same key.
    fn assemble(fragments: Vec<(u16, Vec<u8>)>) -> Vec<u8> {
        let mut by_seqid: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
        for (seq, buf) in fragments {
            by_seqid.insert(seq, buf);
        }
        by_seqid.into_values().flatten().collect()
    }

    fn arm_deadline(self: &Arc<Self>) {
        let deadline = match self.deadline {
            Some(d) => d,
            None => return,
        };
        if self.deadline_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stream = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            stream.deadline_expired.store(true, Ordering::Release);
            stream.notify.notify_waiters();
        });
    }

    fn sid_key(&self) -> (StreamId, u32) {
        (self.sid, self.rid)
    }

    async fn send_frame(&self, flag: Flag, seqid: u16, payload: &[u8]) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::StreamClosed)?;
        session.write_frame(flag, self.sid, self.rid, seqid, payload).await
    }

    /// Session-side: enqueues a received PSH frame's raw bytes (header +
    /// payload) for later reassembly.
    pub(crate) async fn push_buffer(&self, buf: Vec<u8>) {
        self.inbound.lock().await.push(buf);
        self.notify.notify_waiters();
    }

    /// Session-side: signals that the current PSH burst is complete. Level
    /// triggered and re-armed by each `read()` that consumes it, so a
    /// long-lived subscription stream observes one DNE per pushed message.
    pub(crate) fn notify_done(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Session-side: signals that the stream has been torn down (FIN seen,
    /// or the session itself shut down). Terminal -- never re-armed.
    pub(crate) fn notify_close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Client-side: emits a FIN, marks the stream closed, and releases any
    /// blocked reader.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        let result = self.send_frame(Flag::Fin, 0, &[]).await;
        if let Some(session) = self.session.upgrade() {
            session.forget(self.sid_key()).await;
        }
        result
    }
}
