/// Bridge state bookkeeping
///
/// Everything here lives under the bridge's single mutex. Nothing in this
/// module calls out to the engine or the application.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use bytes::Bytes;
use crate::{
    engine::EngineSocket,
    error::CloseCode,
    framing::Framing,
};

/// Lifecycle of one bridged connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Created, the engine has not asked to open yet
    Unopened,
    /// `connection.open` issued, completion outstanding
    Opening,
    /// Open and passing data
    Open,
    /// A close was initiated, its completion is outstanding
    ClosePending,
    /// Terminal; every further call is a no-op
    Closed,
}

impl BridgeState {
    pub fn is_closed(&self) -> bool {
        matches!(self, BridgeState::Closed)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Unopened => "unopened",
            BridgeState::Opening => "opening",
            BridgeState::Open => "open",
            BridgeState::ClosePending => "close-pending",
            BridgeState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A notification owed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCall {
    HttpResponse(u16),
    Opened,
    CompletedWrite(usize),
    Received(Bytes),
    CloseRequested { code: CloseCode, message: String },
    Closed { domain: i32, code: i32, message: String },
}

impl EngineCall {
    pub(crate) fn deliver(self, socket: &dyn EngineSocket) {
        match self {
            EngineCall::HttpResponse(status) => socket.got_http_response(status),
            EngineCall::Opened => socket.opened(),
            EngineCall::CompletedWrite(byte_count) => socket.completed_write(byte_count),
            EngineCall::Received(data) => socket.received(data),
            EngineCall::CloseRequested { code, message } => socket.close_requested(code, &message),
            EngineCall::Closed { domain, code, message } => socket.closed(domain, code, &message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    seq: u64,
    len: usize,
    done: bool,
}

/// Orders write acknowledgements.
///
/// Application send completions may arrive in any order; acknowledgements
/// are released strictly in the order the writes were issued.
#[derive(Debug, Default)]
pub(crate) struct WriteLedger {
    next_seq: u64,
    pending: VecDeque<PendingWrite>,
}

impl WriteLedger {
    pub(crate) fn register(&mut self, len: usize) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(PendingWrite { seq, len, done: false });
        seq
    }

    /// Marks `seq` sent and returns the byte counts now releasable, in order
    pub(crate) fn complete(&mut self, seq: u64) -> Vec<usize> {
        if let Some(write) = self.pending.iter_mut().find(|w| w.seq == seq) {
            write.done = true;
        }

        let mut ready = Vec::new();
        while self.pending.front().map_or(false, |w| w.done) {
            if let Some(write) = self.pending.pop_front() {
                ready.push(write.len);
            }
        }
        ready
    }

    /// Forgets every outstanding write, returning how many there were
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

/// State guarded by the bridge mutex
pub(crate) struct BridgeCore {
    pub(crate) state: BridgeState,
    pub(crate) framing: Framing,
    pub(crate) response_sent: bool,
    /// `connection.close` has been issued
    pub(crate) connection_closing: bool,
    /// A close request was synthesized for the engine
    pub(crate) close_requested: bool,
    pub(crate) ledger: WriteLedger,
    pub(crate) socket: Option<Arc<dyn EngineSocket>>,
    outbox: VecDeque<EngineCall>,
    sealed: bool,
    pub(crate) draining: bool,
}

impl BridgeCore {
    pub(crate) fn new(framing: Framing) -> Self {
        Self {
            state: BridgeState::Unopened,
            framing,
            response_sent: false,
            connection_closing: false,
            close_requested: false,
            ledger: WriteLedger::default(),
            socket: None,
            outbox: VecDeque::new(),
            sealed: false,
            draining: false,
        }
    }

    /// Queues a notification for the engine.
    ///
    /// Once `Closed` is queued the outbox is sealed and later calls are
    /// dropped, so the engine never hears from a closed socket.
    pub(crate) fn push(&mut self, call: EngineCall) -> bool {
        if self.sealed {
            return false;
        }
        if matches!(call, EngineCall::Closed { .. }) {
            self.sealed = true;
        }
        self.outbox.push_back(call);
        true
    }

    pub(crate) fn pop(&mut self) -> Option<EngineCall> {
        self.outbox.pop_front()
    }

    /// `Closed` has been queued and delivered
    pub(crate) fn is_finished(&self) -> bool {
        self.sealed && self.outbox.is_empty()
    }

    pub(crate) fn accepts_writes(&self) -> bool {
        matches!(self.state, BridgeState::Opening | BridgeState::Open | BridgeState::ClosePending)
            && !self.connection_closing
    }
}
