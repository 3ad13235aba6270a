//! Outbound write queue with a single flush in flight.
//!
//! Chunks accumulate in the queue while a flush is running and are picked
//! up together by the next flush, so the transport only ever sees one
//! outstanding batch and bytes leave in submission order.

use crate::socket::transport::Transport;
use bytes::Bytes;
use std::collections::VecDeque;

/// Buffered byte count above which `send` reports backpressure.
pub const DEFAULT_WATERMARK: usize = 65536;

#[derive(Debug)]
pub struct TransmitPump {
    queue: VecDeque<Bytes>,
    /// Writes held back while a TLS upgrade waits for the current flush.
    deferred: VecDeque<Bytes>,
    /// Bytes queued, deferred, or in flight.
    buffered: usize,
    in_flight: usize,
    active: bool,
    waiting_for_drain: bool,
    watermark: usize,
}

/// What the socket should do after a flush completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// More data was queued; another flush has been started.
    Continued,
    /// The queue is empty.
    Drained,
}

impl Default for TransmitPump {
    fn default() -> Self {
        Self::new(DEFAULT_WATERMARK)
    }
}

impl TransmitPump {
    pub fn new(watermark: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            deferred: VecDeque::new(),
            buffered: 0,
            in_flight: 0,
            active: false,
            waiting_for_drain: false,
            watermark,
        }
    }

    /// Queue `chunk` and return `false` when buffered bytes now exceed the
    /// watermark. In that case a drain notification becomes owed.
    pub fn enqueue(&mut self, chunk: Bytes, deferred: bool) -> bool {
        self.buffered += chunk.len();
        if deferred {
            self.deferred.push_back(chunk);
        } else {
            self.queue.push_back(chunk);
        }
        let under = self.buffered <= self.watermark;
        if !under {
            self.waiting_for_drain = true;
        }
        under
    }

    /// Bytes queued, deferred, or in flight.
    pub fn buffered_amount(&self) -> usize {
        self.buffered
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Start a flush covering everything queued, unless one is already
    /// running or there is nothing to send.
    pub fn start(&mut self, transport: &mut dyn Transport) -> bool {
        if self.active || self.queue.is_empty() {
            return false;
        }
        let batch: Vec<Bytes> = self.queue.drain(..).collect();
        self.in_flight = batch.iter().map(Bytes::len).sum();
        self.active = true;
        tracing::trace!(chunks = batch.len(), bytes = self.in_flight, "flush started");
        transport.write_chunks(batch);
        true
    }

    /// Record completion of the running flush and start the next one if
    /// more data arrived meanwhile.
    pub fn complete(&mut self, transport: &mut dyn Transport) -> FlushOutcome {
        self.active = false;
        self.buffered -= self.in_flight;
        self.in_flight = 0;
        tracing::trace!(buffered = self.buffered_amount(), "flush complete");
        if self.start(transport) {
            FlushOutcome::Continued
        } else {
            FlushOutcome::Drained
        }
    }

    /// Consume the owed drain notification, if any.
    pub fn take_drain_owed(&mut self) -> bool {
        std::mem::take(&mut self.waiting_for_drain)
    }

    /// Move deferred writes onto the primary queue.
    pub fn promote_deferred(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        self.queue.extend(deferred);
    }

    /// Drop every queued and deferred chunk. A running flush is abandoned.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deferred.clear();
        self.buffered = 0;
        self.in_flight = 0;
        self.active = false;
        self.waiting_for_drain = false;
    }
}
