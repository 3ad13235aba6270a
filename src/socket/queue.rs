//! FIFO matching of waiting acceptors against inbound connections.
//!
//! Only acceptors are ever queued. An inbound connection either resolves
//! the oldest live acceptor on arrival or is handed back to the caller to
//! be closed; unmatched connections are never buffered.

use crate::base::classify::ClassifiedError;
use crate::base::error::SocketError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Outcome delivered to an acceptor: a connection, end of sequence
/// (`Ok(None)`), or the error the listener stopped with.
pub type AcceptResult<T> = Result<Option<T>, SocketError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Open,
    Ended,
    Failed(ClassifiedError),
}

impl QueueState {
    fn terminal<T>(&self) -> Option<AcceptResult<T>> {
        match self {
            QueueState::Open => None,
            QueueState::Ended => Some(Ok(None)),
            QueueState::Failed(err) => Some(Err(SocketError::Transport(*err))),
        }
    }
}

struct Inner<T> {
    waiting: VecDeque<oneshot::Sender<AcceptResult<T>>>,
    state: QueueState,
}

pub struct ConnectionQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ConnectionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ConnectionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConnectionQueue")
            .field("waiting", &inner.waiting.len())
            .field("state", &inner.state)
            .finish()
    }
}

impl<T> ConnectionQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                waiting: VecDeque::new(),
                state: QueueState::Open,
            }),
        }
    }

    /// Register an acceptor. Resolves immediately once the queue is closed.
    pub fn request(&self) -> oneshot::Receiver<AcceptResult<T>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let terminal = inner.state.terminal();
        match terminal {
            Some(result) => {
                let _ = tx.send(result);
            }
            None => inner.waiting.push_back(tx),
        }
        rx
    }

    /// Number of acceptors still waiting. Abandoned requests are pruned.
    pub fn waiting(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.waiting.retain(|tx| !tx.is_closed());
        inner.waiting.len()
    }

    /// Hand `conn` to the oldest live acceptor. Returns it back when nobody
    /// is waiting; the caller must close it.
    pub fn connect(&self, conn: T) -> Option<T> {
        let mut inner = self.inner.lock();
        let mut conn = conn;
        while let Some(tx) = inner.waiting.pop_front() {
            if tx.is_closed() {
                continue;
            }
            match tx.send(Ok(Some(conn))) {
                Ok(()) => return None,
                // Receiver went away between the check and the send.
                Err(Ok(Some(returned))) => conn = returned,
                Err(_) => return None,
            }
        }
        Some(conn)
    }

    /// End the sequence for everyone currently waiting without closing the
    /// queue.
    pub fn end_waiting(&self) {
        let waiting = std::mem::take(&mut self.inner.lock().waiting);
        for tx in waiting {
            let _ = tx.send(Ok(None));
        }
    }

    /// Close the queue. Waiting and future acceptors get end of sequence,
    /// or `error` when the listener stopped abnormally. Only the first
    /// close takes effect.
    pub fn close(&self, error: Option<ClassifiedError>) -> bool {
        let waiting = {
            let mut inner = self.inner.lock();
            if inner.state != QueueState::Open {
                return false;
            }
            inner.state = match error {
                Some(err) => QueueState::Failed(err),
                None => QueueState::Ended,
            };
            std::mem::take(&mut inner.waiting)
        };
        for tx in waiting {
            let _ = tx.send(match error {
                Some(err) => Err(SocketError::Transport(err)),
                None => Ok(None),
            });
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().state != QueueState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;

    #[test]
    fn test_fifo_matching() {
        let queue = ConnectionQueue::new();
        let mut first = queue.request();
        let mut second = queue.request();
        assert_eq!(queue.waiting(), 2);

        assert!(queue.connect("a").is_none());
        assert!(queue.connect("b").is_none());
        assert_eq!(first.try_recv().unwrap(), Ok(Some("a")));
        assert_eq!(second.try_recv().unwrap(), Ok(Some("b")));
        assert_eq!(queue.waiting(), 0);
    }

    #[test]
    fn test_no_acceptor_returns_connection() {
        let queue = ConnectionQueue::new();
        assert_eq!(queue.connect("a"), Some("a"));
    }

    #[test]
    fn test_one_acceptor_two_arrivals() {
        let queue = ConnectionQueue::new();
        let mut acceptor = queue.request();
        assert!(queue.connect("a").is_none());
        assert_eq!(queue.connect("b"), Some("b"));
        assert_eq!(acceptor.try_recv().unwrap(), Ok(Some("a")));
    }

    #[test]
    fn test_abandoned_acceptor_is_skipped() {
        let queue = ConnectionQueue::new();
        drop(queue.request());
        let mut live = queue.request();
        assert!(queue.connect("a").is_none());
        assert_eq!(live.try_recv().unwrap(), Ok(Some("a")));
    }

    #[test]
    fn test_clean_close_ends_sequence() {
        let queue = ConnectionQueue::<&str>::new();
        let mut waiting = queue.request();
        assert!(queue.close(None));
        assert_eq!(waiting.try_recv().unwrap(), Ok(None));
        assert_eq!(queue.request().try_recv().unwrap(), Ok(None));
        assert!(!queue.close(Some(NetError::Failed.into())));
    }

    #[test]
    fn test_error_close_rejects() {
        let queue = ConnectionQueue::<&str>::new();
        let mut waiting = queue.request();
        let err = ClassifiedError::from(NetError::ConnectionReset);
        queue.close(Some(err));
        assert_eq!(waiting.try_recv().unwrap(), Err(SocketError::Transport(err)));
        assert!(queue.is_closed());
    }

    #[test]
    fn test_end_waiting_keeps_queue_open() {
        let queue = ConnectionQueue::new();
        let mut waiting = queue.request();
        queue.end_waiting();
        assert_eq!(waiting.try_recv().unwrap(), Ok(None));
        assert!(!queue.is_closed());

        let mut next = queue.request();
        assert!(queue.connect("a").is_none());
        assert_eq!(next.try_recv().unwrap(), Ok(Some("a")));
    }
}
