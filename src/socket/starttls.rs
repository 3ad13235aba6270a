//! Sequencing of an in-place TLS upgrade relative to in-flight writes.
//!
//! Plaintext already handed to the transport must reach the peer before
//! the handshake starts, and anything written after the upgrade request
//! must travel encrypted. While a flush is running the upgrade is parked
//! and new writes go to the pump's deferred queue; the upgrade fires once
//! that flush drains the primary queue.

use crate::socket::pump::TransmitPump;
use crate::socket::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeAction {
    /// The transport was told to start the handshake.
    Activated,
    /// Parked until the running flush completes.
    Deferred,
}

#[derive(Debug, Default)]
pub struct TlsUpgradeSequencer {
    waiting: bool,
}

impl TlsUpgradeSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while sends must be redirected to the deferred queue.
    pub fn is_deferring(&self) -> bool {
        self.waiting
    }

    pub fn upgrade(
        &mut self,
        pump: &TransmitPump,
        transport: &mut dyn Transport,
        secure: &mut bool,
    ) -> UpgradeAction {
        if pump.is_active() {
            self.waiting = true;
            tracing::debug!("secure upgrade deferred until flush completes");
            return UpgradeAction::Deferred;
        }
        activate(transport, secure);
        UpgradeAction::Activated
    }

    /// Called once a flush leaves the primary queue empty. Activates a
    /// parked upgrade and resumes flushing the deferred writes. Returns
    /// true if a new flush was started.
    pub fn on_drained(
        &mut self,
        pump: &mut TransmitPump,
        transport: &mut dyn Transport,
        secure: &mut bool,
    ) -> bool {
        if !self.waiting {
            return false;
        }
        self.waiting = false;
        activate(transport, secure);
        if pump.has_deferred() {
            pump.promote_deferred();
            return pump.start(transport);
        }
        false
    }

    pub fn reset(&mut self) {
        self.waiting = false;
    }
}

fn activate(transport: &mut dyn Transport, secure: &mut bool) {
    tracing::debug!("activating secure upgrade");
    transport.start_secure_upgrade();
    *secure = true;
}
