//! Transfer requests and their bookkeeping while queued on an endpoint.

use heapless::Vec;

use crate::td::TdHandle;
use crate::EpAddr;

/// Longest stretch a single descriptor can carry: the first page pointer may
/// start mid-page, the remaining four cover whole pages.
pub const MAX_TD_BYTES: u32 = 4 * crate::td::PAGE_SIZE;

/// Descriptors chained per scheduling pass. Requests longer than
/// `TD_CHAIN_MAX * MAX_TD_BYTES` are resumed from the transfer-complete
/// interrupt, one pass at a time.
pub(crate) const TD_CHAIN_MAX: usize = 8;

/// Requests that fit on one endpoint queue.
pub(crate) const EP_QUEUE_DEPTH: usize = 8;

/// Outcome of a transfer, reported through the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferStatus {
    /// Not finished yet; only ever seen on a queued request.
    InFlight,
    /// Transferred without error; `actual` holds the byte count.
    Complete,
    /// The endpoint was halted while the transfer was pending.
    Stalled,
    /// Transaction error reported by the controller.
    ProtocolError,
    /// Data-toggle mismatch reported by the controller.
    DataToggleError,
    /// Displaced by a newer request queued on endpoint 0.
    Overflow,
    /// Removed by `ep_dequeue`.
    Cancelled,
    /// Flushed by teardown or a preempting SETUP.
    Shutdown,
}

/// One transfer, described by a device-visible buffer.
///
/// The caller owns the buffer and keeps it valid and untouched until the
/// request comes back through the completion callback. `dma` is the bus
/// address of the buffer (identity-mapped platforms pass the CPU address).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Caller-chosen identity, used to name the request in `ep_dequeue`.
    pub id: u32,
    /// Bus address of the data buffer.
    pub dma: u32,
    /// Bytes to transfer.
    pub length: u32,
    /// Append a zero-length packet when an IN transfer ends on a packet
    /// boundary.
    pub zero: bool,
    /// Bytes actually transferred, filled in on completion.
    pub actual: u32,
    /// Transfer outcome, filled in on completion.
    pub status: XferStatus,
    /// Controller-private word for vendor DMA extensions; carried untouched.
    pub udc_priv: u32,
}

impl Request {
    pub fn new(id: u32, dma: u32, length: u32) -> Request {
        Request {
            id,
            dma,
            length,
            zero: false,
            actual: 0,
            status: XferStatus::InFlight,
            udc_priv: 0,
        }
    }

    pub fn with_zero(mut self) -> Request {
        self.zero = true;
        self
    }
}

/// A descriptor currently carrying part of a queued request, with the byte
/// count it was programmed for (needed to compute `actual` when it retires).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TdEntry {
    pub handle: TdHandle,
    pub len: u32,
}

/// A request sitting on an endpoint queue, with its descriptor chain and the
/// progress cursor for multi-pass (oversized) transfers.
pub(crate) struct QueuedRequest {
    pub req: Request,
    pub kind: CompletionKind,
    pub tds: Vec<TdEntry, TD_CHAIN_MAX>,
    /// Bytes handed to hardware so far across all passes, including the
    /// chain currently in flight.
    pub scheduled: u32,
    /// Bytes confirmed transferred by retired passes.
    pub done: u32,
}

impl QueuedRequest {
    pub(crate) fn new(req: Request) -> QueuedRequest {
        QueuedRequest {
            req,
            kind: CompletionKind::Driver,
            tds: Vec::new(),
            scheduled: 0,
            done: 0,
        }
    }

    /// True when the request needs at least one more scheduling pass after
    /// the current chain retires.
    pub(crate) fn more_passes(&self) -> bool {
        self.scheduled < self.req.length
    }
}

/// Where a finished request is routed when completions are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionKind {
    /// Hand back to the function driver.
    Driver,
    /// Internal endpoint-0 status-phase request; consumed by the control
    /// state machine.
    StatusPhase,
    /// Internal GET_STATUS data-phase request; consumed silently.
    GetStatus,
}

/// A completed request parked until it is safe to run callbacks.
pub(crate) struct Completion {
    pub addr: EpAddr,
    pub req: Request,
    pub kind: CompletionKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_defaults() {
        let r = Request::new(7, 0x2000_0000, 512);
        assert_eq!(r.status, XferStatus::InFlight);
        assert_eq!(r.actual, 0);
        assert!(!r.zero);
        assert!(Request::new(0, 0, 0).with_zero().zero);
    }

    #[test]
    fn multi_pass_cursor() {
        let mut q = QueuedRequest::new(Request::new(1, 0x1000, 200_000));
        assert!(q.more_passes());
        q.scheduled = 200_000;
        assert!(!q.more_passes());
    }
}
