//! Endpoint queues and the descriptor-chain scheduler.
//!
//! Each endpoint half owns a queue of requests. A request is carved into a
//! chain of descriptors (one scheduling pass); requests too large for one
//! chain are resumed pass by pass from the transfer-complete interrupt.
//! Appending to a live chain uses the add-dTD tripwire, fresh chains go
//! through the queue head and a prime.

use heapless::Deque;

use crate::error::{Result, UdcError};
use crate::gadget::{Udc, UsbPhy};
use crate::regs::{self, Reg, UsbHw, ATDTW_TIMEOUT_MS, USBCMD_ATDTW};
use crate::request::{CompletionKind, QueuedRequest, Request, TdEntry, XferStatus};
use crate::request::{EP_QUEUE_DEPTH, MAX_TD_BYTES, TD_CHAIN_MAX};
use crate::td::{
    Qh, TdHandle, TdPool, QH_IOS, QH_MAX_PKT, QH_MAX_PKT_SHIFT, QH_MULT, QH_MULT_SHIFT, QH_ZLT,
    TD_ADDR_MASK, TD_IOC, TD_STATUS_ACTIVE, TD_STATUS_DT_ERR, TD_STATUS_HALTED, TD_STATUS_TR_ERR,
    TD_TERMINATE, TD_TOTAL_BYTES, TD_TOTAL_BYTES_SHIFT,
};
use crate::{Dir, EpAddr, EpType};

/// How long a primed endpoint may sit with no sign of life before the
/// watchdog re-primes it.
pub(crate) const PRIME_WATCHDOG_MS: u64 = 1000;
pub(crate) const PRIME_RETRY_MAX: u8 = 3;

/// Endpoint configuration handed to [`Udc::ep_enable`], matching the wire
/// descriptor fields the controller cares about.
#[derive(Debug, Clone, Copy)]
pub struct EpDescriptor {
    /// bEndpointAddress: number plus direction bit.
    pub address: u8,
    /// bmAttributes: transfer type in the low two bits.
    pub attributes: u8,
    /// wMaxPacketSize, including the high-bandwidth mult bits 12:11.
    pub max_packet_size: u16,
}

/// Software state of one endpoint half.
pub(crate) struct Endpoint {
    pub ty: EpType,
    pub max_packet: u16,
    /// Additional transactions per microframe (high-bandwidth isochronous).
    pub mult: u8,
    pub enabled: bool,
    pub wedged: bool,
    pub queue: Deque<QueuedRequest, EP_QUEUE_DEPTH>,
    /// The newest retired descriptor, kept allocated until the next chain
    /// retires in case the hardware still holds a pointer to it.
    pub pending_free: Option<TdHandle>,
    /// Watchdog state for primes the hardware silently dropped.
    pub prime_deadline: Option<u64>,
    pub prime_retries: u8,
    pub prime_fail_count: u32,
    /// Times the add-dTD tripwire failed to latch within its budget.
    pub td_update_fail_count: u32,
}

impl Endpoint {
    pub(crate) fn new() -> Endpoint {
        Endpoint {
            ty: EpType::Bulk,
            max_packet: 0,
            mult: 0,
            enabled: false,
            wedged: false,
            queue: Deque::new(),
            pending_free: None,
            prime_deadline: None,
            prime_retries: 0,
            prime_fail_count: 0,
            td_update_fail_count: 0,
        }
    }
}

/// Carve the next pass of `qreq` into a descriptor chain.
///
/// Fills `qreq.tds`, links the descriptors, and advances the scheduling
/// cursor. On pool exhaustion everything allocated here is returned and the
/// cursor is untouched.
fn build_pass(tds: &mut TdPool, dir: Dir, mps: u16, qreq: &mut QueuedRequest) -> Result<()> {
    debug_assert!(qreq.tds.is_empty());

    let total = qreq.req.length;
    let want_zlp =
        dir.is_tx() && qreq.req.zero && total > 0 && mps != 0 && total % mps as u32 == 0;
    let data_cap = if want_zlp {
        TD_CHAIN_MAX - 1
    } else {
        TD_CHAIN_MAX
    };

    let rollback = |tds: &mut TdPool, qreq: &mut QueuedRequest| {
        for e in &qreq.tds {
            tds.free(e.handle);
        }
        qreq.tds.clear();
    };

    let mut offset = qreq.scheduled;
    loop {
        let count = (total - offset).min(MAX_TD_BYTES);
        let h = match tds.alloc() {
            Some(h) => h,
            None => {
                rollback(tds, qreq);
                return Err(UdcError::NoMemory);
            }
        };
        tds.td(h).init(qreq.req.dma + offset, count);
        let _ = qreq.tds.push(TdEntry { handle: h, len: count });
        offset += count;
        if offset >= total || qreq.tds.len() >= data_cap {
            break;
        }
    }

    if want_zlp && offset >= total {
        let h = match tds.alloc() {
            Some(h) => h,
            None => {
                rollback(tds, qreq);
                return Err(UdcError::NoMemory);
            }
        };
        tds.td(h).init(0, 0);
        let _ = qreq.tds.push(TdEntry { handle: h, len: 0 });
    }

    for i in 0..qreq.tds.len() - 1 {
        let next = tds.dma_of(qreq.tds[i + 1].handle);
        tds.td(qreq.tds[i].handle).set_next(next);
    }
    let last = qreq.tds.last().unwrap().handle;
    tds.td(last).set_next(TD_TERMINATE);
    tds.td(last).or_token(TD_IOC);

    qreq.scheduled = offset;
    Ok(())
}

/// Hang a fresh chain off the queue head and prime the endpoint.
fn prime_chain<HW: UsbHw>(
    hw: &mut HW,
    qh: &Qh,
    num: u8,
    dir: Dir,
    is_ctrl: bool,
    first_dma: u32,
    iso_rx_mul: Option<u32>,
) -> Result<()> {
    qh.set_td_next(first_dma & TD_ADDR_MASK);
    qh.and_td_token(!(TD_STATUS_HALTED | TD_STATUS_ACTIVE));
    if let Some(mul) = iso_rx_mul {
        qh.set_cap((qh.cap() & !QH_MULT) | ((mul << QH_MULT_SHIFT) & QH_MULT));
    }
    hw.barrier();
    regs::ep_prime(hw, num, dir, is_ctrl)
}

/// Append a chain to a possibly-executing one via the add-dTD tripwire.
///
/// Returns true when the hardware picked the link up and no prime is needed.
fn tail_link<HW: UsbHw>(
    hw: &mut HW,
    tds: &TdPool,
    prev_last: TdHandle,
    first_dma: u32,
    num: u8,
    dir: Dir,
    td_update_fail_count: &mut u32,
) -> bool {
    tds.td(prev_last).set_next(first_dma);
    hw.barrier();

    let bit = regs::ep_bit(num, dir);
    if hw.read(Reg::EndptPrime, bit) != 0 {
        return true;
    }

    let start = hw.now_ms();
    let mut tmp_stat;
    loop {
        hw.write(Reg::UsbCmd, USBCMD_ATDTW, USBCMD_ATDTW);
        tmp_stat = hw.read(Reg::EndptStat, bit);
        if hw.read(Reg::UsbCmd, USBCMD_ATDTW) != 0 {
            break;
        }
        if hw.now_ms() - start > ATDTW_TIMEOUT_MS {
            *td_update_fail_count += 1;
            log::warn!("ep{}{}: add-dTD tripwire did not latch", num, dir.tag());
            break;
        }
    }
    hw.write(Reg::UsbCmd, USBCMD_ATDTW, 0);

    tmp_stat != 0
}

/// Collect a retired chain from the front request.
///
/// Mirrors the controller's completion rules: any still-active descriptor
/// aborts the walk, the first terminal status ends it (descriptors behind an
/// error are never inspected), and a leftover byte count on the transmit
/// side is a protocol error. Retired descriptors are freed except the
/// newest, which stays allocated until the next chain retires.
///
/// Returns whether the pass ended short.
fn hardware_dequeue(
    tds: &mut TdPool,
    qreq: &mut QueuedRequest,
    dir: Dir,
    pending_free: &mut Option<TdHandle>,
) -> Result<bool> {
    let mut pass_total = 0u32;
    let mut pass_actual = 0u32;
    let mut status = XferStatus::Complete;

    for entry in qreq.tds.iter() {
        let token = tds.td(entry.handle).token();
        if token & TD_STATUS_ACTIVE != 0 {
            return Err(UdcError::StillBusy);
        }

        let remaining = (token & TD_TOTAL_BYTES) >> TD_TOTAL_BYTES_SHIFT;
        pass_total += entry.len;
        pass_actual += entry.len.saturating_sub(remaining);

        // first terminal status wins; the chain behind it is dead
        if token & TD_STATUS_HALTED != 0 {
            status = XferStatus::Stalled;
            break;
        }
        if token & TD_STATUS_DT_ERR != 0 {
            status = XferStatus::DataToggleError;
            break;
        }
        if token & TD_STATUS_TR_ERR != 0 {
            status = XferStatus::ProtocolError;
            break;
        }
        if remaining != 0 && dir.is_tx() {
            status = XferStatus::ProtocolError;
            break;
        }
    }

    if let Some(p) = pending_free.take() {
        tds.free(p);
    }
    let last = qreq.tds.pop();
    for e in &qreq.tds {
        tds.free(e.handle);
    }
    qreq.tds.clear();
    *pending_free = last.map(|e| e.handle);

    qreq.done += pass_actual;
    qreq.req.actual = qreq.done;
    qreq.req.status = status;
    Ok(pass_actual < pass_total)
}

impl<HW: UsbHw, PHY: UsbPhy> Udc<HW, PHY> {
    /// Configure and enable an endpoint from its descriptor.
    pub fn ep_enable(&mut self, desc: &EpDescriptor) -> Result<()> {
        let addr = EpAddr::from_address(desc.address);
        if addr.number() >= self.config.ep_pairs {
            return Err(UdcError::InvalidArgument);
        }
        let slot = addr.slot();
        if self.eps[slot].enabled && addr.number() != 0 {
            return Err(UdcError::StillBusy);
        }

        let ty = EpType::from_attributes(desc.attributes);
        let mps = desc.max_packet_size & 0x7ff;
        let mult = ((desc.max_packet_size >> 11) & 0x3) as u8;

        let ep = &mut self.eps[slot];
        ep.ty = ty;
        ep.max_packet = mps;
        ep.mult = mult;
        ep.wedged = false;
        ep.enabled = true;

        let mut cap = 0u32;
        if addr.number() != 0 {
            cap |= QH_ZLT;
        }
        cap |= ((mps as u32) << QH_MAX_PKT_SHIFT) & QH_MAX_PKT;
        if ty == EpType::Control {
            cap |= QH_IOS;
        }
        if ty == EpType::Isochronous && addr.direction().is_tx() {
            cap |= QH_MULT;
        }
        let qh = self.qhs.qh(slot);
        qh.set_cap(cap);
        qh.set_td_next(qh.td_next() | TD_TERMINATE);

        regs::ep_enable_hw(&mut self.hw, addr.number(), addr.direction(), ty as u8);
        Ok(())
    }

    /// Disable an endpoint, flushing its queue. Control endpoints take both
    /// halves down together.
    pub fn ep_disable(&mut self, addr: EpAddr) -> Result<()> {
        let slot = addr.slot();
        if !self.eps[slot].enabled {
            return Err(UdcError::InvalidArgument);
        }

        let mut dir = addr.direction();
        let is_ctrl = self.eps[slot].ty == EpType::Control;
        loop {
            let a = EpAddr::new(addr.number(), dir);
            self.nuke_slot(a.slot(), XferStatus::Shutdown);
            regs::ep_disable_hw(&mut self.hw, a.number(), dir);
            let ep = &mut self.eps[a.slot()];
            ep.enabled = false;
            ep.wedged = false;

            dir = dir.other();
            if !is_ctrl || dir == addr.direction() {
                break;
            }
        }
        Ok(())
    }

    /// Queue a transfer on an endpoint. Control transfers go through the
    /// endpoint-0 state machine instead.
    pub fn ep_queue(&mut self, addr: EpAddr, req: Request) -> Result<()> {
        if addr.number() == 0 {
            return self.ep0_queue(req);
        }
        self.queue_on(addr.slot(), req, CompletionKind::Driver)
    }

    /// Remove a queued request by its caller-chosen id. The request comes
    /// back through the completion path with [`XferStatus::Cancelled`].
    pub fn ep_dequeue(&mut self, addr: EpAddr, id: u32) -> Result<()> {
        let slot = addr.slot();
        let Some(pos) = self.eps[slot].queue.iter().position(|q| q.req.id == id) else {
            return Err(UdcError::InvalidArgument);
        };

        // drop whatever chain the hardware is walking, then restart the
        // survivors below; control endpoints flush both halves
        let _ = regs::ep_flush(&mut self.hw, addr.number(), addr.direction());
        if self.eps[slot].ty == EpType::Control {
            let _ = regs::ep_flush(&mut self.hw, addr.number(), addr.direction().other());
        }

        // unlink the removed chain before its descriptors go back to the
        // pool, or the predecessor would still point into freed memory
        let prev_last = pos
            .checked_sub(1)
            .and_then(|i| self.eps[slot].queue.iter().nth(i))
            .and_then(|q| q.tds.last())
            .map(|e| e.handle);
        if let Some(h) = prev_last {
            let next_first = self.eps[slot]
                .queue
                .iter()
                .nth(pos + 1)
                .and_then(|q| q.tds.first())
                .map(|e| self.tds.dma_of(e.handle))
                .unwrap_or(TD_TERMINATE);
            self.tds.td(h).set_next(next_first);
            self.hw.barrier();
        }

        let len = self.eps[slot].queue.len();
        let mut removed = None;
        for _ in 0..len {
            let Some(q) = self.eps[slot].queue.pop_front() else {
                break;
            };
            if removed.is_none() && q.req.id == id {
                removed = Some(q);
            } else {
                let _ = self.eps[slot].queue.push_back(q);
            }
        }

        let Some(mut q) = removed else {
            return Err(UdcError::InvalidArgument);
        };
        for e in &q.tds {
            self.tds.free(e.handle);
        }
        q.tds.clear();
        q.req.status = XferStatus::Cancelled;
        q.req.actual = q.done;
        let kind = q.kind;
        self.push_completion(addr, q.req, kind);

        if self.eps[slot].queue.is_empty() {
            self.eps[slot].prime_deadline = None;
            self.eps[slot].prime_retries = 0;
        } else {
            self.prime_front(slot)?;
            self.arm_watchdog(slot);
        }
        Ok(())
    }

    /// Stall or unstall an endpoint. Unstalling clears a wedge and resets
    /// the data toggle.
    pub fn ep_set_halt(&mut self, addr: EpAddr, value: bool) -> Result<()> {
        if !value {
            self.eps[addr.slot()].wedged = false;
        }
        self.halt_slot(addr.slot(), value, true)
    }

    /// Stall an endpoint such that CLEAR_FEATURE(HALT) from the host does
    /// not unstall it; only [`Udc::ep_set_halt`]`(.., false)` does.
    pub fn ep_set_wedge(&mut self, addr: EpAddr) -> Result<()> {
        self.eps[addr.slot()].wedged = true;
        self.halt_slot(addr.slot(), true, true)
    }

    /// Drop every queued request on the endpoint and flush its FIFO. The
    /// requests come back with [`XferStatus::Shutdown`].
    pub fn ep_fifo_flush(&mut self, addr: EpAddr) -> Result<()> {
        let slot = addr.slot();
        if !self.eps[slot].enabled {
            return Err(UdcError::InvalidArgument);
        }
        self.nuke_slot(slot, XferStatus::Shutdown);
        Ok(())
    }

    pub(crate) fn halt_slot(&mut self, slot: usize, value: bool, check_transfer: bool) -> Result<()> {
        let addr = EpAddr::from_slot(slot);
        let ep = &self.eps[slot];
        if !ep.enabled {
            return Err(UdcError::Shutdown);
        }
        if ep.ty == EpType::Isochronous {
            return Err(UdcError::NotSupported);
        }
        if check_transfer
            && value
            && addr.direction().is_tx()
            && ep.ty != EpType::Control
            && !ep.queue.is_empty()
        {
            return Err(UdcError::WouldBlock);
        }

        // control endpoints stall both halves
        let is_ctrl = ep.ty == EpType::Control;
        let mut dir = addr.direction();
        loop {
            regs::ep_set_halt_hw(&mut self.hw, addr.number(), dir, value);
            dir = dir.other();
            if !is_ctrl || dir == addr.direction() {
                break;
            }
        }
        Ok(())
    }

    /// Queue a request on a slot, carving the first pass and handing it to
    /// hardware. Shared by the public endpoint API and the control state
    /// machine.
    pub(crate) fn queue_on(
        &mut self,
        slot: usize,
        req: Request,
        kind: CompletionKind,
    ) -> Result<()> {
        let addr = EpAddr::from_slot(slot);
        if self.dev.suspended {
            if !self.dev.remote_wakeup {
                return Err(UdcError::WouldBlock);
            }
            // resume signalling runs as deferred work; the transfer rides
            // out once the host wakes the bus
            if self.dev.rw_pending.is_none() {
                self.dev.rw_pending =
                    Some(self.hw.now_ms() + crate::gadget::REMOTE_WAKEUP_DELAY_MS);
            }
        }
        {
            let ep = &self.eps[slot];
            if !ep.enabled {
                return Err(UdcError::Shutdown);
            }
            if ep.ty == EpType::Isochronous
                && req.length > (ep.mult as u32 + 1) * ep.max_packet as u32
            {
                return Err(UdcError::MessageTooBig);
            }
            if ep.queue.iter().any(|q| q.req.id == req.id && q.kind == kind) {
                return Err(UdcError::AlreadyQueued);
            }
            if ep.queue.front().is_some_and(|f| f.more_passes()) {
                return Err(UdcError::LargeTransferInProgress);
            }
            if ep.queue.is_full() {
                return Err(UdcError::NoMemory);
            }
        }

        let mut qreq = QueuedRequest::new(req);
        qreq.kind = kind;
        let ep = &mut self.eps[slot];
        build_pass(&mut self.tds, addr.direction(), ep.max_packet, &mut qreq)?;
        let first_dma = self.tds.dma_of(qreq.tds.first().unwrap().handle);

        let prev_last = ep.queue.back().and_then(|p| p.tds.last()).map(|e| e.handle);
        let linked = match prev_last {
            Some(prev_last) => tail_link(
                &mut self.hw,
                &self.tds,
                prev_last,
                first_dma,
                addr.number(),
                addr.direction(),
                &mut ep.td_update_fail_count,
            ),
            None => false,
        };

        if !linked {
            let iso_rx_mul = iso_rx_mul(ep.ty, addr.direction(), ep.max_packet, qreq.req.length);
            let r = prime_chain(
                &mut self.hw,
                self.qhs.qh(slot),
                addr.number(),
                addr.direction(),
                ep.ty == EpType::Control,
                first_dma,
                iso_rx_mul,
            );
            if let Err(e) = r {
                for entry in &qreq.tds {
                    self.tds.free(entry.handle);
                }
                return Err(e);
            }
        }

        let _ = self.eps[slot].queue.push_back(qreq);
        self.arm_watchdog(slot);
        Ok(())
    }

    /// Drain retired chains on one endpoint, completing requests and
    /// scheduling follow-up passes for oversized transfers.
    pub(crate) fn tr_complete_slot(&mut self, slot: usize) {
        let addr = EpAddr::from_slot(slot);
        let dir = addr.direction();

        loop {
            let Some(mut qreq) = self.eps[slot].queue.pop_front() else {
                break;
            };

            let short = match hardware_dequeue(
                &mut self.tds,
                &mut qreq,
                dir,
                &mut self.eps[slot].pending_free,
            ) {
                Err(_) => {
                    let _ = self.eps[slot].queue.push_front(qreq);
                    break;
                }
                Ok(short) => short,
            };

            if !short && qreq.req.status == XferStatus::Complete && qreq.more_passes() {
                let ep = &mut self.eps[slot];
                let next = build_pass(&mut self.tds, dir, ep.max_packet, &mut qreq).and_then(|_| {
                    let first_dma = self.tds.dma_of(qreq.tds.first().unwrap().handle);
                    let iso_rx_mul =
                        iso_rx_mul(ep.ty, dir, ep.max_packet, qreq.req.length);
                    prime_chain(
                        &mut self.hw,
                        self.qhs.qh(slot),
                        addr.number(),
                        dir,
                        ep.ty == EpType::Control,
                        first_dma,
                        iso_rx_mul,
                    )
                });
                match next {
                    Ok(()) => {
                        let _ = self.eps[slot].queue.push_front(qreq);
                        self.arm_watchdog(slot);
                        break;
                    }
                    Err(e) => {
                        for entry in &qreq.tds {
                            self.tds.free(entry.handle);
                        }
                        qreq.tds.clear();
                        log::error!(
                            "ep{}{}: lost transfer continuation: {}",
                            addr.number(),
                            dir.tag(),
                            e
                        );
                        qreq.req.status = XferStatus::Shutdown;
                    }
                }
            }

            let kind = qreq.kind;
            self.push_completion(addr, qreq.req, kind);
        }

        if self.eps[slot].queue.is_empty() {
            self.eps[slot].prime_deadline = None;
            self.eps[slot].prime_retries = 0;
        } else {
            self.arm_watchdog(slot);
        }
    }

    /// Flush the endpoint and fail every queued request with `status`.
    pub(crate) fn nuke_slot(&mut self, slot: usize, status: XferStatus) {
        let addr = EpAddr::from_slot(slot);

        if !self.dev.skip_flush
            && regs::ep_flush(&mut self.hw, addr.number(), addr.direction()).is_err()
        {
            // the controller sometimes wedges the flush handshake entirely;
            // stop retrying until the next bus reset
            self.dev.skip_flush = true;
        }

        while let Some(mut qreq) = self.eps[slot].queue.pop_front() {
            for e in &qreq.tds {
                self.tds.free(e.handle);
            }
            qreq.tds.clear();
            qreq.req.status = status;
            qreq.req.actual = qreq.done;
            let kind = qreq.kind;
            self.push_completion(addr, qreq.req, kind);
        }
        if let Some(p) = self.eps[slot].pending_free.take() {
            self.tds.free(p);
        }
        self.eps[slot].prime_deadline = None;
        self.eps[slot].prime_retries = 0;
    }

    /// Re-prime the chain at the front of the queue (after a flush).
    pub(crate) fn prime_front(&mut self, slot: usize) -> Result<()> {
        let addr = EpAddr::from_slot(slot);
        let ep = &self.eps[slot];
        let front = ep.queue.front().ok_or(UdcError::InvalidArgument)?;
        let first = front.tds.first().ok_or(UdcError::InvalidArgument)?;
        let first_dma = self.tds.dma_of(first.handle);
        let iso_rx_mul = iso_rx_mul(ep.ty, addr.direction(), ep.max_packet, front.req.length);
        prime_chain(
            &mut self.hw,
            self.qhs.qh(slot),
            addr.number(),
            addr.direction(),
            ep.ty == EpType::Control,
            first_dma,
            iso_rx_mul,
        )
    }

    /// Recover endpoints whose prime the hardware dropped. Driven from
    /// [`Udc::run_timers`].
    pub(crate) fn run_prime_watchdog(&mut self) {
        // nothing to recover while the bus is down
        if self.dev.suspended || (self.config.pullup_on_vbus && !self.dev.vbus_active) {
            return;
        }
        let now = self.hw.now_ms();
        for slot in 0..crate::EP_SLOTS {
            let Some(deadline) = self.eps[slot].prime_deadline else {
                continue;
            };
            if now < deadline {
                continue;
            }
            if self.eps[slot].queue.is_empty() {
                self.eps[slot].prime_deadline = None;
                continue;
            }

            let addr = EpAddr::from_slot(slot);
            let bit = regs::ep_bit(addr.number(), addr.direction());
            if self.hw.read(Reg::EndptStat, bit) != 0 || self.hw.read(Reg::EndptPrime, bit) != 0 {
                // making progress, keep watching
                self.eps[slot].prime_retries = 0;
                self.eps[slot].prime_deadline = Some(now + PRIME_WATCHDOG_MS);
                continue;
            }

            let front_active = self.eps[slot]
                .queue
                .front()
                .and_then(|f| f.tds.first())
                .map(|e| self.tds.td(e.handle).token() & TD_STATUS_ACTIVE != 0)
                .unwrap_or(false);
            if !front_active {
                // chain retired without an interrupt; the next transfer
                // completion sweep collects it
                self.eps[slot].prime_deadline = Some(now + PRIME_WATCHDOG_MS);
                continue;
            }

            if self.eps[slot].prime_retries < PRIME_RETRY_MAX {
                self.eps[slot].prime_retries += 1;
                log::warn!(
                    "ep{}{}: prime dropped, retry {}",
                    addr.number(),
                    addr.direction().tag(),
                    self.eps[slot].prime_retries
                );
                let _ = self.prime_front(slot);
                self.eps[slot].prime_deadline = Some(now + PRIME_WATCHDOG_MS);
            } else {
                self.eps[slot].prime_fail_count += 1;
                let qh = self.qhs.qh(slot);
                log::error!(
                    "ep{}{}: prime failed after {} retries (qh token {:#x} next {:#x})",
                    addr.number(),
                    addr.direction().tag(),
                    PRIME_RETRY_MAX,
                    qh.td_token(),
                    qh.td_next(),
                );
                self.eps[slot].prime_deadline = None;
            }
        }
    }

    pub(crate) fn arm_watchdog(&mut self, slot: usize) {
        let ep = &mut self.eps[slot];
        ep.prime_retries = 0;
        ep.prime_deadline = Some(self.hw.now_ms() + PRIME_WATCHDOG_MS);
    }
}

fn iso_rx_mul(ty: EpType, dir: Dir, mps: u16, length: u32) -> Option<u32> {
    if ty != EpType::Isochronous || dir.is_tx() || mps == 0 {
        return None;
    }
    let mut mul = length / mps as u32;
    if length % mps as u32 != 0 || mul == 0 {
        mul += 1;
    }
    Some(mul)
}
