//! The controller object, its lifecycle, and the seams to the platform
//! (PHY) and the function driver.

use heapless::Deque;

use crate::ch9::SetupPacket;
use crate::ep0::{Ep0Phase, Ep0State, EP0_OUT};
use crate::endpoint::{Endpoint, EpDescriptor};
use crate::error::{Result, UdcError};
use crate::regs::{self, Reg, UsbHw, PORTSC_FPR, PORTSC_SUSP, USBCMD_RS};
use crate::request::{Completion, CompletionKind, Request, XferStatus};
use crate::td::{QhPool, TdPool};
use crate::{ch9, EpAddr, Speed, EP_SLOTS};

/// Resume signalling budget before the device considers itself awake again.
pub(crate) const REMOTE_WAKEUP_MS: u64 = 200;
/// Delay before deferred resume signalling fires for a transfer queued on a
/// suspended bus.
pub(crate) const REMOTE_WAKEUP_DELAY_MS: u64 = 200;

/// Transceiver hooks. Platforms without a managed PHY use [`NoPhy`].
pub trait UsbPhy {
    fn init(&mut self) {}
    fn shutdown(&mut self) {}
    fn set_suspend(&mut self, _suspend: bool) {}
    /// Configured current draw changed (SET_CONFIGURATION / suspend).
    fn set_power(&mut self, _ma: u16) {}
}

/// Placeholder for controllers whose PHY needs no management.
pub struct NoPhy;

impl UsbPhy for NoPhy {}

/// The function driver: owns the gadget's protocol, gets bus events and
/// completed requests handed back.
///
/// Callbacks receive the controller so they can queue and dequeue freely;
/// the controller's queues are always consistent at that point.
pub trait GadgetDriver<HW: UsbHw, PHY: UsbPhy = NoPhy> {
    /// A SETUP the controller does not handle itself. Answer by queueing on
    /// endpoint 0 (a zero-length request acknowledges a no-data command);
    /// an error answers the host with a protocol stall.
    fn setup(&mut self, udc: &mut Udc<HW, PHY>, setup: &SetupPacket) -> Result<()>;
    /// A request finished; inspect `req.status` and `req.actual`.
    fn complete(&mut self, udc: &mut Udc<HW, PHY>, addr: EpAddr, req: Request);
    fn reset(&mut self, _udc: &mut Udc<HW, PHY>) {}
    fn suspend(&mut self, _udc: &mut Udc<HW, PHY>) {}
    fn resume(&mut self, _udc: &mut Udc<HW, PHY>) {}
    fn disconnect(&mut self, _udc: &mut Udc<HW, PHY>) {}
}

/// Platform knobs, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct UdcConfig {
    /// Hardware endpoint pairs, up to 16.
    pub ep_pairs: u8,
    /// Register bank shared with a host role; skip the controller reset.
    pub regs_shared: bool,
    /// Gate the D+ pull-up on VBUS presence.
    pub pullup_on_vbus: bool,
    /// Set the stream-disable workaround bit.
    pub disable_streaming: bool,
    pub self_powered: bool,
}

impl Default for UdcConfig {
    fn default() -> UdcConfig {
        UdcConfig {
            ep_pairs: 16,
            regs_shared: false,
            pullup_on_vbus: false,
            disable_streaming: false,
            self_powered: false,
        }
    }
}

/// Bus-visible device state, readable through [`Udc::state`].
pub struct DeviceState {
    pub speed: Speed,
    pub address: u8,
    pub configured: bool,
    pub suspended: bool,
    pub remote_wakeup: bool,
    pub vbus_active: bool,
    pub b_hnp_enable: bool,
    pub a_hnp_support: bool,
    /// OTG host-request flag reported through GET_STATUS.
    pub host_request: bool,
    /// Address latched by SET_ADDRESS, applied after its status phase.
    pub(crate) setaddr: bool,
    pub(crate) test_mode: Option<u8>,
    /// Flush handshake wedged; skip flushes until the next bus reset.
    pub(crate) skip_flush: bool,
    pub(crate) rw_deadline: Option<u64>,
    /// Deferred resume signalling scheduled by an enqueue on a suspended bus.
    pub(crate) rw_pending: Option<u64>,
    pub(crate) started: bool,
    pub(crate) self_powered: bool,
}

impl DeviceState {
    fn new(self_powered: bool) -> DeviceState {
        DeviceState {
            speed: Speed::Unknown,
            address: 0,
            configured: false,
            suspended: false,
            remote_wakeup: false,
            vbus_active: false,
            b_hnp_enable: false,
            a_hnp_support: false,
            host_request: false,
            setaddr: false,
            test_mode: None,
            skip_flush: false,
            rw_deadline: None,
            rw_pending: None,
            started: false,
            self_powered,
        }
    }
}

/// Device-side driver for one ChipIdea-style controller.
pub struct Udc<HW: UsbHw, PHY: UsbPhy = NoPhy> {
    pub(crate) hw: HW,
    pub(crate) phy: Option<PHY>,
    pub(crate) config: UdcConfig,
    pub(crate) dev: DeviceState,
    pub(crate) eps: [Endpoint; EP_SLOTS],
    pub(crate) qhs: QhPool,
    pub(crate) tds: TdPool,
    pub(crate) ep0: Ep0State,
    pub(crate) completions: Deque<Completion, 32>,
}

impl<HW: UsbHw> Udc<HW, NoPhy> {
    pub fn new(hw: HW, config: UdcConfig) -> Udc<HW, NoPhy> {
        Udc::with_phy(hw, None, config)
    }
}

impl<HW: UsbHw, PHY: UsbPhy> Udc<HW, PHY> {
    pub fn with_phy(hw: HW, phy: Option<PHY>, config: UdcConfig) -> Udc<HW, PHY> {
        Udc {
            hw,
            phy,
            config,
            dev: DeviceState::new(config.self_powered),
            eps: core::array::from_fn(|_| Endpoint::new()),
            qhs: QhPool::new(),
            tds: TdPool::new(),
            ep0: Ep0State::new(),
            completions: Deque::new(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.dev
    }

    /// Bind the function driver and arm the controller. With
    /// `pullup_on_vbus` set, arming waits for [`Udc::vbus_session`].
    pub fn start<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) -> Result<()> {
        if self.dev.started {
            return Err(UdcError::StillBusy);
        }
        if let Some(phy) = self.phy.as_mut() {
            phy.init();
        }
        self.enable_ep0()?;

        if self.dev.vbus_active || !self.config.pullup_on_vbus {
            self.hw_start()?;
        }
        self.dev.started = true;
        self.run_completions(driver);
        Ok(())
    }

    /// Unbind: drop all traffic, detach from the bus, park the PHY.
    pub fn stop<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        self.stop_activity(driver);
        self.pullup(false);
        regs::device_state(&mut self.hw, 0, true);
        if let Some(phy) = self.phy.as_mut() {
            phy.shutdown();
        }
        self.dev.started = false;
        self.run_completions(driver);
    }

    /// VBUS presence changed (from the platform's VBUS sensing).
    pub fn vbus_session<D: GadgetDriver<HW, PHY>>(
        &mut self,
        active: bool,
        driver: &mut D,
    ) -> Result<()> {
        self.dev.vbus_active = active;
        if !self.dev.started {
            return Ok(());
        }

        if active {
            self.hw_start()?;
        } else {
            self.stop_activity(driver);
            self.pullup(false);
            regs::device_state(&mut self.hw, 0, true);
            driver.disconnect(self);
        }
        self.run_completions(driver);
        Ok(())
    }

    /// Drive (or drop) the D+ pull-up.
    pub fn pullup(&mut self, on: bool) {
        let on = on && (!self.config.pullup_on_vbus || self.dev.vbus_active);
        self.hw
            .write(Reg::UsbCmd, USBCMD_RS, if on { USBCMD_RS } else { 0 });
    }

    /// Start resume signalling towards a suspended host. Only legal while
    /// the host has enabled remote wakeup.
    pub fn wakeup(&mut self) -> Result<()> {
        if !self.dev.remote_wakeup {
            return Err(UdcError::NotSupported);
        }
        if self.hw.read(Reg::PortSc, PORTSC_SUSP) == 0 {
            return Err(UdcError::InvalidArgument);
        }
        if let Some(phy) = self.phy.as_mut() {
            phy.set_suspend(false);
        }
        self.dev.rw_deadline = Some(self.hw.now_ms() + REMOTE_WAKEUP_MS);
        self.hw.write(Reg::PortSc, PORTSC_FPR, PORTSC_FPR);
        Ok(())
    }

    /// Report the configured current draw to the PHY.
    pub fn vbus_draw(&mut self, ma: u16) {
        log::debug!("vbus draw {} mA", ma);
        if let Some(phy) = self.phy.as_mut() {
            phy.set_power(ma);
        }
    }

    pub fn set_selfpowered(&mut self, value: bool) {
        self.dev.self_powered = value;
    }

    /// Raise or drop the OTG host-request flag the host polls for.
    pub fn set_host_request(&mut self, value: bool) {
        self.dev.host_request = value;
    }

    /// Periodic housekeeping: the prime watchdog and the remote-wakeup
    /// timer. Call from a coarse (~100 ms) tick.
    pub fn run_timers<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        self.run_prime_watchdog();
        if let Some(t) = self.dev.rw_pending {
            if self.hw.now_ms() >= t {
                self.dev.rw_pending = None;
                // conditions may have changed since the enqueue scheduled
                // this; only wake a bus that is still asleep
                if self.dev.suspended && self.dev.remote_wakeup {
                    if let Err(e) = self.wakeup() {
                        log::warn!("deferred remote wakeup failed: {}", e);
                    }
                }
            }
        }
        if let Some(t) = self.dev.rw_deadline {
            if self.hw.now_ms() >= t {
                self.dev.rw_deadline = None;
                self.dev.suspended = false;
            }
        }
        self.run_completions(driver);
    }

    /// Hand out completions parked by calls that could not reach the driver
    /// (dequeue, disable, flush from within a callback).
    pub fn deliver_completions<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        self.run_completions(driver);
    }

    pub(crate) fn hw_start(&mut self) -> Result<()> {
        if !self.config.regs_shared {
            regs::device_reset(&mut self.hw)?;
        }
        regs::device_state(
            &mut self.hw,
            self.qhs.list_addr(),
            !self.config.disable_streaming,
        );
        self.pullup(true);
        Ok(())
    }

    pub(crate) fn enable_ep0(&mut self) -> Result<()> {
        self.ep_enable(&EpDescriptor {
            address: 0x00,
            attributes: 0,
            max_packet_size: ch9::CTRL_PAYLOAD_MAX,
        })?;
        self.ep_enable(&EpDescriptor {
            address: 0x80,
            attributes: 0,
            max_packet_size: ch9::CTRL_PAYLOAD_MAX,
        })
    }

    /// Flush every endpoint and fail its traffic, as on disconnect or bus
    /// reset.
    pub(crate) fn stop_activity<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        for slot in 0..EP_SLOTS {
            if self.eps[slot].enabled {
                self.nuke_slot(slot, XferStatus::Shutdown);
                self.run_completions(driver);
            }
        }
        self.dev.speed = Speed::Unknown;
        self.dev.remote_wakeup = false;
        self.dev.suspended = false;
        self.dev.configured = false;
        self.dev.rw_deadline = None;
        self.dev.rw_pending = None;
        self.ep0.phase = Ep0Phase::Idle;
    }

    pub(crate) fn push_completion(&mut self, addr: EpAddr, req: Request, kind: CompletionKind) {
        if self
            .completions
            .push_back(Completion { addr, req, kind })
            .is_err()
        {
            log::error!("completion queue overflow, dropping request {}", req.id);
        }
    }

    /// Drain parked completions: route internal endpoint-0 requests through
    /// the control machine, hand the rest to the driver, and advance the
    /// control phase behind driver data.
    pub(crate) fn run_completions<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        while let Some(c) = self.completions.pop_front() {
            match c.kind {
                CompletionKind::StatusPhase => {
                    self.ep0_status_complete(&c.req);
                }
                CompletionKind::GetStatus => {
                    if c.req.status == XferStatus::Complete && self.ep0.phase == Ep0Phase::Data {
                        if self.setup_status_phase().is_err() {
                            let _ = self.halt_slot(EP0_OUT, true, false);
                            self.ep0.phase = Ep0Phase::Idle;
                        }
                    } else if c.req.status != XferStatus::Complete {
                        log::debug!("get-status reply dropped: {:?}", c.req.status);
                    }
                }
                CompletionKind::Driver => {
                    let is_ep0 = c.addr.number() == 0;
                    let phase = self.ep0.phase;
                    let status = c.req.status;
                    driver.complete(self, c.addr, c.req);
                    if !is_ep0 {
                        continue;
                    }
                    if phase == Ep0Phase::Data
                        && status == XferStatus::Complete
                        && self.ep0.phase == Ep0Phase::Data
                    {
                        if self.setup_status_phase().is_err() {
                            log::warn!("ep0: could not queue the status phase");
                            let _ = self.halt_slot(EP0_OUT, true, false);
                            self.ep0.phase = Ep0Phase::Idle;
                        }
                    } else if phase == Ep0Phase::Status
                        && status == XferStatus::Complete
                        && self.ep0.phase == Ep0Phase::Status
                    {
                        // a zero-length driver reply was the handshake itself
                        self.ep0.phase = Ep0Phase::Idle;
                    }
                }
            }
        }
    }
}
