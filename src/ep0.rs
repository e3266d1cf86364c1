//! Endpoint-0 control protocol: SETUP decode, the standard requests the
//! controller answers itself, and the data/status phase bookkeeping.
//!
//! SET_ADDRESS and test-mode selection are latched here and applied only
//! after the status phase goes out on the wire; everything the controller
//! does not understand is delegated to the function driver.

use crate::ch9::{self, SetupPacket};
use crate::error::{Result, UdcError};
use crate::gadget::{GadgetDriver, Udc, UsbPhy};
use crate::regs::{Reg, UsbHw, USBCMD_SUTW};
use crate::request::{CompletionKind, Request, XferStatus};
use crate::td::dma_addr;
use crate::{Dir, EpAddr, EP_DIR_SLOTS};

pub(crate) const EP0_OUT: usize = 0;
pub(crate) const EP0_IN: usize = EP_DIR_SLOTS;

/// Ids of the requests the control machine queues for itself.
const STATUS_REQ_ID: u32 = 0xffff_fff0;
const GET_STATUS_REQ_ID: u32 = 0xffff_fff1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ep0Phase {
    Idle,
    /// SETUP decoded, waiting for the data (or status) phase to be queued.
    Setup,
    Data,
    Status,
}

pub(crate) struct Ep0State {
    pub phase: Ep0Phase,
    /// Direction of the data phase of the transfer in progress.
    pub dir: Dir,
    /// Backing store for GET_STATUS replies; read by the controller over
    /// DMA, so it lives here rather than on the stack.
    pub status_buf: [u8; 2],
}

impl Ep0State {
    pub(crate) fn new() -> Ep0State {
        Ep0State {
            phase: Ep0Phase::Idle,
            dir: Dir::Rx,
            status_buf: [0; 2],
        }
    }
}

fn endpoint_slot(index: u16) -> usize {
    let num = (index & ch9::ENDPOINT_NUMBER_MASK) as u8;
    let dir = if index & ch9::ENDPOINT_DIR_MASK != 0 {
        Dir::Tx
    } else {
        Dir::Rx
    };
    EpAddr::new(num, dir).slot()
}

impl<HW: UsbHw, PHY: UsbPhy> Udc<HW, PHY> {
    /// React to a SETUP token: displace whatever the previous transfer left
    /// behind, copy the mailbox out under the tripwire, and dispatch.
    pub(crate) fn handle_setup<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        self.nuke_slot(EP0_OUT, XferStatus::Shutdown);
        self.nuke_slot(EP0_IN, XferStatus::Shutdown);

        let setup = SetupPacket::from_bytes(self.read_setup_mailbox());
        self.ep0.phase = Ep0Phase::Setup;
        self.ep0.dir = if setup.is_in() { Dir::Tx } else { Dir::Rx };

        log::trace!(
            "setup: type {:#04x} req {:#04x} value {:#06x} index {:#06x} length {}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length
        );

        let handled = if setup.request_type & ch9::TYPE_MASK == ch9::TYPE_STANDARD {
            self.handle_standard(driver, &setup)
        } else {
            self.delegate(driver, &setup)
        };

        if let Err(e) = handled {
            log::warn!("ep0: request {:#04x} failed: {}", setup.request, e);
            // protocol stall; the next SETUP clears it
            let _ = self.halt_slot(EP0_OUT, true, false);
            self.ep0.phase = Ep0Phase::Idle;
        }
    }

    /// Copy the 8-byte SETUP mailbox guarded by the setup tripwire: a new
    /// SETUP landing mid-copy knocks the tripwire down and the copy restarts.
    fn read_setup_mailbox(&mut self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        loop {
            self.hw.write(Reg::UsbCmd, USBCMD_SUTW, USBCMD_SUTW);
            let qh = self.qhs.qh(EP0_OUT);
            for (i, b) in raw.iter_mut().enumerate() {
                *b = qh.setup_byte(i);
            }
            if self.hw.read(Reg::UsbCmd, USBCMD_SUTW) != 0 {
                break;
            }
        }
        self.hw.write(Reg::UsbCmd, USBCMD_SUTW, 0);
        raw
    }

    fn handle_standard<D: GadgetDriver<HW, PHY>>(
        &mut self,
        driver: &mut D,
        setup: &SetupPacket,
    ) -> Result<()> {
        match setup.request {
            ch9::REQ_CLEAR_FEATURE => {
                if setup.request_type == (ch9::DIR_OUT | ch9::RECIP_ENDPOINT)
                    && setup.value == ch9::FEAT_ENDPOINT_HALT
                {
                    if setup.length != 0 {
                        return Err(UdcError::InvalidArgument);
                    }
                    let slot = endpoint_slot(setup.index);
                    // a wedged endpoint ignores the host's unstall
                    if !self.eps[slot].wedged {
                        self.halt_slot(slot, false, false)?;
                    }
                    self.setup_status_phase()
                } else if setup.request_type == (ch9::DIR_OUT | ch9::RECIP_DEVICE)
                    && setup.value == ch9::FEAT_DEVICE_REMOTE_WAKEUP
                {
                    if setup.length != 0 {
                        return Err(UdcError::InvalidArgument);
                    }
                    self.dev.remote_wakeup = false;
                    self.setup_status_phase()
                } else {
                    self.delegate(driver, setup)
                }
            }
            ch9::REQ_GET_STATUS => {
                let t = setup.request_type;
                if t == (ch9::DIR_IN | ch9::RECIP_DEVICE)
                    || t == (ch9::DIR_IN | ch9::RECIP_ENDPOINT)
                    || t == (ch9::DIR_IN | ch9::RECIP_INTERFACE)
                {
                    if setup.value != 0 || setup.length == 0 {
                        return Err(UdcError::InvalidArgument);
                    }
                    self.get_status_response(setup)
                } else {
                    self.delegate(driver, setup)
                }
            }
            ch9::REQ_SET_ADDRESS => {
                if setup.request_type != (ch9::DIR_OUT | ch9::RECIP_DEVICE) {
                    return self.delegate(driver, setup);
                }
                if setup.length != 0 || setup.index != 0 {
                    return Err(UdcError::InvalidArgument);
                }
                // latched; the bus address changes after the status phase
                self.dev.address = setup.value as u8;
                self.dev.setaddr = true;
                self.setup_status_phase()
            }
            ch9::REQ_SET_FEATURE => self.set_feature(driver, setup),
            ch9::REQ_SET_CONFIGURATION => {
                if setup.request_type == (ch9::DIR_OUT | ch9::RECIP_DEVICE) {
                    self.dev.configured = setup.value != 0;
                }
                self.delegate(driver, setup)
            }
            _ => self.delegate(driver, setup),
        }
    }

    fn set_feature<D: GadgetDriver<HW, PHY>>(
        &mut self,
        driver: &mut D,
        setup: &SetupPacket,
    ) -> Result<()> {
        if setup.request_type == (ch9::DIR_OUT | ch9::RECIP_ENDPOINT)
            && setup.value == ch9::FEAT_ENDPOINT_HALT
        {
            if setup.length != 0 {
                return Err(UdcError::InvalidArgument);
            }
            self.halt_slot(endpoint_slot(setup.index), true, false)?;
            return self.setup_status_phase();
        }

        if setup.request_type != (ch9::DIR_OUT | ch9::RECIP_DEVICE) {
            return self.delegate(driver, setup);
        }
        if setup.length != 0 {
            return Err(UdcError::InvalidArgument);
        }

        match setup.value {
            ch9::FEAT_DEVICE_REMOTE_WAKEUP => {
                self.dev.remote_wakeup = true;
                self.setup_status_phase()
            }
            ch9::FEAT_DEVICE_TEST_MODE => {
                let mode = (setup.index >> 8) as u8;
                match mode {
                    ch9::TEST_J..=ch9::TEST_FORCE_EN => {
                        // applied once the status phase completes
                        self.dev.test_mode = Some(mode);
                        self.setup_status_phase()
                    }
                    _ => Err(UdcError::InvalidArgument),
                }
            }
            ch9::FEAT_B_HNP_ENABLE => {
                self.dev.b_hnp_enable = true;
                self.setup_status_phase()
            }
            ch9::FEAT_A_HNP_SUPPORT => {
                self.dev.a_hnp_support = true;
                self.setup_status_phase()
            }
            ch9::FEAT_A_ALT_HNP_SUPPORT => self.setup_status_phase(),
            _ => Err(UdcError::NotSupported),
        }
    }

    /// Hand the request to the function driver. Requests without a data
    /// phase get an IN status handshake, so the direction flips to transmit
    /// before the driver's zero-length reply arrives.
    fn delegate<D: GadgetDriver<HW, PHY>>(
        &mut self,
        driver: &mut D,
        setup: &SetupPacket,
    ) -> Result<()> {
        if setup.length == 0 {
            self.ep0.dir = Dir::Tx;
        }
        driver.setup(self, setup)
    }

    /// Build and queue the GET_STATUS reply out of the internal buffer.
    fn get_status_response(&mut self, setup: &SetupPacket) -> Result<()> {
        let len = if setup.recipient() == ch9::RECIP_DEVICE {
            if setup.index == ch9::OTG_STATUS_SELECTOR {
                self.ep0.status_buf[0] = self.dev.host_request as u8;
                1
            } else {
                let mut sts = 0u16;
                if self.dev.self_powered {
                    sts |= ch9::STATUS_SELF_POWERED;
                }
                if self.dev.remote_wakeup {
                    sts |= ch9::STATUS_REMOTE_WAKEUP;
                }
                self.ep0.status_buf = sts.to_le_bytes();
                2
            }
        } else if setup.recipient() == ch9::RECIP_ENDPOINT {
            let num = (setup.index & ch9::ENDPOINT_NUMBER_MASK) as u8;
            let dir = if setup.index & ch9::ENDPOINT_DIR_MASK != 0 {
                Dir::Tx
            } else {
                Dir::Rx
            };
            let halted = crate::regs::ep_get_halt(&self.hw, num, dir);
            self.ep0.status_buf = (halted as u16).to_le_bytes();
            2
        } else {
            self.ep0.status_buf = [0; 2];
            2
        };

        let dma = dma_addr(self.ep0.status_buf.as_ptr());
        let req = Request::new(GET_STATUS_REQ_ID, dma, len.min(setup.length as u32));
        self.queue_on(EP0_IN, req, CompletionKind::GetStatus)?;
        self.ep0.phase = Ep0Phase::Data;
        Ok(())
    }

    /// Queue the zero-length status handshake, opposite to the data phase.
    pub(crate) fn setup_status_phase(&mut self) -> Result<()> {
        let slot = if self.ep0.dir.is_tx() { EP0_OUT } else { EP0_IN };
        self.queue_on(slot, Request::new(STATUS_REQ_ID, 0, 0), CompletionKind::StatusPhase)?;
        self.ep0.phase = Ep0Phase::Status;
        Ok(())
    }

    /// The function driver's reply to a control request. Non-empty replies
    /// are the data phase; a zero-length reply is the status handshake for a
    /// request without data.
    pub(crate) fn ep0_queue(&mut self, req: Request) -> Result<()> {
        if self.ep0.phase == Ep0Phase::Idle {
            return Err(UdcError::InvalidArgument);
        }

        let slot = if self.ep0.dir.is_tx() { EP0_IN } else { EP0_OUT };
        if !self.eps[slot].queue.is_empty() {
            log::warn!("ep0: displacing a stale control transfer");
            self.nuke_slot(slot, XferStatus::Overflow);
        }

        self.queue_on(slot, req, CompletionKind::Driver)?;
        self.ep0.phase = if req.length > 0 {
            Ep0Phase::Data
        } else {
            Ep0Phase::Status
        };
        Ok(())
    }

    /// Status phase went out: commit whatever the transfer deferred.
    pub(crate) fn ep0_status_complete(&mut self, req: &Request) {
        if req.status == XferStatus::Complete {
            if self.dev.setaddr {
                crate::regs::set_address(&mut self.hw, self.dev.address);
                self.dev.setaddr = false;
                log::debug!("address {} active", self.dev.address);
            }
            if let Some(mode) = self.dev.test_mode.take() {
                log::info!("entering test mode {}", mode);
                crate::regs::port_test_set(&mut self.hw, mode);
            }
        }
        self.ep0.phase = Ep0Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{self, DEVICEADDR_USBADR, DEVICEADDR_USBADR_SHIFT, ENDPTCTRL_RXS, PORTSC_PTC, PORTSC_PTC_SHIFT};
    use crate::testutil::{test_udc, TestDriver};
    use crate::EpType;

    fn deliver_setup(udc: &mut crate::testutil::TestUdc, drv: &mut TestDriver, raw: [u8; 8]) {
        udc.qhs.qh(EP0_OUT).set_setup(raw);
        udc.handle_setup(drv);
    }

    /// Retire the pending status phase and run its completion.
    fn finish_status(udc: &mut crate::testutil::TestUdc, drv: &mut TestDriver, slot: usize) {
        udc.retire_chain(slot, 0);
        udc.tr_complete_slot(slot);
        udc.run_completions(drv);
    }

    #[test]
    fn set_address_is_deferred_to_status_phase() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0x00, 0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(udc.dev.setaddr);
        assert_eq!(udc.dev.address, 5);
        // not on the bus yet
        assert_eq!(udc.hw.read(Reg::DeviceAddr, DEVICEADDR_USBADR), 0);
        // OUT request, so the status handshake is IN
        assert_eq!(udc.eps[EP0_IN].queue.len(), 1);
        assert_eq!(udc.ep0.phase, Ep0Phase::Status);

        finish_status(&mut udc, &mut drv, EP0_IN);
        assert!(!udc.dev.setaddr);
        assert_eq!(
            udc.hw.read(Reg::DeviceAddr, DEVICEADDR_USBADR) >> DEVICEADDR_USBADR_SHIFT,
            5
        );
        assert_eq!(udc.ep0.phase, Ep0Phase::Idle);
    }

    #[test]
    fn get_status_device_reports_remote_wakeup() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();
        udc.dev.remote_wakeup = true;

        deliver_setup(&mut udc, &mut drv, [0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00]);
        assert_eq!(udc.ep0.phase, Ep0Phase::Data);
        assert_eq!(udc.ep0.status_buf, [0x02, 0x00]);
        let front = udc.eps[EP0_IN].queue.front().unwrap();
        assert_eq!(front.req.length, 2);

        // data phase retires, machine moves to the status handshake itself
        udc.retire_chain(EP0_IN, 0);
        udc.tr_complete_slot(EP0_IN);
        udc.run_completions(&mut drv);
        assert_eq!(udc.ep0.phase, Ep0Phase::Status);
        assert_eq!(udc.eps[EP0_OUT].queue.len(), 1);
        // internal request, nothing handed to the driver
        assert!(drv.completions.is_empty());

        finish_status(&mut udc, &mut drv, EP0_OUT);
        assert_eq!(udc.ep0.phase, Ep0Phase::Idle);
    }

    #[test]
    fn get_status_endpoint_reports_halt() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();
        udc.ep_enable(&crate::EpDescriptor {
            address: 0x81,
            attributes: 0x02,
            max_packet_size: 512,
        })
        .unwrap();
        udc.ep_set_halt(EpAddr::from_address(0x81), true).unwrap();

        deliver_setup(&mut udc, &mut drv, [0x82, 0x00, 0x00, 0x00, 0x81, 0x00, 0x02, 0x00]);
        assert_eq!(udc.ep0.status_buf, [0x01, 0x00]);
    }

    #[test]
    fn test_mode_applied_after_status() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        // SET_FEATURE(TEST_MODE), selector TEST_PACKET in the high byte of wIndex
        deliver_setup(&mut udc, &mut drv, [0x00, 0x03, 0x02, 0x00, 0x00, 0x04, 0x00, 0x00]);
        assert_eq!(udc.dev.test_mode, Some(ch9::TEST_PACKET));
        assert_eq!(udc.hw.read(Reg::PortSc, PORTSC_PTC), 0);

        finish_status(&mut udc, &mut drv, EP0_IN);
        assert_eq!(
            udc.hw.read(Reg::PortSc, PORTSC_PTC) >> PORTSC_PTC_SHIFT,
            ch9::TEST_PACKET as u32
        );
        assert_eq!(udc.dev.test_mode, None);
    }

    #[test]
    fn bad_test_selector_stalls_ep0() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0x00, 0x03, 0x02, 0x00, 0x00, 0x09, 0x00, 0x00]);
        assert_eq!(udc.dev.test_mode, None);
        assert_ne!(udc.hw.read(Reg::EndptCtrl(0), ENDPTCTRL_RXS), 0);
        assert_eq!(udc.ep0.phase, Ep0Phase::Idle);
    }

    #[test]
    fn clear_halt_respects_wedge() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();
        let addr = EpAddr::from_address(0x81);
        udc.ep_enable(&crate::EpDescriptor {
            address: 0x81,
            attributes: 0x02,
            max_packet_size: 512,
        })
        .unwrap();
        udc.ep_set_wedge(addr).unwrap();

        // CLEAR_FEATURE(ENDPOINT_HALT) on ep 0x81
        deliver_setup(&mut udc, &mut drv, [0x02, 0x01, 0x00, 0x00, 0x81, 0x00, 0x00, 0x00]);
        // handshake succeeds but the stall stays
        assert_eq!(udc.ep0.phase, Ep0Phase::Status);
        assert!(regs::ep_get_halt(&udc.hw, 1, Dir::Tx));

        udc.ep_set_halt(addr, false).unwrap();
        deliver_setup(&mut udc, &mut drv, [0x02, 0x01, 0x00, 0x00, 0x81, 0x00, 0x00, 0x00]);
        assert!(!regs::ep_get_halt(&udc.hw, 1, Dir::Tx));
    }

    #[test]
    fn remote_wakeup_feature_toggles() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(udc.dev.remote_wakeup);
        finish_status(&mut udc, &mut drv, EP0_IN);

        deliver_setup(&mut udc, &mut drv, [0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(!udc.dev.remote_wakeup);
    }

    #[test]
    fn class_requests_are_delegated() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        // class, interface recipient, IN data phase
        deliver_setup(&mut udc, &mut drv, [0xa1, 0x21, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        assert_eq!(drv.setups.len(), 1);
        assert_eq!(drv.setups[0].request, 0x21);
        assert_eq!(udc.ep0.dir, Dir::Tx);

        // the driver replies with a data phase
        let reply = Request::new(9, 0x3000_0000, 7);
        udc.ep_queue(EpAddr::from_address(0x80), reply).unwrap();
        assert_eq!(udc.ep0.phase, Ep0Phase::Data);
        assert_eq!(udc.eps[EP0_IN].queue.len(), 1);

        udc.retire_chain(EP0_IN, 0);
        udc.tr_complete_slot(EP0_IN);
        udc.run_completions(&mut drv);
        // the reply went back to the driver and the status phase is queued
        assert_eq!(drv.completions.len(), 1);
        assert_eq!(drv.completions[0].1.id, 9);
        assert_eq!(udc.ep0.phase, Ep0Phase::Status);
        assert_eq!(udc.eps[EP0_OUT].queue.len(), 1);
    }

    #[test]
    fn driver_error_stalls_ep0() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();
        drv.fail_setup = true;

        deliver_setup(&mut udc, &mut drv, [0x40, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_ne!(udc.hw.read(Reg::EndptCtrl(0), ENDPTCTRL_RXS), 0);
        assert_eq!(udc.ep0.phase, Ep0Phase::Idle);
    }

    #[test]
    fn no_data_delegated_request_status_is_in() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        // vendor OUT request without data
        deliver_setup(&mut udc, &mut drv, [0x40, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(udc.ep0.dir, Dir::Tx);

        // driver acknowledges with a zero-length reply: that is the status
        udc.ep_queue(EpAddr::from_address(0x80), Request::new(3, 0, 0)).unwrap();
        assert_eq!(udc.ep0.phase, Ep0Phase::Status);
        assert_eq!(udc.eps[EP0_IN].queue.len(), 1);

        udc.retire_chain(EP0_IN, 0);
        udc.tr_complete_slot(EP0_IN);
        udc.run_completions(&mut drv);
        assert_eq!(drv.completions.len(), 1);
        assert_eq!(udc.ep0.phase, Ep0Phase::Idle);
    }

    #[test]
    fn new_setup_displaces_pending_transfer() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0xa1, 0x21, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        udc.ep_queue(EpAddr::from_address(0x80), Request::new(9, 0x3000_0000, 7)).unwrap();

        // host gave up and sent a fresh SETUP
        deliver_setup(&mut udc, &mut drv, [0x00, 0x05, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00]);
        udc.run_completions(&mut drv);

        assert_eq!(drv.completions.len(), 1);
        assert_eq!(drv.completions[0].1.status, XferStatus::Shutdown);
        assert!(udc.dev.setaddr);
    }

    #[test]
    fn stale_ep0_reply_is_displaced_with_overflow() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0xa1, 0x21, 0x00, 0x00, 0x00, 0x00, 0x07, 0x00]);
        udc.ep_queue(EpAddr::from_address(0x80), Request::new(9, 0x3000_0000, 7)).unwrap();
        // the driver queues a second reply before the first went out
        udc.ep_queue(EpAddr::from_address(0x80), Request::new(10, 0x3000_0000, 7)).unwrap();
        udc.run_completions(&mut drv);

        assert_eq!(drv.completions.len(), 1);
        assert_eq!(drv.completions[0].1.id, 9);
        assert_eq!(drv.completions[0].1.status, XferStatus::Overflow);
        assert_eq!(udc.eps[EP0_IN].queue.front().unwrap().req.id, 10);
    }

    #[test]
    fn mailbox_copy_survives_tripwire_glitch() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();
        udc.hw.sutw_glitches.set(2);

        deliver_setup(&mut udc, &mut drv, [0x00, 0x05, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(udc.dev.address, 42);
        // tripwire left disarmed
        assert_eq!(udc.hw.read(Reg::UsbCmd, USBCMD_SUTW), 0);
    }

    #[test]
    fn set_configuration_tracked_and_delegated() {
        let mut udc = test_udc();
        let mut drv = TestDriver::new();

        deliver_setup(&mut udc, &mut drv, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(udc.dev.configured);
        assert_eq!(drv.setups.len(), 1);
        assert_eq!(drv.setups[0].request, ch9::REQ_SET_CONFIGURATION);

        deliver_setup(&mut udc, &mut drv, [0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(!udc.dev.configured);
    }

    #[test]
    fn ep0_is_control_type() {
        let udc = test_udc();
        assert_eq!(udc.eps[EP0_OUT].ty, EpType::Control);
        assert_eq!(udc.eps[EP0_IN].ty, EpType::Control);
        assert_eq!(udc.eps[EP0_OUT].max_packet, 64);
    }
}
