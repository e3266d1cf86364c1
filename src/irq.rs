//! Device interrupt dispatch.
//!
//! One status read-and-acknowledge, then the events in fixed order: bus
//! reset first, port change, transfers, suspend last. Everything a handler
//! completes is parked and delivered to the driver once the queues are
//! consistent again.

use crate::ep0::EP0_OUT;
use crate::gadget::{GadgetDriver, Udc, UsbPhy};
use crate::regs::{
    self, Reg, UsbHw, USBMODE_CM, USBMODE_CM_DC, USBSTS_PCI, USBSTS_SLI, USBSTS_UEI, USBSTS_UI,
    USBSTS_URI,
};
use crate::{EpAddr, Speed, EP_SLOTS};

/// What [`Udc::handle_irq`] did with the interrupt, for shared-line
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqResult {
    /// The controller is not armed; the interrupt belongs to someone else.
    NotMine,
    /// Armed, but no enabled status bit was pending.
    NotHandled,
    Handled,
}

impl<HW: UsbHw, PHY: UsbPhy> Udc<HW, PHY> {
    /// Service the device interrupt. Call from the platform's handler with
    /// further controller interrupts masked.
    pub fn handle_irq<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) -> IrqResult {
        if !self.dev.started {
            return IrqResult::NotMine;
        }
        // shared bank: the other role may own the controller right now
        if self.config.regs_shared
            && self.hw.read(Reg::UsbMode, USBMODE_CM) != USBMODE_CM_DC
        {
            return IrqResult::NotMine;
        }

        let intr = regs::test_and_clear_intr_active(&mut self.hw);
        if intr == 0 {
            return IrqResult::NotHandled;
        }

        if intr & USBSTS_URI != 0 {
            self.isr_reset(driver);
        }
        if intr & USBSTS_PCI != 0 {
            self.isr_port_change(driver);
        }
        if intr & USBSTS_UEI != 0 {
            log::debug!("transaction error reported");
        }
        if intr & USBSTS_UI != 0 {
            self.isr_tr_complete(driver);
        }
        if intr & USBSTS_SLI != 0 {
            self.isr_suspend(driver);
        }

        self.run_completions(driver);
        IrqResult::Handled
    }

    /// Bus reset: drop all traffic, put the hardware back at address zero
    /// with clean FIFOs, re-arm endpoint 0 and tell the driver.
    fn isr_reset<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        log::debug!("bus reset");
        self.dev.skip_flush = false;
        self.stop_activity(driver);
        regs::usb_reset(&mut self.hw);
        let _ = self.enable_ep0();

        self.dev.address = 0;
        self.dev.setaddr = false;
        self.dev.test_mode = None;
        self.dev.b_hnp_enable = false;
        self.dev.a_hnp_support = false;

        driver.reset(self);
    }

    /// Port change doubles as resume notification: the port reports the
    /// negotiated speed, and leaving suspend shows up here first.
    fn isr_port_change<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        self.dev.speed = if regs::port_is_high_speed(&self.hw) {
            Speed::High
        } else {
            Speed::Full
        };

        if self.dev.suspended {
            self.dev.suspended = false;
            if let Some(phy) = self.phy.as_mut() {
                phy.set_suspend(false);
            }
            driver.resume(self);
        }
    }

    fn isr_suspend<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        if self.dev.speed == Speed::Unknown {
            return;
        }
        self.dev.suspended = true;
        if let Some(phy) = self.phy.as_mut() {
            phy.set_suspend(true);
        }
        driver.suspend(self);
    }

    /// Sweep retired transfers, then any pending SETUP on endpoint 0.
    fn isr_tr_complete<D: GadgetDriver<HW, PHY>>(&mut self, driver: &mut D) {
        for slot in 0..EP_SLOTS {
            let addr = EpAddr::from_slot(slot);

            if self.eps[slot].enabled {
                let bit = regs::ep_bit(addr.number(), addr.direction());
                if self.hw.test_and_clear(Reg::EndptComplete, bit) != 0 {
                    self.tr_complete_slot(slot);
                }
            }

            if slot == EP0_OUT && self.hw.test_and_clear(Reg::EndptSetupStat, 1) != 0 {
                // finish the old transfer's bookkeeping before the new SETUP
                // displaces it
                self.run_completions(driver);
                self.handle_setup(driver);
            }
        }
    }
}
