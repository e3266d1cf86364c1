//! Register map, bit definitions and the hardware accessor seam.
//!
//! The driver never touches memory-mapped registers directly; everything goes
//! through [`UsbHw`], which the platform glue implements over the operational
//! register bank. Masked read/write keeps the register knowledge here while
//! the glue stays a dumb bus accessor.

use crate::error::{Result, UdcError};
use crate::Dir;

/// Operational registers of the device controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    UsbCmd,
    UsbSts,
    UsbIntr,
    UsbMode,
    DeviceAddr,
    EndptListAddr,
    PortSc,
    EndptSetupStat,
    EndptPrime,
    EndptFlush,
    EndptStat,
    EndptComplete,
    /// Per-endpoint-pair control register (stall/type/enable for both halves).
    EndptCtrl(u8),
}

/// Register accessor contract, plus the time primitives the bounded poll
/// loops and deferred work need.
///
/// `read`/`write` operate under a bit mask so read-modify-write stays inside
/// the implementation; `test_and_*` must be atomic with respect to the
/// interrupt handler (in practice: called with interrupts masked).
pub trait UsbHw {
    fn read(&self, reg: Reg, mask: u32) -> u32;
    fn write(&mut self, reg: Reg, mask: u32, value: u32);
    /// Write-one-to-clear `mask`, returning the prior masked value.
    fn test_and_clear(&mut self, reg: Reg, mask: u32) -> u32;
    /// Full barrier ordering CPU stores against device descriptor fetches.
    fn barrier(&self);
    fn now_ms(&self) -> u64;
    fn delay_us(&self, us: u32);
}

pub const USBCMD_RS: u32 = 1 << 0;
pub const USBCMD_RST: u32 = 1 << 1;
/// Setup tripwire: guards the 8-byte SETUP mailbox copy.
pub const USBCMD_SUTW: u32 = 1 << 13;
/// Add-dTD tripwire: guards tail-linking onto an executing chain.
pub const USBCMD_ATDTW: u32 = 1 << 14;

pub const USBSTS_UI: u32 = 1 << 0;
pub const USBSTS_UEI: u32 = 1 << 1;
pub const USBSTS_PCI: u32 = 1 << 2;
pub const USBSTS_URI: u32 = 1 << 6;
pub const USBSTS_SLI: u32 = 1 << 8;

pub const USBMODE_CM: u32 = 0x3;
pub const USBMODE_CM_DC: u32 = 0x2;
pub const USBMODE_SLOM: u32 = 1 << 3;
pub const USBMODE_SDIS: u32 = 1 << 4;

pub const DEVICEADDR_USBADR: u32 = 0xfe00_0000;
pub const DEVICEADDR_USBADR_SHIFT: u32 = 25;

pub const PORTSC_FPR: u32 = 1 << 6;
pub const PORTSC_SUSP: u32 = 1 << 7;
pub const PORTSC_HSP: u32 = 1 << 9;
pub const PORTSC_PTC: u32 = 0xf << 16;
pub const PORTSC_PTC_SHIFT: u32 = 16;

pub const ENDPTCTRL_RXS: u32 = 1 << 0;
pub const ENDPTCTRL_RXT: u32 = 0x3 << 2;
pub const ENDPTCTRL_RXT_SHIFT: u32 = 2;
pub const ENDPTCTRL_RXR: u32 = 1 << 6;
pub const ENDPTCTRL_RXE: u32 = 1 << 7;
pub const ENDPTCTRL_TXS: u32 = 1 << 16;
pub const ENDPTCTRL_TXT: u32 = 0x3 << 18;
pub const ENDPTCTRL_TXT_SHIFT: u32 = 18;
pub const ENDPTCTRL_TXR: u32 = 1 << 22;
pub const ENDPTCTRL_TXE: u32 = 1 << 23;

/// Interrupts the device role cares about: transfer, error, port change,
/// reset, suspend.
pub const DEVICE_INTR_MASK: u32 = USBSTS_UI | USBSTS_UEI | USBSTS_PCI | USBSTS_URI | USBSTS_SLI;

/// Bounded-poll budget for flush/prime handshakes.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 25;
/// Bounded-poll budget for the add-dTD tripwire dance.
pub const ATDTW_TIMEOUT_MS: u64 = 100;

/// Bit number for an endpoint in the prime/flush/stat/complete registers:
/// RX in the low half, TX in the high half.
pub(crate) fn ep_bit(num: u8, dir: Dir) -> u32 {
    1 << (num as u32 + if dir.is_tx() { 16 } else { 0 })
}

/// Flush any pending transfer out of an endpoint FIFO.
///
/// The flush bit occasionally refuses to latch; poll-and-retry for the
/// handshake budget and report failure to the caller, which degrades the
/// endpoint rather than spinning forever.
pub(crate) fn ep_flush<HW: UsbHw>(hw: &mut HW, num: u8, dir: Dir) -> Result<()> {
    let bit = ep_bit(num, dir);
    let start = hw.now_ms();

    loop {
        hw.write(Reg::EndptFlush, bit, bit);
        while hw.read(Reg::EndptFlush, bit) != 0 {
            if hw.now_ms() - start > HANDSHAKE_TIMEOUT_MS {
                log::error!("failed to flush ep{}{}", num, dir.tag());
                return Err(UdcError::WouldBlock);
            }
            hw.delay_us(10);
        }
        if hw.read(Reg::EndptStat, bit) == 0 {
            return Ok(());
        }
        if hw.now_ms() - start > HANDSHAKE_TIMEOUT_MS {
            log::error!("failed to flush ep{}{}", num, dir.tag());
            return Err(UdcError::WouldBlock);
        }
    }
}

pub(crate) fn ep_enable_hw<HW: UsbHw>(hw: &mut HW, num: u8, dir: Dir, ty: u8) {
    let (mask, data) = if dir.is_tx() {
        (
            ENDPTCTRL_TXT | ENDPTCTRL_TXS | ENDPTCTRL_TXR | ENDPTCTRL_TXE,
            ((ty as u32) << ENDPTCTRL_TXT_SHIFT) | ENDPTCTRL_TXR | ENDPTCTRL_TXE,
        )
    } else {
        (
            ENDPTCTRL_RXT | ENDPTCTRL_RXS | ENDPTCTRL_RXR | ENDPTCTRL_RXE,
            ((ty as u32) << ENDPTCTRL_RXT_SHIFT) | ENDPTCTRL_RXR | ENDPTCTRL_RXE,
        )
    };
    hw.write(Reg::EndptCtrl(num), mask, data);
    // endpoint must be live before any descriptor is primed on it
    hw.barrier();
}

pub(crate) fn ep_disable_hw<HW: UsbHw>(hw: &mut HW, num: u8, dir: Dir) {
    let mask = if dir.is_tx() {
        ENDPTCTRL_TXE
    } else {
        ENDPTCTRL_RXE
    };
    hw.write(Reg::EndptCtrl(num), mask, 0);
}

pub(crate) fn ep_get_halt<HW: UsbHw>(hw: &HW, num: u8, dir: Dir) -> bool {
    let mask = if dir.is_tx() {
        ENDPTCTRL_TXS
    } else {
        ENDPTCTRL_RXS
    };
    hw.read(Reg::EndptCtrl(num), mask) != 0
}

/// Stall or unstall one endpoint half; clearing also resets the data toggle.
/// A pending SETUP token on the pair makes the stall moot, so it is skipped.
pub(crate) fn ep_set_halt_hw<HW: UsbHw>(hw: &mut HW, num: u8, dir: Dir, value: bool) {
    loop {
        let (mask_xs, mask_xr) = if dir.is_tx() {
            (ENDPTCTRL_TXS, ENDPTCTRL_TXR)
        } else {
            (ENDPTCTRL_RXS, ENDPTCTRL_RXR)
        };

        if hw.read(Reg::EndptSetupStat, 1 << num) != 0 {
            return;
        }
        hw.write(
            Reg::EndptCtrl(num),
            mask_xs | mask_xr,
            if value { mask_xs } else { mask_xr },
        );
        if value == ep_get_halt(hw, num, dir) {
            return;
        }
    }
}

/// Tell the hardware a fresh chain is hanging off the queue head.
///
/// On a control OUT endpoint a SETUP token arriving around the prime makes
/// the prime invalid; the status register check before and after catches the
/// race.
pub(crate) fn ep_prime<HW: UsbHw>(hw: &mut HW, num: u8, dir: Dir, is_ctrl: bool) -> Result<()> {
    if is_ctrl && dir == Dir::Rx && hw.read(Reg::EndptSetupStat, 1 << num) != 0 {
        return Err(UdcError::WouldBlock);
    }

    let bit = ep_bit(num, dir);
    hw.write(Reg::EndptPrime, bit, bit);

    if is_ctrl && dir == Dir::Rx && hw.read(Reg::EndptSetupStat, 1 << num) != 0 {
        return Err(UdcError::WouldBlock);
    }
    // the manual says to verify ENDPTSTAT here, but that check misfires
    Ok(())
}

pub(crate) fn set_address<HW: UsbHw>(hw: &mut HW, value: u8) {
    // explicit write, no address-advance: older controller revisions lack it
    hw.write(
        Reg::DeviceAddr,
        DEVICEADDR_USBADR,
        (value as u32) << DEVICEADDR_USBADR_SHIFT,
    );
}

pub(crate) fn port_is_high_speed<HW: UsbHw>(hw: &HW) -> bool {
    hw.read(Reg::PortSc, PORTSC_HSP) != 0
}

pub(crate) fn port_test_set<HW: UsbHw>(hw: &mut HW, mode: u8) {
    hw.write(Reg::PortSc, PORTSC_PTC, (mode as u32) << PORTSC_PTC_SHIFT);
}

/// Pending-and-enabled interrupt bits, read and acknowledged in one go.
pub(crate) fn test_and_clear_intr_active<HW: UsbHw>(hw: &mut HW) -> u32 {
    let active = hw.read(Reg::UsbSts, !0) & hw.read(Reg::UsbIntr, !0);
    hw.write(Reg::UsbSts, !0, active);
    active
}

/// Arm or disarm the whole device role: endpoint list base, stream-disable
/// policy and the interrupt mask.
pub(crate) fn device_state<HW: UsbHw>(hw: &mut HW, dma: u32, streaming: bool) {
    if dma != 0 {
        if streaming {
            hw.write(Reg::UsbMode, USBMODE_SDIS, 0);
        } else {
            hw.write(Reg::UsbMode, USBMODE_SDIS, USBMODE_SDIS);
        }
        hw.write(Reg::EndptListAddr, !0, dma);
        hw.write(Reg::UsbIntr, !0, DEVICE_INTR_MASK);
    } else {
        hw.write(Reg::UsbIntr, !0, 0);
    }
}

/// Reset the controller and drop it into device mode. Not used when the
/// register bank is shared and owned by the other role.
pub(crate) fn device_reset<HW: UsbHw>(hw: &mut HW) -> Result<()> {
    hw.write(Reg::UsbCmd, USBCMD_RS, 0);
    hw.write(Reg::UsbCmd, USBCMD_RST, USBCMD_RST);

    let start = hw.now_ms();
    while hw.read(Reg::UsbCmd, USBCMD_RST) != 0 {
        if hw.now_ms() - start > HANDSHAKE_TIMEOUT_MS {
            log::error!("controller reset did not complete");
            return Err(UdcError::WouldBlock);
        }
        hw.delay_us(10);
    }

    hw.write(Reg::UsbMode, USBMODE_CM, USBMODE_CM_DC);
    // setup lockout off; the SUTW tripwire protects the mailbox instead
    hw.write(Reg::UsbMode, USBMODE_SLOM, USBMODE_SLOM);
    Ok(())
}

/// Restart the device side after a bus reset: address 0, every FIFO flushed,
/// stale setup/complete status dropped.
pub(crate) fn usb_reset<HW: UsbHw>(hw: &mut HW) {
    set_address(hw, 0);
    hw.write(Reg::EndptFlush, !0, !0);

    let stale = hw.read(Reg::EndptSetupStat, !0);
    hw.write(Reg::EndptSetupStat, !0, stale);
    let stale = hw.read(Reg::EndptComplete, !0);
    hw.write(Reg::EndptComplete, !0, stale);

    let mut delay_count = 10;
    while delay_count > 0 && hw.read(Reg::EndptPrime, !0) != 0 {
        hw.delay_us(10);
        delay_count -= 1;
    }
    if delay_count == 0 && hw.read(Reg::EndptPrime, !0) != 0 {
        log::error!("ENDPTPRIME not cleared during bus reset");
    }
}
