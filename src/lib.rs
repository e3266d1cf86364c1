//! Driver core for ChipIdea-style high-speed USB device controllers.
//!
//! The controller hardware executes chains of transfer descriptors (dTDs)
//! hanging off per-endpoint queue heads (dQHs), signalled through a
//! prime/flush register handshake. This crate turns that into a queue of
//! [`Request`]s with completion callbacks, runs the endpoint-0 control
//! protocol, and dispatches the device interrupt.
//!
//! Platform integration happens at two seams:
//!
//! - [`UsbHw`]: register accessor plus a millisecond clock, implemented by
//!   the platform glue over the memory-mapped register bank.
//! - [`GadgetDriver`]: the function driver that owns the gadget; it gets
//!   `setup()`/`suspend()`/`resume()`/`disconnect()` notifications and the
//!   completed requests handed back.
//!
//! All entry points take `&mut self`. The platform glue is responsible for
//! serializing interrupt-context and thread-context calls (interrupts masked
//! on the local core while a call is in flight); callbacks are only ever
//! delivered after the driver's internal queues are consistent, so a callback
//! may re-enter `ep_queue`/`ep_dequeue` freely.
//!
//! The controller's descriptor arenas are DMA-visible: the [`Udc`] value must
//! be placed at a stable, identity-mapped address (a `static`, or memory the
//! platform reserves for it) before the hardware is started.

#![cfg_attr(not(test), no_std)]

pub mod ch9;
pub mod error;
mod endpoint;
mod ep0;
mod gadget;
mod irq;
pub mod regs;
mod request;
mod td;

#[cfg(test)]
pub(crate) mod testutil;

pub use endpoint::EpDescriptor;
pub use error::{Result, UdcError};
pub use gadget::{DeviceState, GadgetDriver, NoPhy, Udc, UdcConfig, UsbPhy};
pub use irq::IrqResult;
pub use regs::UsbHw;
pub use request::{Request, XferStatus};

/// Endpoint slots per direction. Slot index = number, OUT half first.
pub(crate) const EP_DIR_SLOTS: usize = 16;
/// Total endpoint slots (OUT 0..16, IN 16..32).
pub(crate) const EP_SLOTS: usize = 2 * EP_DIR_SLOTS;

/// Transfer direction, seen from the host: `Rx` is OUT (host to device),
/// `Tx` is IN (device to host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Rx,
    Tx,
}

impl Dir {
    pub fn is_tx(self) -> bool {
        self == Dir::Tx
    }

    /// Short tag for log lines, matching the usual epNin/epNout naming.
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Dir::Rx => "out",
            Dir::Tx => "in",
        }
    }

    pub(crate) fn other(self) -> Dir {
        match self {
            Dir::Rx => Dir::Tx,
            Dir::Tx => Dir::Rx,
        }
    }
}

/// Endpoint transfer type, encoded as in bmAttributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl EpType {
    pub fn from_attributes(attr: u8) -> EpType {
        match attr & 0x03 {
            0 => EpType::Control,
            1 => EpType::Isochronous,
            2 => EpType::Bulk,
            _ => EpType::Interrupt,
        }
    }
}

/// Negotiated bus speed, latched on each port-change interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Unknown,
    Full,
    High,
}

/// Endpoint address in wire encoding: number in the low nibble, direction
/// in bit 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpAddr(u8);

impl EpAddr {
    pub const fn new(num: u8, dir: Dir) -> EpAddr {
        EpAddr(num & 0x0f | if matches!(dir, Dir::Tx) { ch9::DIR_IN } else { 0 })
    }

    pub const fn from_address(addr: u8) -> EpAddr {
        EpAddr(addr & (ch9::DIR_IN | 0x0f))
    }

    pub const fn number(self) -> u8 {
        self.0 & 0x0f
    }

    pub const fn direction(self) -> Dir {
        if self.0 & ch9::DIR_IN != 0 {
            Dir::Tx
        } else {
            Dir::Rx
        }
    }

    pub const fn address(self) -> u8 {
        self.0
    }

    pub(crate) const fn slot(self) -> usize {
        self.number() as usize
            + if self.0 & ch9::DIR_IN != 0 {
                EP_DIR_SLOTS
            } else {
                0
            }
    }

    pub(crate) fn from_slot(slot: usize) -> EpAddr {
        if slot >= EP_DIR_SLOTS {
            EpAddr::new((slot - EP_DIR_SLOTS) as u8, Dir::Tx)
        } else {
            EpAddr::new(slot as u8, Dir::Rx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ep_addr_round_trip() {
        let a = EpAddr::new(3, Dir::Tx);
        assert_eq!(a.address(), 0x83);
        assert_eq!(a.number(), 3);
        assert_eq!(a.direction(), Dir::Tx);
        assert_eq!(a.slot(), 3 + EP_DIR_SLOTS);
        assert_eq!(EpAddr::from_slot(a.slot()), a);

        let b = EpAddr::from_address(0x02);
        assert_eq!(b.direction(), Dir::Rx);
        assert_eq!(b.slot(), 2);
    }
}
