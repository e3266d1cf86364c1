//! Test doubles: a register-bank mock with just enough controller behavior
//! (prime latching, flush handshake, write-one-to-clear status) and a
//! recording function driver.

use core::cell::Cell;

use crate::ch9::SetupPacket;
use crate::error::{Result, UdcError};
use crate::gadget::{GadgetDriver, NoPhy, Udc, UdcConfig};
use crate::regs::{self, Reg, UsbHw, USBCMD_RST, USBCMD_SUTW};
use crate::request::Request;
use crate::td::{TD_IOC, TD_TOTAL_BYTES, TD_TOTAL_BYTES_SHIFT};
use crate::EpAddr;

const REG_COUNT: usize = 12 + 16;

fn idx(reg: Reg) -> usize {
    match reg {
        Reg::UsbCmd => 0,
        Reg::UsbSts => 1,
        Reg::UsbIntr => 2,
        Reg::UsbMode => 3,
        Reg::DeviceAddr => 4,
        Reg::EndptListAddr => 5,
        Reg::PortSc => 6,
        Reg::EndptSetupStat => 7,
        Reg::EndptPrime => 8,
        Reg::EndptFlush => 9,
        Reg::EndptStat => 10,
        Reg::EndptComplete => 11,
        Reg::EndptCtrl(n) => 12 + n as usize,
    }
}

pub(crate) struct MockHw {
    regs: [u32; REG_COUNT],
    now_us: Cell<u64>,
    /// Primes are acknowledged instantly: the endpoint status bit latches
    /// and the prime bit reads back clear. With this off, primes vanish.
    pub auto_latch_prime: bool,
    /// The flush handshake never completes.
    pub stuck_flush: bool,
    /// Reads of the setup tripwire report it knocked down this many times.
    pub sutw_glitches: Cell<u8>,
    pub prime_writes: u32,
}

impl MockHw {
    pub(crate) fn new() -> MockHw {
        MockHw {
            regs: [0; REG_COUNT],
            now_us: Cell::new(0),
            auto_latch_prime: true,
            stuck_flush: false,
            sutw_glitches: Cell::new(0),
            prime_writes: 0,
        }
    }

    pub(crate) fn set_reg(&mut self, reg: Reg, value: u32) {
        self.regs[idx(reg)] = value;
    }

    pub(crate) fn clear_reg_bits(&mut self, reg: Reg, mask: u32) {
        self.regs[idx(reg)] &= !mask;
    }

    pub(crate) fn advance(&self, ms: u64) {
        self.now_us.set(self.now_us.get() + ms * 1000);
    }
}

impl UsbHw for MockHw {
    fn read(&self, reg: Reg, mask: u32) -> u32 {
        let mut v = self.regs[idx(reg)];
        if reg == Reg::UsbCmd && mask & USBCMD_SUTW != 0 && self.sutw_glitches.get() > 0 {
            self.sutw_glitches.set(self.sutw_glitches.get() - 1);
            v &= !USBCMD_SUTW;
        }
        v & mask
    }

    fn write(&mut self, reg: Reg, mask: u32, value: u32) {
        let bits = value & mask;
        match reg {
            // write-one-to-clear latches
            Reg::UsbSts | Reg::EndptSetupStat | Reg::EndptComplete => {
                self.regs[idx(reg)] &= !bits;
            }
            Reg::EndptPrime => {
                if bits != 0 {
                    self.prime_writes += 1;
                    if self.auto_latch_prime {
                        self.regs[idx(Reg::EndptStat)] |= bits;
                    }
                }
            }
            Reg::EndptFlush => {
                if self.stuck_flush {
                    self.regs[idx(reg)] |= bits;
                } else {
                    self.regs[idx(Reg::EndptStat)] &= !bits;
                    self.regs[idx(reg)] &= !bits;
                }
            }
            Reg::UsbCmd => {
                let i = idx(reg);
                self.regs[i] = (self.regs[i] & !mask) | bits;
                // controller reset completes immediately
                self.regs[i] &= !USBCMD_RST;
            }
            _ => {
                let i = idx(reg);
                self.regs[i] = (self.regs[i] & !mask) | bits;
            }
        }
    }

    fn test_and_clear(&mut self, reg: Reg, mask: u32) -> u32 {
        let prior = self.regs[idx(reg)] & mask;
        self.regs[idx(reg)] &= !mask;
        prior
    }

    fn barrier(&self) {}

    fn now_ms(&self) -> u64 {
        self.now_us.get() / 1000
    }

    fn delay_us(&self, us: u32) {
        self.now_us.set(self.now_us.get() + us as u64);
    }
}

pub(crate) type TestUdc = Udc<MockHw, NoPhy>;

/// A started controller over the mock, with endpoint 0 armed.
pub(crate) fn test_udc() -> TestUdc {
    let mut udc = Udc::new(MockHw::new(), UdcConfig::default());
    let mut drv = TestDriver::new();
    udc.start(&mut drv).unwrap();
    udc
}

/// Pull parked completions out without involving a driver.
pub(crate) fn drain_completions(udc: &mut TestUdc) -> Vec<(EpAddr, Request)> {
    let mut out = Vec::new();
    while let Some(c) = udc.completions.pop_front() {
        out.push((c.addr, c.req));
    }
    out
}

impl TestUdc {
    /// Pretend the hardware retired the chain at the front of `slot`,
    /// leaving `remaining` untransferred bytes on the final descriptor.
    pub(crate) fn retire_chain(&mut self, slot: usize, remaining: u32) {
        let front = self.eps[slot].queue.front().expect("nothing queued");
        let n = front.tds.len();
        for (i, entry) in front.tds.iter().enumerate() {
            let left = if i == n - 1 { remaining } else { 0 };
            let td = self.tds.td(entry.handle);
            let token =
                ((left << TD_TOTAL_BYTES_SHIFT) & TD_TOTAL_BYTES) | (td.token() & TD_IOC);
            td.set_token(token);
        }

        let addr = EpAddr::from_slot(slot);
        let bit = regs::ep_bit(addr.number(), addr.direction());
        self.hw.clear_reg_bits(Reg::EndptStat, bit);
    }
}

pub(crate) struct TestDriver {
    pub setups: Vec<SetupPacket>,
    pub completions: Vec<(EpAddr, Request)>,
    pub resets: u32,
    pub suspends: u32,
    pub resumes: u32,
    pub disconnects: u32,
    pub fail_setup: bool,
}

impl TestDriver {
    pub(crate) fn new() -> TestDriver {
        TestDriver {
            setups: Vec::new(),
            completions: Vec::new(),
            resets: 0,
            suspends: 0,
            resumes: 0,
            disconnects: 0,
            fail_setup: false,
        }
    }
}

impl GadgetDriver<MockHw, NoPhy> for TestDriver {
    fn setup(&mut self, _udc: &mut TestUdc, setup: &SetupPacket) -> Result<()> {
        self.setups.push(*setup);
        if self.fail_setup {
            Err(UdcError::NotSupported)
        } else {
            Ok(())
        }
    }

    fn complete(&mut self, _udc: &mut TestUdc, addr: EpAddr, req: Request) {
        self.completions.push((addr, req));
    }

    fn reset(&mut self, _udc: &mut TestUdc) {
        self.resets += 1;
    }

    fn suspend(&mut self, _udc: &mut TestUdc) {
        self.suspends += 1;
    }

    fn resume(&mut self, _udc: &mut TestUdc) {
        self.resumes += 1;
    }

    fn disconnect(&mut self, _udc: &mut TestUdc) {
        self.disconnects += 1;
    }
}
