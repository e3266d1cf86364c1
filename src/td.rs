//! Hardware transfer descriptors (dTD), queue heads (dQH) and the fixed
//! descriptor arena.
//!
//! Both structures are read by the controller over DMA while the CPU owns
//! them logically, so every field is a `VolatileCell` and the arenas must sit
//! at stable, identity-mapped addresses for as long as the controller runs.

use core::mem::size_of;

use vcell::VolatileCell;

use crate::EP_SLOTS;

pub const PAGE_SIZE: u32 = 4096;
pub const TD_PAGE_COUNT: usize = 5;

pub const TD_TERMINATE: u32 = 1 << 0;
pub const TD_ADDR_MASK: u32 = 0xffff_ffe0;

pub const TD_IOC: u32 = 1 << 15;
pub const TD_TOTAL_BYTES: u32 = 0x7fff << 16;
pub const TD_TOTAL_BYTES_SHIFT: u32 = 16;

pub const TD_STATUS: u32 = 0xff;
pub const TD_STATUS_ACTIVE: u32 = 1 << 7;
pub const TD_STATUS_HALTED: u32 = 1 << 6;
pub const TD_STATUS_DT_ERR: u32 = 1 << 5;
pub const TD_STATUS_TR_ERR: u32 = 1 << 3;

pub const QH_IOS: u32 = 1 << 15;
pub const QH_MAX_PKT: u32 = 0x07ff << 16;
pub const QH_MAX_PKT_SHIFT: u32 = 16;
pub const QH_ZLT: u32 = 1 << 29;
pub const QH_MULT: u32 = 0x3 << 30;
pub const QH_MULT_SHIFT: u32 = 30;

/// Device-visible address of a descriptor-arena object.
///
/// The arenas live at identity-mapped addresses (see crate docs), so the bus
/// address is the CPU address.
pub(crate) fn dma_addr<T>(p: *const T) -> u32 {
    p as usize as u32
}

/// One transfer descriptor: 28 bytes of hardware layout padded to the
/// mandated 32-byte alignment.
#[repr(C, align(32))]
pub struct Td {
    next: VolatileCell<u32>,
    token: VolatileCell<u32>,
    page: [VolatileCell<u32>; TD_PAGE_COUNT],
    _pad: VolatileCell<u32>,
}

const _: () = assert!(size_of::<Td>() == 32);

impl Td {
    fn zeroed() -> Td {
        Td {
            next: VolatileCell::new(0),
            token: VolatileCell::new(0),
            page: [
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
            ],
            _pad: VolatileCell::new(0),
        }
    }

    pub(crate) fn next(&self) -> u32 {
        self.next.get()
    }

    pub(crate) fn set_next(&self, next: u32) {
        self.next.set(next);
    }

    pub(crate) fn token(&self) -> u32 {
        self.token.get()
    }

    pub(crate) fn set_token(&self, token: u32) {
        self.token.set(token);
    }

    pub(crate) fn or_token(&self, bits: u32) {
        self.token.set(self.token.get() | bits);
    }

    pub(crate) fn page(&self, i: usize) -> u32 {
        self.page[i].get()
    }

    pub(crate) fn set_page(&self, i: usize, addr: u32) {
        self.page[i].set(addr);
    }

    /// Reset the descriptor for a fresh `length`-byte transfer starting at
    /// bus address `dma`.
    pub(crate) fn init(&self, dma: u32, length: u32) {
        self.set_next(0);
        self._pad.set(0);
        let token = ((length << TD_TOTAL_BYTES_SHIFT) & TD_TOTAL_BYTES) | TD_STATUS_ACTIVE;
        self.set_token(token);
        for i in 0..TD_PAGE_COUNT {
            self.page[i].set(0);
        }
        if length > 0 {
            self.set_page(0, dma);
            for i in 1..TD_PAGE_COUNT {
                // subsequent page pointers are page-aligned continuations
                self.set_page(i, (dma + i as u32 * PAGE_SIZE) & !(PAGE_SIZE - 1));
            }
        }
    }
}

/// One endpoint queue head: the controller's view of where the next chain
/// starts, plus the SETUP mailbox on control OUT endpoints.
#[repr(C, align(64))]
pub struct Qh {
    cap: VolatileCell<u32>,
    curr: VolatileCell<u32>,
    td_next: VolatileCell<u32>,
    td_token: VolatileCell<u32>,
    td_page: [VolatileCell<u32>; TD_PAGE_COUNT],
    _reserved: VolatileCell<u32>,
    setup: [VolatileCell<u8>; 8],
    _pad: [VolatileCell<u32>; 4],
}

const _: () = assert!(size_of::<Qh>() == 64);

impl Qh {
    fn zeroed() -> Qh {
        Qh {
            cap: VolatileCell::new(0),
            curr: VolatileCell::new(0),
            td_next: VolatileCell::new(0),
            td_token: VolatileCell::new(0),
            td_page: [
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
            ],
            _reserved: VolatileCell::new(0),
            setup: [
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
            ],
            _pad: [
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
                VolatileCell::new(0),
            ],
        }
    }

    pub(crate) fn cap(&self) -> u32 {
        self.cap.get()
    }

    pub(crate) fn set_cap(&self, cap: u32) {
        self.cap.set(cap);
    }

    pub(crate) fn td_next(&self) -> u32 {
        self.td_next.get()
    }

    pub(crate) fn set_td_next(&self, next: u32) {
        self.td_next.set(next);
    }

    pub(crate) fn td_token(&self) -> u32 {
        self.td_token.get()
    }

    pub(crate) fn and_td_token(&self, mask: u32) {
        self.td_token.set(self.td_token.get() & mask);
    }

    pub(crate) fn setup_byte(&self, i: usize) -> u8 {
        self.setup[i].get()
    }

    #[cfg(test)]
    pub(crate) fn set_setup(&self, raw: [u8; 8]) {
        for (cell, b) in self.setup.iter().zip(raw) {
            cell.set(b);
        }
    }
}

pub(crate) const TD_POOL_SIZE: usize = 64;

/// Handle into the descriptor arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TdHandle(u8);

/// Fixed arena of transfer descriptors with a free map. The descriptors
/// themselves never move; handles index into the arena and bus addresses are
/// derived from the entry's own location.
pub struct TdPool {
    tds: [Td; TD_POOL_SIZE],
    used: [bool; TD_POOL_SIZE],
}

impl TdPool {
    pub(crate) fn new() -> TdPool {
        TdPool {
            tds: core::array::from_fn(|_| Td::zeroed()),
            used: [false; TD_POOL_SIZE],
        }
    }

    pub(crate) fn alloc(&mut self) -> Option<TdHandle> {
        let i = self.used.iter().position(|u| !u)?;
        self.used[i] = true;
        TdHandle::try_from_index(i)
    }

    pub(crate) fn free(&mut self, h: TdHandle) {
        debug_assert!(self.used[h.0 as usize]);
        self.used[h.0 as usize] = false;
    }

    pub(crate) fn td(&self, h: TdHandle) -> &Td {
        &self.tds[h.0 as usize]
    }

    pub(crate) fn dma_of(&self, h: TdHandle) -> u32 {
        dma_addr(&self.tds[h.0 as usize] as *const Td)
    }

    pub(crate) fn in_use(&self) -> usize {
        self.used.iter().filter(|u| **u).count()
    }
}

impl TdHandle {
    fn try_from_index(i: usize) -> Option<TdHandle> {
        u8::try_from(i).ok().map(TdHandle)
    }
}

/// The per-endpoint queue heads, laid out as the hardware's endpoint list:
/// one 64-byte entry per endpoint half, OUT/IN interleaved by the hardware's
/// convention of even/odd — here kept as [OUT 0..16 | IN 16..32] and mapped
/// through [`QhPool::qh`].
pub struct QhPool {
    qhs: [Qh; EP_SLOTS],
}

impl QhPool {
    pub(crate) fn new() -> QhPool {
        QhPool {
            qhs: core::array::from_fn(|_| Qh::zeroed()),
        }
    }

    pub(crate) fn qh(&self, slot: usize) -> &Qh {
        &self.qhs[slot]
    }

    /// Bus address of the endpoint list base, programmed into ENDPTLISTADDR.
    pub(crate) fn list_addr(&self) -> u32 {
        dma_addr(&self.qhs[0] as *const Qh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn td_init_builds_page_list() {
        let pool = TdPool::new();
        let td = &pool.tds[0];
        td.init(0x1000_0010, 8192);

        let token = td.token();
        assert_ne!(token & TD_STATUS_ACTIVE, 0);
        assert_eq!((token & TD_TOTAL_BYTES) >> TD_TOTAL_BYTES_SHIFT, 8192);
        assert_eq!(td.page(0), 0x1000_0010);
        assert_eq!(td.page(1), 0x1000_1000);
        assert_eq!(td.page(4), 0x1000_4000);
    }

    #[test]
    fn zero_length_td_has_no_pages() {
        let pool = TdPool::new();
        let td = &pool.tds[1];
        td.init(0x2000_0000, 0);
        assert_eq!(td.page(0), 0);
        assert_eq!((td.token() & TD_TOTAL_BYTES) >> TD_TOTAL_BYTES_SHIFT, 0);
    }

    #[test]
    fn pool_alloc_free_exhaustion() {
        let mut pool = TdPool::new();
        let mut handles = std::vec::Vec::new();
        for _ in 0..TD_POOL_SIZE {
            handles.push(pool.alloc().unwrap());
        }
        assert!(pool.alloc().is_none());
        assert_eq!(pool.in_use(), TD_POOL_SIZE);

        pool.free(handles[10]);
        let h = pool.alloc().unwrap();
        assert_eq!(h, handles[10]);
    }

    #[test]
    fn dma_addresses_are_aligned_and_distinct() {
        let pool = TdPool::new();
        let a = pool.dma_of(TdHandle(0));
        let b = pool.dma_of(TdHandle(1));
        assert_eq!(a % 32, 0);
        assert_eq!(b, a + 32);
        assert_eq!(a & TD_ADDR_MASK, a);

        let qhs = QhPool::new();
        assert_eq!(qhs.list_addr() % 64, 0);
    }
}
