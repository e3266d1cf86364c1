//! USB 2.0 chapter 9 wire constants and the SETUP packet layout.

pub const DIR_OUT: u8 = 0x00;
pub const DIR_IN: u8 = 0x80;

pub const TYPE_MASK: u8 = 0x60;
pub const TYPE_STANDARD: u8 = 0x00;
pub const TYPE_CLASS: u8 = 0x20;
pub const TYPE_VENDOR: u8 = 0x40;

pub const RECIP_MASK: u8 = 0x1f;
pub const RECIP_DEVICE: u8 = 0x00;
pub const RECIP_INTERFACE: u8 = 0x01;
pub const RECIP_ENDPOINT: u8 = 0x02;

pub const REQ_GET_STATUS: u8 = 0x00;
pub const REQ_CLEAR_FEATURE: u8 = 0x01;
pub const REQ_SET_FEATURE: u8 = 0x03;
pub const REQ_SET_ADDRESS: u8 = 0x05;
pub const REQ_GET_DESCRIPTOR: u8 = 0x06;
pub const REQ_SET_CONFIGURATION: u8 = 0x09;

pub const FEAT_ENDPOINT_HALT: u16 = 0x00;
pub const FEAT_DEVICE_REMOTE_WAKEUP: u16 = 0x01;
pub const FEAT_DEVICE_TEST_MODE: u16 = 0x02;
pub const FEAT_B_HNP_ENABLE: u16 = 0x03;
pub const FEAT_A_HNP_SUPPORT: u16 = 0x04;
pub const FEAT_A_ALT_HNP_SUPPORT: u16 = 0x05;

/// wIndex selector for the OTG host-request status byte.
pub const OTG_STATUS_SELECTOR: u16 = 0xf000;
pub const HOST_REQUEST_FLAG: u8 = 0;

/// GET_STATUS(device) response bit positions.
pub const STATUS_SELF_POWERED: u16 = 1 << 0;
pub const STATUS_REMOTE_WAKEUP: u16 = 1 << 1;

pub const ENDPOINT_NUMBER_MASK: u16 = 0x0f;
pub const ENDPOINT_DIR_MASK: u16 = 0x80;

/// Test mode selectors, carried in the high byte of wIndex.
pub const TEST_J: u8 = 1;
pub const TEST_K: u8 = 2;
pub const TEST_SE0_NAK: u8 = 3;
pub const TEST_PACKET: u8 = 4;
pub const TEST_FORCE_EN: u8 = 5;

/// Control endpoint payload limit (both speeds use 64 here).
pub const CTRL_PAYLOAD_MAX: u16 = 64;

/// The 8-byte SETUP packet, decoded from the queue-head mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn from_bytes(raw: [u8; 8]) -> SetupPacket {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    pub fn is_in(&self) -> bool {
        self.request_type & DIR_IN != 0
    }

    pub fn recipient(&self) -> u8 {
        self.request_type & RECIP_MASK
    }
}
