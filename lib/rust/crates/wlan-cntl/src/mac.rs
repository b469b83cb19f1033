// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use bitflags::bitflags;

pub type MacAddr = [u8; 6];
pub type Bssid = MacAddr;
pub type Ssid = Vec<u8>;
pub type ChannelNumber = u8;

pub const ZERO_ADDR: MacAddr = [0; 6];
pub const BCAST_ADDR: MacAddr = [0xFF; 6];

// IEEE Std 802.11-2016, 9.4.2.2
pub const MAX_SSID_LEN: usize = 32;
// Supported Rates and Extended Supported Rates combined.
pub const MAX_SUPPORTED_RATES: usize = 12;
// IEEE Std 802.11-2016, 9.4.1.8
pub const MAX_AID: u16 = 2007;
pub const AID_MASK: u16 = 0x3FFF;

// IEEE Std 802.11-2016, 9.4.1.4
bitflags! {
    #[derive(Default)]
    pub struct CapabilityInfo: u16 {
        const ESS = 1 << 0;
        const IBSS = 1 << 1;
        const CF_POLLABLE = 1 << 2;
        const CF_POLL_REQ = 1 << 3;
        const PRIVACY = 1 << 4;
        const SHORT_PREAMBLE = 1 << 5;
        const PBCC = 1 << 6;
        const CHANNEL_AGILITY = 1 << 7;
        const SPECTRUM_MGMT = 1 << 8;
        const QOS = 1 << 9;
        const SHORT_SLOT_TIME = 1 << 10;
        const APSD = 1 << 11;
        const RADIO_MEASUREMENT = 1 << 12;
        const DSSS_OFDM = 1 << 13;
    }
}

/// Capabilities this station is willing to claim in an association request.
/// Not CF-pollable and never requests CF polling.
pub const SUPPORTED_CAPABILITY_INFO: CapabilityInfo = CapabilityInfo::from_bits_truncate(
    CapabilityInfo::ESS.bits()
        | CapabilityInfo::IBSS.bits()
        | CapabilityInfo::PRIVACY.bits()
        | CapabilityInfo::SHORT_PREAMBLE.bits()
        | CapabilityInfo::SPECTRUM_MGMT.bits()
        | CapabilityInfo::SHORT_SLOT_TIME.bits(),
);

/// Result code carried by every confirmation exchanged between the state machines.
/// Values below 0x50 are IEEE status codes, the rest are local to the MLME.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);
impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    pub const UNSPECIFIED_FAILURE: Self = Self(1);
    pub const REJECTED_TIMEOUT: Self = Self(16);
    pub const INVALID_FORMAT: Self = Self(0x51);
    pub const FAIL_NO_RESOURCE: Self = Self(0x52);
    pub const STATE_MACHINE_REJECT: Self = Self(0x53);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

// IEEE Std 802.11-2016, 9.4.1.7
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReasonCode(pub u16);
impl ReasonCode {
    pub const UNSPECIFIED: Self = Self(1);
    pub const DEAUTH_STA_LEAVING: Self = Self(3);
    pub const CLASS3_FRAME_FROM_NONASSOC_STA: Self = Self(7);
    pub const DISASSOC_STA_LEAVING: Self = Self(8);
}

/// An SSID is usable for an active scan or an auto-reconnect when it is non-empty,
/// fits the element and is not made of NUL padding.
pub fn is_valid_ssid(ssid: &[u8]) -> bool {
    !ssid.is_empty() && ssid.len() <= MAX_SSID_LEN && ssid.iter().any(|&b| b != 0)
}

pub fn is_unicast(addr: &MacAddr) -> bool {
    addr[0] & 0x01 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_capability_mask() {
        assert_eq!(SUPPORTED_CAPABILITY_INFO.bits(), 0x0533);
        let cap = CapabilityInfo::ESS | CapabilityInfo::CF_POLLABLE | CapabilityInfo::PRIVACY;
        assert_eq!(cap & SUPPORTED_CAPABILITY_INFO, CapabilityInfo::ESS | CapabilityInfo::PRIVACY);
    }

    #[test]
    fn ssid_validity() {
        assert!(is_valid_ssid(b"foo"));
        assert!(!is_valid_ssid(b""));
        assert!(!is_valid_ssid(&[0u8; 32]));
        assert!(!is_valid_ssid(&[b'a'; 33]));
    }

    #[test]
    fn unicast_addr() {
        assert!(is_unicast(&[0x00, 1, 2, 3, 4, 5]));
        assert!(!is_unicast(&BCAST_ADDR));
    }
}
