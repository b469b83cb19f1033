// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        mac::{Bssid, CapabilityInfo, ChannelNumber, MacAddr, ReasonCode, Ssid},
    },
    bytes::Bytes,
};

#[cfg(test)]
pub use test_utils::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkStatus(u8);
impl LinkStatus {
    pub const DOWN: Self = Self(0);
    pub const UP: Self = Self(1);
}

/// Payload of an association or reassociation request. The framing layer owns the
/// header and byte layout.
#[derive(Clone, Debug, PartialEq)]
pub struct AssocReqFrame {
    pub bssid: Bssid,
    pub capability: CapabilityInfo,
    pub listen_interval: u16,
    pub ssid: Ssid,
    pub rates: Vec<u8>,
    pub ext_rates: Vec<u8>,
    /// Pre-built vendor and security IEs, appended after the rate IEs.
    pub ies: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MgmtFrame {
    AssocReq(AssocReqFrame),
    ReassocReq { current_ap: Bssid, req: AssocReqFrame },
    Disassoc { peer: MacAddr, bssid: Bssid, reason: ReasonCode },
}

/// A `Device` transmits management frames and controls the parts of the radio the
/// station's state machines need.
pub trait Device {
    /// Hands a frame to the framing layer. `Error::NoResources` means no transmit
    /// buffer was available.
    fn send_mgmt_frame(&mut self, frame: MgmtFrame) -> Result<(), Error>;
    /// Switches to `channel` and keeps the radio there until told otherwise.
    fn lock_channel(&mut self, channel: ChannelNumber) -> Result<(), Error>;
    /// Drops all installed pairwise and group keys.
    fn remove_keys(&mut self) -> Result<(), Error>;
    fn set_link_status(&mut self, status: LinkStatus) -> Result<(), Error>;
}

#[cfg(test)]
mod test_utils {
    use {super::*, parking_lot::Mutex, std::sync::Arc};

    pub struct FakeDeviceState {
        pub wlan_queue: Vec<MgmtFrame>,
        pub channel: Option<ChannelNumber>,
        pub keys_removed: usize,
        pub link_status: LinkStatus,
        /// Number of upcoming frames to reject with `NoResources`.
        pub tx_failures: usize,
    }

    /// Records everything the station asks of the hardware. Clones share state, so a
    /// test can keep one while the station owns another.
    #[derive(Clone)]
    pub struct FakeDevice {
        pub state: Arc<Mutex<FakeDeviceState>>,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeDeviceState {
                    wlan_queue: vec![],
                    channel: None,
                    keys_removed: 0,
                    link_status: LinkStatus::DOWN,
                    tx_failures: 0,
                })),
            }
        }

        pub fn fail_next_tx(&self) {
            self.state.lock().tx_failures += 1;
        }

        pub fn take_frames(&self) -> Vec<MgmtFrame> {
            std::mem::take(&mut self.state.lock().wlan_queue)
        }

        pub fn channel(&self) -> Option<ChannelNumber> {
            self.state.lock().channel
        }

        pub fn link_status(&self) -> LinkStatus {
            self.state.lock().link_status
        }

        pub fn keys_removed(&self) -> usize {
            self.state.lock().keys_removed
        }
    }

    impl Device for FakeDevice {
        fn send_mgmt_frame(&mut self, frame: MgmtFrame) -> Result<(), Error> {
            let mut state = self.state.lock();
            if state.tx_failures > 0 {
                state.tx_failures -= 1;
                return Err(Error::NoResources(0));
            }
            state.wlan_queue.push(frame);
            Ok(())
        }

        fn lock_channel(&mut self, channel: ChannelNumber) -> Result<(), Error> {
            self.state.lock().channel = Some(channel);
            Ok(())
        }

        fn remove_keys(&mut self) -> Result<(), Error> {
            self.state.lock().keys_removed += 1;
            Ok(())
        }

        fn set_link_status(&mut self, status: LinkStatus) -> Result<(), Error> {
            self.state.lock().link_status = status;
            Ok(())
        }
    }
}
