// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{
            AkmSuites, AssocResponse, BssEntry, Context, MlmeMsg, SecurityIe, Station,
        },
        config::{AuthMode, BssType, Cipher, StationConfig},
        device::FakeDevice,
        mac::{Bssid, CapabilityInfo, StatusCode},
        queue::MlmeHandle,
        timer::FakeScheduler,
        InfoEvent, InfoStream, MlmeStream,
    },
    std::time::Duration,
};

pub fn fake_bss(ssid: &[u8], idx: u8, rssi_dbm: i8) -> BssEntry {
    BssEntry {
        bssid: [0x0a, 0x0b, 0x0c, 0x0d, 0x0e, idx],
        ssid: ssid.to_vec(),
        bss_type: BssType::Infrastructure,
        channel: 6,
        beacon_period: 100,
        capability: CapabilityInfo::ESS,
        rates: vec![0x82, 0x84, 0x8b, 0x96],
        ext_rates: vec![0x0c, 0x12, 0x18, 0x24],
        rssi_dbm,
        cipher: Cipher::Disabled,
        auth_mode: AuthMode::Open,
        akm: AkmSuites::empty(),
        wpa: None,
        rsn: None,
        edca: None,
        last_beacon: Duration::from_secs(0),
    }
}

fn fake_security_ie(group: Cipher, pairwise: Cipher) -> SecurityIe {
    SecurityIe { group, pairwise, ..SecurityIe::default() }
}

pub fn fake_wpa_bss(
    ssid: &[u8],
    idx: u8,
    rssi_dbm: i8,
    group: Cipher,
    pairwise: Cipher,
) -> BssEntry {
    BssEntry {
        capability: CapabilityInfo::ESS | CapabilityInfo::PRIVACY,
        cipher: pairwise,
        akm: AkmSuites::WPA_PSK,
        wpa: Some(fake_security_ie(group, pairwise)),
        ..fake_bss(ssid, idx, rssi_dbm)
    }
}

pub fn fake_rsn_bss(
    ssid: &[u8],
    idx: u8,
    rssi_dbm: i8,
    group: Cipher,
    pairwise: Cipher,
) -> BssEntry {
    BssEntry {
        capability: CapabilityInfo::ESS | CapabilityInfo::PRIVACY,
        cipher: pairwise,
        akm: AkmSuites::WPA2_PSK,
        rsn: Some(fake_security_ie(group, pairwise)),
        ..fake_bss(ssid, idx, rssi_dbm)
    }
}

/// A successful association response from `addr` granting AID 1.
pub fn fake_assoc_rsp(addr: Bssid) -> AssocResponse {
    AssocResponse {
        addr,
        capability: CapabilityInfo::ESS,
        status: StatusCode::SUCCESS,
        aid: 1,
        rates: vec![0x82, 0x84, 0x8b, 0x96],
        ext_rates: vec![0x0c, 0x12, 0x18, 0x24],
        edca: None,
    }
}

fn drain<T>(stream: &mut futures::channel::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = vec![];
    while let Ok(Some(item)) = stream.try_next() {
        items.push(item);
    }
    items
}

/// A bare context for driving one state machine by hand.
pub struct TestHelper {
    pub ctx: Context<FakeDevice>,
    pub device: FakeDevice,
    pub scheduler: FakeScheduler,
    pub handle: MlmeHandle,
    pub mlme_stream: MlmeStream,
    pub info_stream: InfoStream,
}

impl TestHelper {
    pub fn new() -> Self {
        Self::with_config(StationConfig::default())
    }

    pub fn with_config(config: StationConfig) -> Self {
        let device = FakeDevice::new();
        let scheduler = FakeScheduler::new();
        let (ctx, handle, mlme_stream, info_stream) =
            Context::new(config, device.clone(), scheduler.as_scheduler());
        TestHelper { ctx, device, scheduler, handle, mlme_stream, info_stream }
    }

    pub fn drain_info_events(&mut self) -> Vec<InfoEvent> {
        drain(&mut self.info_stream)
    }

    /// Messages the state machines queued for each other.
    pub fn drain_queue(&self) -> Vec<MlmeMsg> {
        std::iter::from_fn(|| self.ctx.queue.pop()).collect()
    }
}

/// A whole station. Tests feed it through `handle` and run `station.process_queue()`.
pub struct StationHelper {
    pub station: Station<FakeDevice>,
    pub device: FakeDevice,
    pub scheduler: FakeScheduler,
    pub handle: MlmeHandle,
    pub mlme_stream: MlmeStream,
    pub info_stream: InfoStream,
}

impl StationHelper {
    pub fn new() -> Self {
        Self::with_config(StationConfig::default())
    }

    pub fn with_config(config: StationConfig) -> Self {
        let device = FakeDevice::new();
        let scheduler = FakeScheduler::new();
        let (station, handle, mlme_stream, info_stream) =
            Station::new(config, device.clone(), scheduler.as_scheduler());
        StationHelper { station, device, scheduler, handle, mlme_stream, info_stream }
    }

    pub fn drain_info_events(&mut self) -> Vec<InfoEvent> {
        drain(&mut self.info_stream)
    }
}
