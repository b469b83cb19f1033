// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        config::{AuthMode, BssType, Cipher, StationConfig},
        mac::{Bssid, CapabilityInfo, ChannelNumber, Ssid},
    },
    bitflags::bitflags,
    std::time::Duration,
};

pub const MAX_BSS_TABLE_LEN: usize = 64;

// A BSS not heard from for this long is no roaming target.
pub const BEACON_LOST_TIME: Duration = Duration::from_secs(4);
pub const ROAMING_RSSI_THRESHOLD_DBM: i8 = -80;
// A roaming target has to beat the current link by at least this much.
pub const ROAMING_RSSI_DELTA_DB: i8 = 5;

bitflags! {
    /// Key management suites advertised in a BSS's WPA and RSN IEs.
    #[derive(Default)]
    pub struct AkmSuites: u8 {
        const WPA_8021X = 1 << 0;
        const WPA_PSK = 1 << 1;
        const WPA2_8021X = 1 << 2;
        const WPA2_PSK = 1 << 3;
    }
}

impl AkmSuites {
    /// Whether a station configured with `auth_mode` finds a matching suite.
    pub fn supports(self, auth_mode: AuthMode) -> bool {
        match auth_mode {
            AuthMode::Wpa => self.contains(AkmSuites::WPA_8021X),
            AuthMode::WpaPsk => self.contains(AkmSuites::WPA_PSK),
            AuthMode::Wpa2 => self.contains(AkmSuites::WPA2_8021X),
            AuthMode::Wpa2Psk => self.contains(AkmSuites::WPA2_PSK),
            _ => false,
        }
    }
}

/// Cipher suites a BSS advertises in one security IE (WPA or RSN).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecurityIe {
    pub group: Cipher,
    pub pairwise: Cipher,
    // `Cipher::Disabled` when the BSS advertises a single pairwise suite.
    pub pairwise_aux: Cipher,
    pub mixed: bool,
    pub rsn_capability: u16,
}

impl Default for SecurityIe {
    fn default() -> Self {
        SecurityIe {
            group: Cipher::Disabled,
            pairwise: Cipher::Disabled,
            pairwise_aux: Cipher::Disabled,
            mixed: false,
            rsn_capability: 0,
        }
    }
}

impl SecurityIe {
    // A station configured for `cipher` may join a BSS only if the BSS's suites are no
    // stronger than ours. A TKIP station needs TKIP among the pairwise suites while a
    // CCMP station accepts whatever pairwise suite is offered.
    fn accepts(&self, cipher: Cipher) -> bool {
        if !self.mixed && cipher != self.group {
            return false;
        }
        if cipher < self.group {
            return false;
        }
        !(cipher == Cipher::Tkip && cipher != self.pairwise && cipher != self.pairwise_aux)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdcaParams {
    pub qos_info: u8,
    pub aifsn: [u8; 4],
    pub ecw_min: [u8; 4],
    pub ecw_max: [u8; 4],
    pub txop_limit: [u16; 4],
}

/// One discovered network, as captured from a beacon or probe response.
#[derive(Clone, Debug, PartialEq)]
pub struct BssEntry {
    pub bssid: Bssid,
    pub ssid: Ssid,
    pub bss_type: BssType,
    pub channel: ChannelNumber,
    pub beacon_period: u16,
    pub capability: CapabilityInfo,
    pub rates: Vec<u8>,
    pub ext_rates: Vec<u8>,
    pub rssi_dbm: i8,
    /// Privacy setting derived from the capability field and security IEs.
    pub cipher: Cipher,
    /// Set to `WpaNone` by ad-hoc networks using WPA-None, `Open` otherwise.
    pub auth_mode: AuthMode,
    pub akm: AkmSuites,
    pub wpa: Option<SecurityIe>,
    pub rsn: Option<SecurityIe>,
    pub edca: Option<EdcaParams>,
    /// Monotonic time of the last beacon received from this BSS.
    pub last_beacon: Duration,
}

impl BssEntry {
    /// The security IE matching `auth_mode`, if the mode uses one.
    pub fn security_ie(&self, auth_mode: AuthMode) -> Option<SecurityIe> {
        if auth_mode.uses_wpa_ie() {
            Some(self.wpa.unwrap_or_default())
        } else if auth_mode.uses_rsn_ie() {
            Some(self.rsn.unwrap_or_default())
        } else {
            None
        }
    }

    fn is_compatible(&self, config: &StationConfig) -> bool {
        if config.auth_mode == AuthMode::WpaNone {
            return self.auth_mode == AuthMode::WpaNone;
        }
        if config.auth_mode.is_wpa_family() {
            if !self.akm.supports(config.auth_mode) {
                return false;
            }
            return match self.security_ie(config.auth_mode) {
                Some(ie) => ie.accepts(config.cipher),
                None => false,
            };
        }
        self.cipher == config.cipher
    }
}

fn bss_type_matches(wanted: BssType, found: BssType) -> bool {
    wanted == BssType::Any || wanted == found
}

/// An ordered collection of discovered networks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BssTable {
    entries: Vec<BssEntry>,
}

impl BssTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&BssEntry> {
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BssEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Records a scan result. An entry for the same BSSID on the same channel is
    /// replaced; a full table drops the new entry.
    pub fn insert(&mut self, bss: BssEntry) -> bool {
        match self.entries.iter().position(|e| e.bssid == bss.bssid && e.channel == bss.channel) {
            Some(idx) => {
                self.entries[idx] = bss;
                true
            }
            None if self.entries.len() < MAX_BSS_TABLE_LEN => {
                self.entries.push(bss);
                true
            }
            None => false,
        }
    }

    pub fn search(&self, bssid: &Bssid) -> Option<&BssEntry> {
        self.entries.iter().find(|e| &e.bssid == bssid)
    }

    pub fn search_ssid(&self, bssid: &Bssid, ssid: &[u8], channel: ChannelNumber) -> Option<&BssEntry> {
        self.entries.iter().find(|e| &e.bssid == bssid && e.ssid == ssid && e.channel == channel)
    }

    pub fn delete(&mut self, bssid: &Bssid, channel: ChannelNumber) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !(&e.bssid == bssid && e.channel == channel));
        self.entries.len() != before
    }

    /// Strongest signal first. Entries with equal RSSI keep their relative order.
    pub fn sort_by_rssi(&mut self) {
        self.entries.sort_by(|a, b| b.rssi_dbm.cmp(&a.rssi_dbm));
    }

    /// Builds the per-attempt candidate list for `ssid`: every entry of the configured
    /// BSS type whose SSID and security settings suit the station, strongest first.
    /// An empty `ssid` matches any network that does not hide its SSID.
    pub fn ssid_sort(&self, config: &StationConfig, ssid: &[u8]) -> BssTable {
        let entries = self
            .entries
            .iter()
            .filter(|e| bss_type_matches(config.bss_type, e.bss_type))
            .filter(|e| if ssid.is_empty() { !e.ssid.is_empty() } else { e.ssid == ssid })
            .filter(|e| e.is_compatible(config))
            .take(MAX_BSS_TABLE_LEN)
            .cloned()
            .collect();
        let mut table = BssTable { entries };
        table.sort_by_rssi();
        table
    }

    /// Entries worth roaming to from the current link, strongest first.
    pub fn roam_candidates(
        &self,
        now: Duration,
        current_bssid: &Bssid,
        current_ssid: &[u8],
        current_rssi_dbm: i8,
    ) -> BssTable {
        let entries = self
            .entries
            .iter()
            .filter(|e| now <= e.last_beacon + BEACON_LOST_TIME)
            .filter(|e| e.rssi_dbm > ROAMING_RSSI_THRESHOLD_DBM)
            .filter(|e| &e.bssid != current_bssid)
            .filter(|e| e.ssid == current_ssid)
            .filter(|e| {
                i16::from(e.rssi_dbm) >= i16::from(current_rssi_dbm) + i16::from(ROAMING_RSSI_DELTA_DB)
            })
            .cloned()
            .collect();
        let mut table = BssTable { entries };
        table.sort_by_rssi();
        table
    }
}

impl From<Vec<BssEntry>> for BssTable {
    fn from(mut entries: Vec<BssEntry>) -> Self {
        entries.truncate(MAX_BSS_TABLE_LEN);
        BssTable { entries }
    }
}
