// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{error::Error, mac::MacAddr},
    serde::Deserialize,
    std::{fs, path::Path, time::Duration},
};

const CONFIG_FILE: &str = "/data/wlan-cntl.json";

/// Authentication modes in the order the station compares them: every mode at or
/// above `Wpa` uses an 802.11i style security IE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub enum AuthMode {
    Open,
    Shared,
    AutoSwitch,
    Wpa,
    WpaPsk,
    WpaNone,
    Wpa2,
    Wpa2Psk,
}

impl AuthMode {
    pub fn is_wpa_family(self) -> bool {
        self >= AuthMode::Wpa
    }

    /// Modes which carry a WPA (vendor specific) IE in the association request.
    pub fn uses_wpa_ie(self) -> bool {
        self == AuthMode::Wpa || self == AuthMode::WpaPsk
    }

    /// Modes which carry an RSN IE in the association request.
    pub fn uses_rsn_ie(self) -> bool {
        self == AuthMode::Wpa2 || self == AuthMode::Wpa2Psk
    }
}

/// Data confidentiality setting, ordered from weakest to strongest so that
/// "the BSS group cipher must not be stronger than ours" is a plain comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum Cipher {
    Wep,
    Disabled,
    Tkip,
    Ccmp,
}

impl Default for Cipher {
    fn default() -> Self {
        Cipher::Disabled
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum BssType {
    Infrastructure,
    Adhoc,
    Any,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub addr: MacAddr,
    pub bss_type: BssType,
    pub auth_mode: AuthMode,
    pub cipher: Cipher,
    pub ieee8021x: bool,
    pub auto_reconnect: bool,
    pub wmm_capable: bool,
    pub listen_interval: u16,
    pub supported_rates: Vec<u8>,
    pub ext_supported_rates: Vec<u8>,
    #[serde(with = "millis")]
    pub auth_timeout: Duration,
    #[serde(with = "millis")]
    pub assoc_timeout: Duration,
    #[serde(with = "millis")]
    pub join_timeout: Duration,
    #[serde(with = "millis")]
    pub disassoc_timeout: Duration,
    #[serde(with = "millis")]
    pub media_disconnect_delay: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            addr: [0; 6],
            bss_type: BssType::Infrastructure,
            auth_mode: AuthMode::Open,
            cipher: Cipher::Disabled,
            ieee8021x: false,
            auto_reconnect: true,
            wmm_capable: false,
            listen_interval: 3,
            supported_rates: vec![0x82, 0x84, 0x8b, 0x96],
            ext_supported_rates: vec![0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c],
            auth_timeout: Duration::from_millis(300),
            assoc_timeout: Duration::from_millis(300),
            join_timeout: Duration::from_millis(2000),
            disassoc_timeout: Duration::from_millis(100),
            media_disconnect_delay: Duration::from_secs(10),
        }
    }
}

impl StationConfig {
    pub fn load_from_file() -> Result<Self, Error> {
        Self::load_from_path(CONFIG_FILE)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: StationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.listen_interval == 0 {
            return Err(Error::Config("listen interval must be non-zero".to_string()));
        }
        if self.supported_rates.is_empty() {
            return Err(Error::Config("no supported rates".to_string()));
        }
        if self.supported_rates.len() + self.ext_supported_rates.len()
            > crate::mac::MAX_SUPPORTED_RATES
        {
            return Err(Error::Config("too many rates".to_string()));
        }
        if self.auth_mode == AuthMode::WpaNone && self.bss_type != BssType::Adhoc {
            return Err(Error::Config("WPA-None requires an ad-hoc BSS".to_string()));
        }
        Ok(())
    }

    /// Whether replacing `self` with `other` invalidates an existing association.
    pub fn differs_materially(&self, other: &StationConfig) -> bool {
        self.bss_type != other.bss_type
            || self.auth_mode != other.auth_mode
            || self.cipher != other.cipher
            || self.ieee8021x != other.ieee8021x
    }
}

mod millis {
    use {
        serde::{Deserialize, Deserializer},
        std::time::Duration,
    };

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
