// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::bss::BssEntry,
        config::{AuthMode, Cipher},
        mac::Bssid,
    },
    bytes::{BufMut, Bytes, BytesMut},
    std::collections::VecDeque,
};

pub const PMKID_LEN: usize = 16;
pub type Pmkid = [u8; PMKID_LEN];
pub const PMKID_CACHE_LEN: usize = 4;

// IEEE Std 802.11-2016, 9.4.2.25
const IE_RSN: u8 = 48;
const IE_VENDOR_SPECIFIC: u8 = 221;
const RSN_VERSION: u16 = 1;
const OUI_IEEE: [u8; 3] = [0x00, 0x0f, 0xac];
const OUI_MICROSOFT: [u8; 3] = [0x00, 0x50, 0xf2];
const WPA_OUI_TYPE: u8 = 1;

const AKM_8021X: u8 = 1;
const AKM_PSK: u8 = 2;

/// Cipher suites the station commits to for one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedCipher {
    pub group: Cipher,
    pub pairwise: Cipher,
    /// Pairwise and group traffic use different ciphers.
    pub mixed: bool,
    pub rsn_capability: u16,
}

/// Picks the cipher suites to use with `bss`.
///
/// The group cipher is always the one the BSS advertises. The pairwise cipher is the
/// BSS's primary pairwise cipher if it matches `preferred`, otherwise its secondary one,
/// and TKIP if the BSS advertises no secondary cipher. Modes without a security IE
/// keep the configured cipher for both.
pub fn negotiate_cipher(auth_mode: AuthMode, preferred: Cipher, bss: &BssEntry) -> NegotiatedCipher {
    let ie = match bss.security_ie(auth_mode) {
        Some(ie) => ie,
        None => {
            return NegotiatedCipher {
                group: preferred,
                pairwise: preferred,
                mixed: false,
                rsn_capability: 0,
            }
        }
    };

    let pairwise = if ie.pairwise == preferred {
        ie.pairwise
    } else if ie.pairwise_aux != Cipher::Disabled {
        ie.pairwise_aux
    } else {
        Cipher::Tkip
    };
    let rsn_capability = if auth_mode.uses_rsn_ie() { ie.rsn_capability } else { 0 };
    NegotiatedCipher { group: ie.group, pairwise, mixed: pairwise != ie.group, rsn_capability }
}

fn cipher_suite_type(cipher: Cipher) -> u8 {
    match cipher {
        // "Use group cipher suite"
        Cipher::Disabled => 0,
        Cipher::Wep => 1,
        Cipher::Tkip => 2,
        Cipher::Ccmp => 4,
    }
}

fn akm_suite_type(auth_mode: AuthMode) -> u8 {
    match auth_mode {
        AuthMode::WpaPsk | AuthMode::Wpa2Psk => AKM_PSK,
        _ => AKM_8021X,
    }
}

fn put_suite(buf: &mut BytesMut, oui: &[u8; 3], suite_type: u8) {
    buf.put_slice(&oui[..]);
    buf.put_u8(suite_type);
}

// One group suite, one pairwise suite and one AKM suite.
fn put_suites(buf: &mut BytesMut, oui: &[u8; 3], auth_mode: AuthMode, cipher: &NegotiatedCipher) {
    put_suite(buf, oui, cipher_suite_type(cipher.group));
    buf.put_u16_le(1);
    put_suite(buf, oui, cipher_suite_type(cipher.pairwise));
    buf.put_u16_le(1);
    put_suite(buf, oui, akm_suite_type(auth_mode));
}

pub fn build_wpa_ie(auth_mode: AuthMode, cipher: &NegotiatedCipher) -> Bytes {
    let mut body = BytesMut::with_capacity(22);
    body.put_slice(&OUI_MICROSOFT[..]);
    body.put_u8(WPA_OUI_TYPE);
    body.put_u16_le(1);
    put_suites(&mut body, &OUI_MICROSOFT, auth_mode, cipher);

    let mut buf = BytesMut::with_capacity(2 + body.len());
    buf.put_u8(IE_VENDOR_SPECIFIC);
    buf.put_u8(body.len() as u8);
    buf.put_slice(&body[..]);
    buf.freeze()
}

pub fn build_rsn_ie(auth_mode: AuthMode, cipher: &NegotiatedCipher, pmkid: Option<&Pmkid>) -> Bytes {
    let mut body = BytesMut::with_capacity(20 + 2 + PMKID_LEN);
    body.put_u16_le(RSN_VERSION);
    put_suites(&mut body, &OUI_IEEE, auth_mode, cipher);
    body.put_u16_le(cipher.rsn_capability);
    if let Some(pmkid) = pmkid {
        body.put_u16_le(1);
        body.put_slice(&pmkid[..]);
    }

    let mut buf = BytesMut::with_capacity(2 + body.len());
    buf.put_u8(IE_RSN);
    buf.put_u8(body.len() as u8);
    buf.put_slice(&body[..]);
    buf.freeze()
}

/// The security IE an association request carries for `auth_mode`, if any.
/// A PMKID is only ever sent for WPA2 with 802.1X key management.
pub fn build_security_ie(
    auth_mode: AuthMode,
    cipher: &NegotiatedCipher,
    pmkid: Option<&Pmkid>,
) -> Option<Bytes> {
    if auth_mode.uses_wpa_ie() {
        Some(build_wpa_ie(auth_mode, cipher))
    } else if auth_mode.uses_rsn_ie() {
        let pmkid = if auth_mode == AuthMode::Wpa2 { pmkid } else { None };
        Some(build_rsn_ie(auth_mode, cipher, pmkid))
    } else {
        None
    }
}

/// PMKIDs of recent security associations, oldest evicted first.
#[derive(Debug, Default)]
pub struct PmkidCache {
    entries: VecDeque<(Bssid, Pmkid)>,
}

impl PmkidCache {
    pub fn insert(&mut self, bssid: Bssid, pmkid: Pmkid) {
        self.remove(&bssid);
        if self.entries.len() == PMKID_CACHE_LEN {
            self.entries.pop_front();
        }
        self.entries.push_back((bssid, pmkid));
    }

    pub fn get(&self, bssid: &Bssid) -> Option<&Pmkid> {
        self.entries.iter().find(|(b, _)| b == bssid).map(|(_, pmkid)| pmkid)
    }

    pub fn remove(&mut self, bssid: &Bssid) {
        self.entries.retain(|(b, _)| b != bssid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::client::{
            bss::SecurityIe,
            test_utils::{fake_bss, fake_rsn_bss, fake_wpa_bss},
        },
    };

    #[test]
    fn negotiate_matching_pairwise() {
        let bss = fake_rsn_bss(b"foo", 1, -40, Cipher::Ccmp, Cipher::Ccmp);
        let cipher = negotiate_cipher(AuthMode::Wpa2Psk, Cipher::Ccmp, &bss);
        assert_eq!(cipher.group, Cipher::Ccmp);
        assert_eq!(cipher.pairwise, Cipher::Ccmp);
        assert!(!cipher.mixed);
    }

    #[test]
    fn negotiate_pairwise_aux() {
        let mut bss = fake_rsn_bss(b"foo", 1, -40, Cipher::Tkip, Cipher::Tkip);
        bss.rsn = Some(SecurityIe {
            group: Cipher::Tkip,
            pairwise: Cipher::Tkip,
            pairwise_aux: Cipher::Ccmp,
            mixed: true,
            rsn_capability: 0x000c,
        });
        let cipher = negotiate_cipher(AuthMode::Wpa2, Cipher::Ccmp, &bss);
        assert_eq!(cipher.group, Cipher::Tkip);
        assert_eq!(cipher.pairwise, Cipher::Ccmp);
        assert!(cipher.mixed);
        assert_eq!(cipher.rsn_capability, 0x000c);
    }

    #[test]
    fn negotiate_falls_back_to_tkip() {
        let bss = fake_wpa_bss(b"foo", 1, -40, Cipher::Wep, Cipher::Wep);
        let cipher = negotiate_cipher(AuthMode::WpaPsk, Cipher::Ccmp, &bss);
        assert_eq!(cipher.group, Cipher::Wep);
        assert_eq!(cipher.pairwise, Cipher::Tkip);
        assert!(cipher.mixed);
    }

    #[test]
    fn negotiate_is_repeatable() {
        let a = fake_rsn_bss(b"foo", 1, -40, Cipher::Tkip, Cipher::Ccmp);
        let b = fake_rsn_bss(b"foo", 2, -50, Cipher::Ccmp, Cipher::Ccmp);
        let first = negotiate_cipher(AuthMode::Wpa2Psk, Cipher::Ccmp, &a);
        assert!(first.mixed);
        assert!(!negotiate_cipher(AuthMode::Wpa2Psk, Cipher::Ccmp, &b).mixed);
        assert_eq!(negotiate_cipher(AuthMode::Wpa2Psk, Cipher::Ccmp, &a), first);
    }

    #[test]
    fn negotiate_without_security_ie() {
        let bss = fake_bss(b"foo", 1, -40);
        let cipher = negotiate_cipher(AuthMode::Shared, Cipher::Wep, &bss);
        assert_eq!(cipher.group, Cipher::Wep);
        assert_eq!(cipher.pairwise, Cipher::Wep);
        assert!(!cipher.mixed);
    }

    #[test]
    fn wpa_ie_bytes() {
        let cipher = NegotiatedCipher {
            group: Cipher::Tkip,
            pairwise: Cipher::Ccmp,
            mixed: true,
            rsn_capability: 0,
        };
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0xdd, 0x16, 0x00, 0x50, 0xf2, 0x01, 0x01, 0x00,
            0x00, 0x50, 0xf2, 0x02, // group: TKIP
            0x01, 0x00, 0x00, 0x50, 0xf2, 0x04, // pairwise: CCMP
            0x01, 0x00, 0x00, 0x50, 0xf2, 0x02, // AKM: PSK
        ];
        assert_eq!(&build_wpa_ie(AuthMode::WpaPsk, &cipher)[..], expected);
    }

    #[test]
    fn rsn_ie_bytes() {
        let cipher = NegotiatedCipher {
            group: Cipher::Ccmp,
            pairwise: Cipher::Ccmp,
            mixed: false,
            rsn_capability: 0x0028,
        };
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x30, 0x14, 0x01, 0x00,
            0x00, 0x0f, 0xac, 0x04, // group: CCMP
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, // pairwise: CCMP
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x01, // AKM: 802.1X
            0x28, 0x00,
        ];
        assert_eq!(&build_rsn_ie(AuthMode::Wpa2, &cipher, None)[..], expected);
    }

    #[test]
    fn rsn_ie_with_pmkid() {
        let cipher = NegotiatedCipher {
            group: Cipher::Ccmp,
            pairwise: Cipher::Ccmp,
            mixed: false,
            rsn_capability: 0,
        };
        let pmkid = [0xab; PMKID_LEN];
        let ie = build_security_ie(AuthMode::Wpa2, &cipher, Some(&pmkid)).expect("RSN IE");
        assert_eq!(ie.len(), 2 + 0x26);
        assert_eq!(ie[1], 0x26);
        assert_eq!(&ie[22..24], &[0x01, 0x00]);
        assert_eq!(&ie[24..], &pmkid[..]);

        // PSK never carries a PMKID.
        let ie = build_security_ie(AuthMode::Wpa2Psk, &cipher, Some(&pmkid)).expect("RSN IE");
        assert_eq!(ie[1], 0x14);
        assert_eq!(ie[19], AKM_PSK);

        assert_eq!(build_security_ie(AuthMode::Open, &cipher, Some(&pmkid)), None);
    }

    #[test]
    fn pmkid_cache_evicts_oldest() {
        let mut cache = PmkidCache::default();
        for i in 0..PMKID_CACHE_LEN as u8 {
            cache.insert([i; 6], [i; PMKID_LEN]);
        }
        assert_eq!(cache.len(), PMKID_CACHE_LEN);

        // Refreshing an entry moves it to the back.
        cache.insert([0; 6], [0xff; PMKID_LEN]);
        cache.insert([9; 6], [9; PMKID_LEN]);
        assert_eq!(cache.len(), PMKID_CACHE_LEN);
        assert_eq!(cache.get(&[1; 6]), None);
        assert_eq!(cache.get(&[0; 6]), Some(&[0xff; PMKID_LEN]));
        assert_eq!(cache.get(&[9; 6]), Some(&[9; PMKID_LEN]));

        cache.remove(&[9; 6]);
        assert_eq!(cache.get(&[9; 6]), None);
    }
}
