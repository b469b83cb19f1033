// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{
            bss::{BssEntry, BssTable, EdcaParams},
            rsn::{NegotiatedCipher, PmkidCache},
            MlmeMsg,
        },
        config::{AuthMode, BssType, StationConfig},
        device::{Device, LinkStatus},
        mac::{Bssid, CapabilityInfo, ChannelNumber, Ssid, StatusCode},
        queue::{MlmeHandle, MlmeQueue},
        sink::{InfoSink, MlmeSink, UnboundedSink},
        timer::{EventId, Scheduler, Timer},
        AuthAlgorithm, InfoEvent, InfoStream, MlmeStream,
    },
    futures::channel::mpsc,
    log::{error, info},
};

/// Staging area for the attempt in progress. Reset whenever the controller goes idle.
#[derive(Clone, Debug, Default)]
pub struct WorkingContext {
    pub ssid: Ssid,
    pub bssid: Bssid,
    pub bss_type: Option<BssType>,
    pub channel: ChannelNumber,
    pub beacon_period: u16,
    pub capability: CapabilityInfo,
    pub aid: u16,
    pub rates: Vec<u8>,
    pub ext_rates: Vec<u8>,
    pub edca: Option<EdcaParams>,
    pub cipher: Option<NegotiatedCipher>,
    /// Private copy of the matching scan entries, strongest first.
    pub candidates: BssTable,
    pub bss_idx: usize,
    pub roam_candidates: BssTable,
    pub roam_idx: usize,
    pub from_user: bool,
    pub auth_alg: Option<AuthAlgorithm>,
    pub last_status: Option<StatusCode>,
}

impl WorkingContext {
    /// Makes `bss` the target of the next join or reassociation.
    pub fn adopt(&mut self, bss: &BssEntry) {
        if !bss.ssid.is_empty() {
            self.ssid = bss.ssid.clone();
        }
        self.bssid = bss.bssid;
        self.bss_type = Some(bss.bss_type);
        self.channel = bss.channel;
        self.beacon_period = bss.beacon_period;
        self.capability = bss.capability;
        self.rates = bss.rates.clone();
        self.ext_rates = bss.ext_rates.clone();
        self.edca = bss.edca;
        self.aid = 0;
    }
}

/// The committed connection. Empty while not connected.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveRecord {
    pub ssid: Ssid,
    pub bssid: Bssid,
    pub bss_type: Option<BssType>,
    pub channel: ChannelNumber,
    pub beacon_period: u16,
    pub capability: CapabilityInfo,
    pub aid: u16,
    pub rates: Vec<u8>,
    pub ext_rates: Vec<u8>,
    pub edca: Option<EdcaParams>,
    pub cipher: Option<NegotiatedCipher>,
}

impl ActiveRecord {
    pub fn is_connected(&self) -> bool {
        self.bss_type.is_some()
    }

    pub fn is_infra(&self) -> bool {
        self.bss_type == Some(BssType::Infrastructure)
    }

    pub fn is_adhoc(&self) -> bool {
        self.bss_type == Some(BssType::Adhoc)
    }
}

/// What the station was connected to before the last Link-Down.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LastConnection {
    pub ssid: Ssid,
    pub bssid: Bssid,
}

#[derive(Debug, Default)]
pub struct OpFlags {
    pub radio_off: bool,
    pub port_secured: bool,
    /// A material config field changed since the last Link-Up.
    pub config_changed: bool,
    pub block_assoc: bool,
}

/// State shared by both state machines. Only the station's worker touches it.
pub struct Context<D> {
    pub config: StationConfig,
    pub device: D,
    pub mlme_sink: MlmeSink,
    pub info_sink: InfoSink,
    pub queue: MlmeQueue,
    pub timer: Timer<MlmeMsg>,
    pub scan_table: BssTable,
    pub aux: WorkingContext,
    pub active: ActiveRecord,
    pub last: LastConnection,
    /// Channel of the current connection. Survives Link-Down so a failed roam can return to it.
    pub channel: ChannelNumber,
    pub pmkid_cache: PmkidCache,
    pub auto_reconnect_ssid: Ssid,
    pub op: OpFlags,
    pub media_disconnect_timeout: Option<EventId>,
    pub unblock_timeout: Option<EventId>,
}

impl<D> Context<D> {
    pub fn new(
        config: StationConfig,
        device: D,
        scheduler: Box<dyn Scheduler + Send>,
    ) -> (Self, MlmeHandle, MlmeStream, InfoStream) {
        let (mlme_sink, mlme_stream) = mpsc::unbounded();
        let (info_sink, info_stream) = mpsc::unbounded();
        let (queue, handle) = MlmeQueue::new();
        let ctx = Context {
            config,
            device,
            mlme_sink: UnboundedSink::new(mlme_sink),
            info_sink: UnboundedSink::new(info_sink),
            queue,
            timer: Timer::new(scheduler),
            scan_table: BssTable::new(),
            aux: WorkingContext::default(),
            active: ActiveRecord::default(),
            last: LastConnection::default(),
            channel: 0,
            pmkid_cache: PmkidCache::default(),
            auto_reconnect_ssid: vec![],
            op: OpFlags::default(),
            media_disconnect_timeout: None,
            unblock_timeout: None,
        };
        (ctx, handle, mlme_stream, info_stream)
    }
}

impl<D: Device> Context<D> {
    pub fn link_up(&mut self, bss_type: BssType) {
        let aux = &self.aux;
        self.active = ActiveRecord {
            ssid: aux.ssid.clone(),
            bssid: aux.bssid,
            bss_type: Some(bss_type),
            channel: aux.channel,
            beacon_period: aux.beacon_period,
            capability: aux.capability,
            aid: aux.aid,
            rates: aux.rates.clone(),
            ext_rates: aux.ext_rates.clone(),
            edca: aux.edca,
            cipher: aux.cipher,
        };
        self.channel = self.active.channel;
        info!(
            "link up: {:?} {:02x?} on channel {} ({:?})",
            String::from_utf8_lossy(&self.active.ssid),
            self.active.bssid,
            self.channel,
            bss_type
        );

        if let Some(event_id) = self.media_disconnect_timeout.take() {
            self.timer.cancel_event(event_id);
            // Reconnecting to the same SSID within the delay is not reported.
            if bss_type == BssType::Infrastructure && self.last.ssid != self.active.ssid {
                self.info_sink.send(InfoEvent::MediaDisconnected);
            }
        }

        if bss_type == BssType::Infrastructure
            && self.config.auth_mode.is_wpa_family()
            && self.last.bssid != self.active.bssid
        {
            if let Err(e) = self.device.remove_keys() {
                error!("error removing stale keys: {}", e);
            }
        }

        self.op.config_changed = false;
        if let Err(e) = self.device.set_link_status(LinkStatus::UP) {
            error!("error setting link status up: {}", e);
        }
        self.info_sink.send(InfoEvent::LinkUp(self.active.clone()));
    }

    /// Tears down the active connection. `requested_by_ap` is set when the peer
    /// disassociated or deauthenticated us.
    pub fn link_down(&mut self, requested_by_ap: bool) {
        if !self.active.is_connected() {
            return;
        }
        info!(
            "link down: {:02x?} ({})",
            self.active.bssid,
            if requested_by_ap { "by peer" } else { "locally" }
        );

        self.last = LastConnection { ssid: self.active.ssid.clone(), bssid: self.active.bssid };
        if self.active.is_infra() && !self.aux.from_user {
            // Media disconnect is reported only if no reconnect happens within the delay.
            if let Some(event_id) = self.media_disconnect_timeout.take() {
                self.timer.cancel_event(event_id);
            }
            let delay = self.config.media_disconnect_delay;
            self.media_disconnect_timeout =
                Some(self.timer.schedule_event(delay, MlmeMsg::MediaDisconnectTimeout));
        } else {
            self.info_sink.send(InfoEvent::MediaDisconnected);
        }

        let (bssid, channel) = (self.active.bssid, self.active.channel);
        self.scan_table.delete(&bssid, channel);
        self.info_sink.send(InfoEvent::CandidateUnusable { bssid, channel });

        self.active = ActiveRecord::default();
        self.op.port_secured = false;
        if requested_by_ap && self.config.auth_mode.is_wpa_family() {
            if let Err(e) = self.device.remove_keys() {
                error!("error removing keys: {}", e);
            }
        }
        if let Err(e) = self.device.set_link_status(LinkStatus::DOWN) {
            error!("error setting link status down: {}", e);
        }
        self.info_sink.send(InfoEvent::LinkDown { locally_requested: !requested_by_ap });
    }

    /// Whether an existing connection must be rebuilt even though it already matches
    /// the requested network.
    pub fn needs_reconnect(&self) -> bool {
        let auth_mode = self.config.auth_mode;
        let needs_port = auth_mode == AuthMode::Wpa
            || auth_mode == AuthMode::WpaPsk
            || auth_mode == AuthMode::Wpa2
            || auth_mode == AuthMode::Wpa2Psk
            || self.config.ieee8021x;
        (needs_port && !self.op.port_secured) || self.op.config_changed
    }

    pub fn lock_channel(&mut self, channel: ChannelNumber) {
        if let Err(e) = self.device.lock_channel(channel) {
            error!("error locking channel {}: {}", channel, e);
        }
    }
}
