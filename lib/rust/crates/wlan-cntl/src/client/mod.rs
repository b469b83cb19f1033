// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod assoc;
mod bss;
mod cntl;
mod context;
mod rsn;

#[cfg(test)]
pub mod test_utils;

use {
    crate::{
        config::StationConfig,
        device::Device,
        mac::{is_valid_ssid, Bssid, Ssid},
        queue::MlmeHandle,
        timer::{EventId, Scheduler},
        InfoEvent, InfoStream, MlmeStream,
    },
    log::{debug, info, warn},
    std::time::Duration,
};

pub use self::{
    assoc::{AssocEvent, AssocRequest, AssocResponse, DisassocRequest},
    bss::{AkmSuites, BssEntry, BssTable, EdcaParams, SecurityIe},
    cntl::CntlEvent,
    context::{ActiveRecord, Context, LastConnection, WorkingContext},
    rsn::{negotiate_cipher, NegotiatedCipher, Pmkid, PmkidCache},
};

/// Everything the station's worker consumes, in the order it was queued.
#[derive(Debug)]
pub enum MlmeMsg {
    /// Returns both state machines to idle ahead of a new user request.
    Reset,
    Cntl(CntlEvent),
    Assoc(AssocEvent),
    BssInfo(Box<BssEntry>),
    Timeout(EventId),
    SetConfig(Box<StationConfig>),
    SetPortSecured(bool),
    SetRadio(bool),
    SetPmkid { bssid: Bssid, pmkid: Pmkid },
    BlockAssoc(Duration),
    UnblockAssoc,
    MediaDisconnectTimeout,
}

impl MlmeMsg {
    pub fn is_user_request(&self) -> bool {
        match self {
            MlmeMsg::Cntl(CntlEvent::SsidReq { from_user, .. }) => *from_user,
            MlmeMsg::Cntl(CntlEvent::BssidReq { .. })
            | MlmeMsg::Cntl(CntlEvent::ScanReq)
            | MlmeMsg::Cntl(CntlEvent::DisassocReq) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub connected_to: Option<ActiveRecord>,
    pub connecting_to: Option<Ssid>,
    pub cntl_state: &'static str,
    pub assoc_state: &'static str,
}

/// An 802.11 station: the connection controller and the association machine sharing one
/// context and one message queue.
pub struct Station<D> {
    ctx: Context<D>,
    cntl: Option<cntl::State>,
    assoc: Option<assoc::State>,
}

impl<D: Device> Station<D> {
    pub fn new(
        config: StationConfig,
        device: D,
        scheduler: Box<dyn Scheduler + Send>,
    ) -> (Self, MlmeHandle, MlmeStream, InfoStream) {
        let (ctx, handle, mlme_stream, info_stream) = Context::new(config, device, scheduler);
        let station =
            Station { ctx, cntl: Some(cntl::State::Idle), assoc: Some(assoc::State::Idle) };
        (station, handle, mlme_stream, info_stream)
    }

    pub fn handle(&self) -> MlmeHandle {
        self.ctx.queue.handle()
    }

    /// Processes the oldest queued message. Returns false if there was none.
    pub fn step(&mut self) -> bool {
        let msg = match self.ctx.queue.pop() {
            Some(msg) => msg,
            None => return false,
        };
        self.dispatch(msg);
        let idle = self.is_idle();
        self.ctx.queue.set_machines_idle(idle);
        true
    }

    /// Runs until the queue is empty, including every message the state machines
    /// queue for each other along the way.
    pub fn process_queue(&mut self) {
        while self.step() {}
    }

    fn dispatch(&mut self, msg: MlmeMsg) {
        let ctx = &mut self.ctx;
        match msg {
            MlmeMsg::Reset => self.reset(),
            MlmeMsg::Cntl(event) => {
                self.cntl = self.cntl.take().map(|state| state.on_event(event, ctx));
            }
            MlmeMsg::Assoc(event) => {
                self.assoc = self.assoc.take().map(|state| state.on_event(event, ctx));
            }
            MlmeMsg::BssInfo(bss) => {
                let bssid = bss.bssid;
                if !ctx.scan_table.insert(*bss) {
                    warn!("BSS table full, dropping {:02x?}", bssid);
                }
            }
            MlmeMsg::Timeout(event_id) => match ctx.timer.triggered(&event_id) {
                Some(msg) => self.dispatch(msg),
                None => debug!("ignoring canceled timeout {:?}", event_id),
            },
            MlmeMsg::SetConfig(config) => {
                if ctx.config.differs_materially(&config) {
                    info!("configuration changed, next connect request reconnects");
                    ctx.op.config_changed = true;
                }
                ctx.config = *config;
            }
            MlmeMsg::SetPortSecured(secured) => ctx.op.port_secured = secured,
            MlmeMsg::SetRadio(on) => {
                info!("radio {}", if on { "on" } else { "off" });
                ctx.op.radio_off = !on;
            }
            MlmeMsg::SetPmkid { bssid, pmkid } => ctx.pmkid_cache.insert(bssid, pmkid),
            MlmeMsg::BlockAssoc(duration) => {
                warn!("blocking association for {:?}", duration);
                ctx.op.block_assoc = true;
                if let Some(event_id) = ctx.unblock_timeout.take() {
                    ctx.timer.cancel_event(event_id);
                }
                let event_id = ctx.timer.schedule_event(duration, MlmeMsg::UnblockAssoc);
                ctx.unblock_timeout = Some(event_id);
            }
            MlmeMsg::UnblockAssoc => {
                info!("association unblocked");
                ctx.unblock_timeout = None;
                ctx.op.block_assoc = false;
            }
            MlmeMsg::MediaDisconnectTimeout => {
                ctx.media_disconnect_timeout = None;
                ctx.info_sink.send(InfoEvent::MediaDisconnected);
            }
        }
    }

    fn reset(&mut self) {
        let ctx = &mut self.ctx;
        if let Some(assoc) = self.assoc.take() {
            assoc.cancel(ctx);
        }
        self.assoc = Some(assoc::State::Idle);
        self.cntl = self.cntl.take().map(|state| state.reset(ctx));
    }

    fn cntl_idle(&self) -> bool {
        self.cntl.as_ref().map_or(true, |s| s.is_idle())
    }

    fn is_idle(&self) -> bool {
        self.cntl_idle() && self.assoc.as_ref().map_or(true, |s| s.is_idle())
    }

    pub fn status(&self) -> Status {
        let active = &self.ctx.active;
        let connecting = self.cntl.as_ref().map_or(false, |s| s.is_connecting());
        Status {
            connected_to: if active.is_connected() { Some(active.clone()) } else { None },
            connecting_to: if connecting { Some(self.ctx.aux.ssid.clone()) } else { None },
            cntl_state: self.cntl.as_ref().map_or("Idle", |s| s.name()),
            assoc_state: self.assoc.as_ref().map_or("Idle", |s| s.name()),
        }
    }

    pub fn active(&self) -> &ActiveRecord {
        &self.ctx.active
    }

    pub fn scan_table(&self) -> &BssTable {
        &self.ctx.scan_table
    }

    /// Looks for a better AP of the current ESS given the signal strength of the current
    /// link. `now` is on the same clock as `BssEntry::last_beacon`. Returns whether a roam
    /// was queued.
    pub fn check_for_roaming(&mut self, now: Duration, rssi_dbm: i8) -> bool {
        let active = &self.ctx.active;
        if !self.cntl_idle() || !active.is_infra() {
            return false;
        }
        let candidates =
            self.ctx.scan_table.roam_candidates(now, &active.bssid, &active.ssid, rssi_dbm);
        if candidates.is_empty() {
            return false;
        }
        info!("{} roaming candidates at {} dBm", candidates.len(), rssi_dbm);
        self.ctx.queue.push(MlmeMsg::Cntl(CntlEvent::RoamReq { candidates }));
        true
    }

    /// Queues a connect request for the last requested SSID if the station lost its link
    /// on its own. Returns whether a request was queued.
    pub fn auto_reconnect(&mut self) -> bool {
        let ctx = &self.ctx;
        if !self.is_idle()
            || ctx.active.is_connected()
            || ctx.op.radio_off
            || !ctx.config.auto_reconnect
            || !is_valid_ssid(&ctx.auto_reconnect_ssid)
        {
            return false;
        }
        debug!("reconnecting to {:?}", String::from_utf8_lossy(&ctx.auto_reconnect_ssid));
        let ssid = ctx.auto_reconnect_ssid.clone();
        self.ctx.queue.push(MlmeMsg::Cntl(CntlEvent::SsidReq { ssid, from_user: false }));
        true
    }
}
