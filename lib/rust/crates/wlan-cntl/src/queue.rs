// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{AssocEvent, AssocResponse, BssEntry, BssTable, CntlEvent, MlmeMsg, Pmkid},
        config::StationConfig,
        error::Error,
        mac::{Bssid, ChannelNumber, MacAddr, ReasonCode, Ssid, StatusCode},
        timer::EventId,
    },
    log::error,
    parking_lot::Mutex,
    std::{collections::VecDeque, sync::Arc, time::Duration},
};

pub const MAX_QUEUE_LEN: usize = 64;

struct Inner {
    msgs: VecDeque<MlmeMsg>,
    // Both state machines were idle after the last processed message.
    machines_idle: bool,
    // User requests waiting in `msgs`.
    queued_user_requests: usize,
}

impl Inner {
    fn push_back(&mut self, msg: MlmeMsg) {
        if msg.is_user_request() {
            self.queued_user_requests += 1;
        }
        self.msgs.push_back(msg);
    }

    fn has_room_for(&self, n: usize) -> bool {
        self.msgs.len() + n <= MAX_QUEUE_LEN
    }
}

/// The consuming end of the station's message queue. Only the station's worker
/// dequeues; messages the state machines send each other are appended here as well.
pub struct MlmeQueue {
    inner: Arc<Mutex<Inner>>,
}

/// Producer side of the station's message queue. Cheap to clone and safe to use
/// from any thread; it never calls into the state machines.
#[derive(Clone)]
pub struct MlmeHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MlmeQueue {
    pub fn new() -> (Self, MlmeHandle) {
        let inner = Arc::new(Mutex::new(Inner {
            msgs: VecDeque::with_capacity(MAX_QUEUE_LEN),
            machines_idle: true,
            queued_user_requests: 0,
        }));
        (MlmeQueue { inner: inner.clone() }, MlmeHandle { inner })
    }

    pub fn handle(&self) -> MlmeHandle {
        MlmeHandle { inner: self.inner.clone() }
    }

    pub fn pop(&self) -> Option<MlmeMsg> {
        let mut inner = self.inner.lock();
        let msg = inner.msgs.pop_front()?;
        if msg.is_user_request() {
            inner.queued_user_requests -= 1;
        }
        Some(msg)
    }

    /// Appends a message produced by the state machines themselves. Each processed
    /// message produces at most a couple of these, so they bypass the length limit and
    /// a confirmation is never lost.
    pub fn push(&self, msg: MlmeMsg) {
        self.inner.lock().push_back(msg);
    }

    pub fn set_machines_idle(&self, idle: bool) {
        self.inner.lock().machines_idle = idle;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().msgs.is_empty()
    }
}

impl MlmeHandle {
    fn enqueue(&self, msg: MlmeMsg) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if !inner.has_room_for(1) {
            error!("MLME queue full, dropping {:?}", msg);
            return Err(Error::QueueFull);
        }
        inner.push_back(msg);
        Ok(())
    }

    // A request arriving while an attempt is running or still queued supersedes it.
    fn enqueue_user_request(&self, msg: MlmeMsg) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let supersede = !inner.machines_idle || inner.queued_user_requests > 0;
        if !inner.has_room_for(if supersede { 2 } else { 1 }) {
            error!("MLME queue full, dropping {:?}", msg);
            return Err(Error::QueueFull);
        }
        if supersede {
            inner.push_back(MlmeMsg::Reset);
        }
        inner.push_back(msg);
        Ok(())
    }

    pub fn request_ssid(&self, ssid: Ssid) -> Result<(), Error> {
        if ssid.len() > crate::mac::MAX_SSID_LEN {
            return Err(Error::InvalidRequest(format!("SSID too long: {} bytes", ssid.len())));
        }
        self.enqueue_user_request(MlmeMsg::Cntl(CntlEvent::SsidReq { ssid, from_user: true }))
    }

    pub fn request_bssid(&self, bssid: Bssid) -> Result<(), Error> {
        self.enqueue_user_request(MlmeMsg::Cntl(CntlEvent::BssidReq { bssid }))
    }

    pub fn request_disassociate(&self) -> Result<(), Error> {
        self.enqueue_user_request(MlmeMsg::Cntl(CntlEvent::DisassocReq))
    }

    pub fn request_scan(&self) -> Result<(), Error> {
        self.enqueue_user_request(MlmeMsg::Cntl(CntlEvent::ScanReq))
    }

    pub fn request_roam(&self, candidates: BssTable) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Cntl(CntlEvent::RoamReq { candidates }))
    }

    pub fn report_bss(&self, bss: BssEntry) -> Result<(), Error> {
        self.enqueue(MlmeMsg::BssInfo(Box::new(bss)))
    }

    pub fn scan_conf(&self, status: StatusCode) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Cntl(CntlEvent::ScanConf { status }))
    }

    pub fn join_conf(&self, status: StatusCode) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Cntl(CntlEvent::JoinConf { status }))
    }

    /// Confirms a `Start` request. On success `bssid` and `channel` describe the new IBSS.
    pub fn start_conf(
        &self,
        status: StatusCode,
        bssid: Bssid,
        channel: ChannelNumber,
    ) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Cntl(CntlEvent::StartConf { status, bssid, channel }))
    }

    pub fn auth_conf(&self, status: StatusCode) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Cntl(CntlEvent::AuthConf { status }))
    }

    pub fn peer_assoc_rsp(&self, rsp: AssocResponse) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Assoc(AssocEvent::PeerAssocRsp(rsp)))
    }

    pub fn peer_reassoc_rsp(&self, rsp: AssocResponse) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Assoc(AssocEvent::PeerReassocRsp(rsp)))
    }

    pub fn peer_disassoc(&self, addr: MacAddr, reason: ReasonCode) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Assoc(AssocEvent::PeerDisassoc { addr, reason }))
    }

    pub fn peer_deauth(&self, addr: MacAddr, reason: ReasonCode) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Assoc(AssocEvent::PeerDeauth { addr, reason }))
    }

    /// A class 3 frame arrived from `addr`, which is not associated with us.
    pub fn cls3_error(&self, addr: MacAddr) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Assoc(AssocEvent::Cls3Err { addr }))
    }

    pub fn timer_fired(&self, event_id: EventId) -> Result<(), Error> {
        self.enqueue(MlmeMsg::Timeout(event_id))
    }

    pub fn set_config(&self, config: StationConfig) -> Result<(), Error> {
        config.validate()?;
        self.enqueue(MlmeMsg::SetConfig(Box::new(config)))
    }

    pub fn set_port_secured(&self, secured: bool) -> Result<(), Error> {
        self.enqueue(MlmeMsg::SetPortSecured(secured))
    }

    pub fn set_radio(&self, on: bool) -> Result<(), Error> {
        self.enqueue(MlmeMsg::SetRadio(on))
    }

    pub fn set_pmkid(&self, bssid: Bssid, pmkid: Pmkid) -> Result<(), Error> {
        self.enqueue(MlmeMsg::SetPmkid { bssid, pmkid })
    }

    /// Refuses every association for `duration`, e.g. after a MIC failure countermeasure.
    pub fn block_association(&self, duration: Duration) -> Result<(), Error> {
        self.enqueue(MlmeMsg::BlockAssoc(duration))
    }
}
