// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{
            assoc::{AssocEvent, AssocRequest, DisassocRequest},
            bss::{BssEntry, BssTable},
            context::{Context, WorkingContext},
            rsn::negotiate_cipher,
            MlmeMsg,
        },
        config::{AuthMode, BssType},
        device::Device,
        mac::{is_valid_ssid, Bssid, CapabilityInfo, ChannelNumber, ReasonCode, Ssid, StatusCode},
        AuthAlgorithm, AuthenticateRequest, ConnectResult, InfoEvent, JoinRequest, MlmeRequest,
        ScanRequest, ScanType, StartRequest,
    },
    log::{debug, error, info, warn},
};

#[derive(Debug)]
pub enum CntlEvent {
    SsidReq { ssid: Ssid, from_user: bool },
    BssidReq { bssid: Bssid },
    ScanReq,
    DisassocReq,
    RoamReq { candidates: BssTable },
    ScanConf { status: StatusCode },
    JoinConf { status: StatusCode },
    StartConf { status: StatusCode, bssid: Bssid, channel: ChannelNumber },
    AuthConf { status: StatusCode },
    AssocConf { status: StatusCode },
    ReassocConf { status: StatusCode },
    DisassocConf { status: StatusCode },
    /// The peer tore down the active link.
    PeerLinkLost,
}

impl CntlEvent {
    fn is_request(&self) -> bool {
        match self {
            CntlEvent::SsidReq { .. }
            | CntlEvent::BssidReq { .. }
            | CntlEvent::ScanReq
            | CntlEvent::DisassocReq
            | CntlEvent::RoamReq { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum State {
    Idle,
    WaitDisassoc,
    WaitJoin,
    WaitReassoc,
    WaitStart,
    WaitAuth,
    WaitAuthRetry,
    WaitAssoc,
    WaitScanForUserRequest { then_connect: bool },
    WaitDisassocForUserRequest,
}

impl State {
    pub fn on_event<D: Device>(self, event: CntlEvent, ctx: &mut Context<D>) -> Self {
        match self {
            State::Idle => {
                if ctx.op.radio_off && event.is_request() {
                    info!("radio is off, dropping {:?}", event);
                    ctx.aux.from_user = false;
                    return State::Idle;
                }
                match event {
                    CntlEvent::SsidReq { ssid, from_user } => on_ssid_req(ssid, from_user, ctx),
                    CntlEvent::BssidReq { bssid } => on_bssid_req(bssid, ctx),
                    CntlEvent::ScanReq => on_scan_req(ctx),
                    CntlEvent::DisassocReq => on_disassoc_req(ctx),
                    CntlEvent::RoamReq { candidates } => on_roam_req(candidates, ctx),
                    // Already handled by the association machine.
                    CntlEvent::PeerLinkLost => State::Idle,
                    other => {
                        warn!("unexpected {:?} while idle", other);
                        State::Idle
                    }
                }
            }
            State::WaitDisassoc => match event {
                CntlEvent::DisassocConf { status } => {
                    if status == StatusCode::FAIL_NO_RESOURCE {
                        error!("out of buffers while disassociating, giving up");
                        return finish(ctx, ConnectResult::Failed(status));
                    }
                    ctx.link_down(false);
                    ctx.aux.bss_idx = 0;
                    iterate(ctx)
                }
                other => State::WaitDisassoc.ignore(other),
            },
            State::WaitJoin => match event {
                CntlEvent::JoinConf { status } if status.is_success() => {
                    if ctx.aux.bss_type == Some(BssType::Adhoc) {
                        ctx.link_up(BssType::Adhoc);
                        return finish(ctx, ConnectResult::Success);
                    }
                    let alg = initial_auth_alg(ctx.config.auth_mode);
                    authenticate(ctx, alg, State::WaitAuth)
                }
                CntlEvent::JoinConf { status } => {
                    info!("join {:02x?} failed: {}", ctx.aux.bssid, status.0);
                    next_candidate(ctx, status)
                }
                other => State::WaitJoin.ignore(other),
            },
            State::WaitAuth => match event {
                CntlEvent::AuthConf { status } if status.is_success() => request_assoc(ctx),
                CntlEvent::AuthConf { status } => {
                    info!(
                        "authentication with {:02x?} failed: {}, retrying",
                        ctx.aux.bssid, status.0
                    );
                    let alg = ctx.aux.auth_alg.unwrap_or(AuthAlgorithm::OpenSystem);
                    authenticate(ctx, alg, State::WaitAuthRetry)
                }
                other => State::WaitAuth.ignore(other),
            },
            State::WaitAuthRetry => match event {
                CntlEvent::AuthConf { status } if status.is_success() => request_assoc(ctx),
                CntlEvent::AuthConf { status } => {
                    if ctx.config.auth_mode == AuthMode::AutoSwitch
                        && ctx.aux.auth_alg == Some(AuthAlgorithm::SharedKey)
                    {
                        info!("shared key authentication failed, trying open system");
                        return authenticate(ctx, AuthAlgorithm::OpenSystem, State::WaitAuthRetry);
                    }
                    info!("authentication with {:02x?} failed: {}", ctx.aux.bssid, status.0);
                    next_candidate(ctx, status)
                }
                other => State::WaitAuthRetry.ignore(other),
            },
            State::WaitAssoc => match event {
                CntlEvent::AssocConf { status } if status.is_success() => {
                    ctx.link_up(BssType::Infrastructure);
                    finish(ctx, ConnectResult::Success)
                }
                CntlEvent::AssocConf { status } => {
                    if status == StatusCode::FAIL_NO_RESOURCE
                        || (status == StatusCode::STATE_MACHINE_REJECT && ctx.op.block_assoc)
                    {
                        error!("association aborted: {}", status.0);
                        return finish(ctx, ConnectResult::Failed(status));
                    }
                    info!("association with {:02x?} failed: {}", ctx.aux.bssid, status.0);
                    next_candidate(ctx, status)
                }
                other => State::WaitAssoc.ignore(other),
            },
            State::WaitReassoc => match event {
                CntlEvent::ReassocConf { status } if status.is_success() => {
                    ctx.link_up(BssType::Infrastructure);
                    to_idle(ctx)
                }
                CntlEvent::ReassocConf { status } if status == StatusCode::FAIL_NO_RESOURCE => {
                    error!("out of buffers while roaming, staying on channel {}", ctx.channel);
                    let channel = ctx.channel;
                    ctx.lock_channel(channel);
                    to_idle(ctx)
                }
                CntlEvent::ReassocConf { status } => {
                    info!("reassociation with {:02x?} failed: {}", ctx.aux.bssid, status.0);
                    ctx.aux.roam_idx += 1;
                    iterate_roam(ctx)
                }
                CntlEvent::PeerLinkLost => {
                    info!("link lost while roaming, abandoning roam");
                    to_idle(ctx)
                }
                other => State::WaitReassoc.ignore(other),
            },
            State::WaitStart => match event {
                CntlEvent::StartConf { status, bssid, channel } if status.is_success() => {
                    ctx.aux.bssid = bssid;
                    ctx.aux.channel = channel;
                    ctx.aux.bss_type = Some(BssType::Adhoc);
                    ctx.aux.capability = CapabilityInfo::IBSS;
                    ctx.link_up(BssType::Adhoc);
                    finish(ctx, ConnectResult::Success)
                }
                CntlEvent::StartConf { status, .. } => {
                    error!("failed to start IBSS: {}", status.0);
                    finish(ctx, ConnectResult::Failed(status))
                }
                other => State::WaitStart.ignore(other),
            },
            State::WaitScanForUserRequest { then_connect } => match event {
                CntlEvent::ScanConf { status } => {
                    if !status.is_success() {
                        warn!("scan failed: {}", status.0);
                    }
                    if then_connect {
                        ctx.aux.candidates = ctx.scan_table.ssid_sort(&ctx.config, &ctx.aux.ssid);
                        ctx.aux.bss_idx = 0;
                        iterate(ctx)
                    } else {
                        ctx.info_sink.send(InfoEvent::ScanFinished);
                        to_idle(ctx)
                    }
                }
                other => State::WaitScanForUserRequest { then_connect }.ignore(other),
            },
            State::WaitDisassocForUserRequest => match event {
                CntlEvent::DisassocConf { .. } => {
                    ctx.link_down(false);
                    to_idle(ctx)
                }
                other => State::WaitDisassocForUserRequest.ignore(other),
            },
        }
    }

    fn ignore(self, event: CntlEvent) -> Self {
        match event {
            CntlEvent::PeerLinkLost => debug!("link lost in {}", self.name()),
            other => warn!("unexpected {:?} in {}", other, self.name()),
        }
        self
    }

    /// Abandons the attempt in progress. A user is told that the attempt was canceled
    /// and a failed roam returns to the previous channel.
    pub fn reset<D: Device>(self, ctx: &mut Context<D>) -> Self {
        match self {
            State::Idle
            | State::WaitScanForUserRequest { then_connect: false }
            | State::WaitDisassocForUserRequest => {}
            State::WaitReassoc => {
                let channel = ctx.channel;
                ctx.lock_channel(channel);
            }
            _ => {
                if ctx.aux.from_user {
                    ctx.info_sink
                        .send(InfoEvent::ConnectFinished { result: ConnectResult::Canceled });
                }
            }
        }
        if self != State::Idle {
            info!("canceled {}", self.name());
        }
        to_idle(ctx)
    }

    pub fn is_idle(&self) -> bool {
        *self == State::Idle
    }

    /// Whether the state belongs to an attempt to connect to a network.
    pub fn is_connecting(&self) -> bool {
        match self {
            State::Idle
            | State::WaitScanForUserRequest { then_connect: false }
            | State::WaitDisassocForUserRequest => false,
            _ => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::WaitDisassoc => "WaitDisassoc",
            State::WaitJoin => "WaitJoin",
            State::WaitReassoc => "WaitReassoc",
            State::WaitStart => "WaitStart",
            State::WaitAuth => "WaitAuth",
            State::WaitAuthRetry => "WaitAuthRetry",
            State::WaitAssoc => "WaitAssoc",
            State::WaitScanForUserRequest { .. } => "WaitScanForUserRequest",
            State::WaitDisassocForUserRequest => "WaitDisassocForUserRequest",
        }
    }
}

fn on_ssid_req<D: Device>(ssid: Ssid, from_user: bool, ctx: &mut Context<D>) -> State {
    info!("connect to {:?} requested", String::from_utf8_lossy(&ssid));
    ctx.aux.ssid = ssid.clone();
    ctx.aux.from_user = from_user;
    ctx.auto_reconnect_ssid = ssid.clone();
    if ctx.op.block_assoc {
        return reject_blocked(ctx);
    }

    ctx.aux.candidates = ctx.scan_table.ssid_sort(&ctx.config, &ssid);
    debug!("{} candidates", ctx.aux.candidates.len());

    if ctx.active.is_connected() {
        let active = &ctx.active;
        let best_is_active = ctx
            .aux
            .candidates
            .get(0)
            .map_or(false, |bss| bss.bssid == active.bssid && bss.ssid == active.ssid);
        if best_is_active && !ctx.needs_reconnect() {
            info!("already connected to {:02x?}", active.bssid);
            return finish(ctx, ConnectResult::Success);
        }
        if ctx.active.is_infra() {
            return disassociate(ctx, State::WaitDisassoc);
        }
        ctx.link_down(false);
    }

    if ctx.aux.candidates.is_empty()
        && ctx.config.auto_reconnect
        && ctx.config.bss_type == BssType::Infrastructure
        && is_valid_ssid(&ssid)
    {
        info!("no candidate for {:?}, scanning", String::from_utf8_lossy(&ssid));
        let bss_type = ctx.config.bss_type;
        request_scan(ctx, ssid, bss_type, ScanType::Active);
        return State::WaitScanForUserRequest { then_connect: true };
    }

    ctx.aux.bss_idx = 0;
    iterate(ctx)
}

fn on_bssid_req<D: Device>(bssid: Bssid, ctx: &mut Context<D>) -> State {
    info!("connect to {:02x?} requested", bssid);
    ctx.aux.from_user = true;
    if ctx.op.block_assoc {
        return reject_blocked(ctx);
    }
    let bss = match ctx.scan_table.search(&bssid) {
        Some(bss) => bss.clone(),
        None => {
            warn!("{:02x?} not found in scan table", bssid);
            return finish(ctx, ConnectResult::Failed(StatusCode::UNSPECIFIED_FAILURE));
        }
    };

    ctx.auto_reconnect_ssid = bss.ssid.clone();
    ctx.aux.ssid = bss.ssid.clone();
    ctx.aux.candidates = BssTable::from(vec![bss]);

    if ctx.active.is_connected() && ctx.active.bssid == bssid {
        info!("already connected to {:02x?}", bssid);
        return finish(ctx, ConnectResult::Success);
    }
    if ctx.active.is_infra() {
        return disassociate(ctx, State::WaitDisassoc);
    }
    ctx.link_down(false);
    ctx.aux.bss_idx = 0;
    iterate(ctx)
}

fn on_scan_req<D: Device>(ctx: &mut Context<D>) -> State {
    ctx.aux.from_user = true;
    let active = &ctx.active;
    let current = if active.is_connected() {
        ctx.scan_table.search_ssid(&active.bssid, &active.ssid, active.channel).cloned()
    } else {
        None
    };
    ctx.scan_table.clear();
    if let Some(bss) = current {
        ctx.scan_table.insert(bss);
    }
    request_scan(ctx, vec![], BssType::Any, ScanType::Passive);
    State::WaitScanForUserRequest { then_connect: false }
}

fn on_disassoc_req<D: Device>(ctx: &mut Context<D>) -> State {
    ctx.aux.from_user = true;
    ctx.auto_reconnect_ssid.clear();
    if ctx.active.is_infra() {
        return disassociate(ctx, State::WaitDisassocForUserRequest);
    }
    ctx.link_down(false);
    to_idle(ctx)
}

fn on_roam_req<D: Device>(mut candidates: BssTable, ctx: &mut Context<D>) -> State {
    if ctx.op.block_assoc || !ctx.active.is_infra() {
        debug!("not roaming");
        return to_idle(ctx);
    }
    candidates.sort_by_rssi();
    info!("roaming, {} candidates", candidates.len());
    ctx.aux.ssid = ctx.active.ssid.clone();
    ctx.aux.roam_candidates = candidates;
    ctx.aux.roam_idx = 0;
    iterate_roam(ctx)
}

fn initial_auth_alg(auth_mode: AuthMode) -> AuthAlgorithm {
    match auth_mode {
        AuthMode::Shared | AuthMode::AutoSwitch => AuthAlgorithm::SharedKey,
        _ => AuthAlgorithm::OpenSystem,
    }
}

fn request_scan<D>(ctx: &mut Context<D>, ssid: Ssid, bss_type: BssType, scan_type: ScanType) {
    ctx.mlme_sink.send(MlmeRequest::Scan(ScanRequest { ssid, bss_type, scan_type }));
}

fn authenticate<D>(ctx: &mut Context<D>, auth_type: AuthAlgorithm, next: State) -> State {
    if ctx.op.block_assoc {
        return reject_blocked(ctx);
    }
    debug!("authenticating with {:02x?} ({:?})", ctx.aux.bssid, auth_type);
    ctx.aux.auth_alg = Some(auth_type);
    ctx.mlme_sink.send(MlmeRequest::Authenticate(AuthenticateRequest {
        peer_sta_address: ctx.aux.bssid,
        auth_type,
        auth_failure_timeout: ctx.config.auth_timeout,
    }));
    next
}

fn request_assoc<D>(ctx: &mut Context<D>) -> State {
    if ctx.op.block_assoc {
        return reject_blocked(ctx);
    }
    ctx.queue.push(MlmeMsg::Assoc(AssocEvent::AssocReq(AssocRequest {
        bssid: ctx.aux.bssid,
        capability: ctx.aux.capability,
        timeout: ctx.config.assoc_timeout,
        listen_interval: ctx.config.listen_interval,
    })));
    State::WaitAssoc
}

fn disassociate<D>(ctx: &mut Context<D>, next: State) -> State {
    ctx.queue.push(MlmeMsg::Assoc(AssocEvent::DisassocReq(DisassocRequest {
        addr: ctx.active.bssid,
        reason: ReasonCode::DISASSOC_STA_LEAVING,
    })));
    next
}

fn join<D>(ctx: &mut Context<D>, bss: BssEntry) -> State {
    ctx.mlme_sink.send(MlmeRequest::Join(JoinRequest {
        selected_bss: Box::new(bss),
        join_failure_timeout: ctx.config.join_timeout,
    }));
    State::WaitJoin
}

fn start<D>(ctx: &mut Context<D>) -> State {
    info!("starting IBSS {:?}", String::from_utf8_lossy(&ctx.aux.ssid));
    ctx.mlme_sink.send(MlmeRequest::Start(StartRequest { ssid: ctx.aux.ssid.clone() }));
    State::WaitStart
}

fn next_candidate<D: Device>(ctx: &mut Context<D>, status: StatusCode) -> State {
    ctx.aux.last_status = Some(status);
    ctx.aux.bss_idx += 1;
    iterate(ctx)
}

fn iterate<D: Device>(ctx: &mut Context<D>) -> State {
    if ctx.op.block_assoc {
        if ctx.channel != 0 {
            let channel = ctx.channel;
            ctx.lock_channel(channel);
        }
        return reject_blocked(ctx);
    }
    let bss = match ctx.aux.candidates.get(ctx.aux.bss_idx) {
        Some(bss) => bss.clone(),
        None if ctx.config.bss_type == BssType::Adhoc => return start(ctx),
        None => {
            info!("no more candidates for {:?}", String::from_utf8_lossy(&ctx.aux.ssid));
            if ctx.channel != 0 {
                let channel = ctx.channel;
                ctx.lock_channel(channel);
            }
            let status = ctx.aux.last_status.unwrap_or(StatusCode::UNSPECIFIED_FAILURE);
            return finish(ctx, ConnectResult::Failed(status));
        }
    };
    debug!(
        "trying candidate {}/{}: {:02x?}",
        ctx.aux.bss_idx + 1,
        ctx.aux.candidates.len(),
        bss.bssid
    );
    ctx.aux.cipher = Some(negotiate_cipher(ctx.config.auth_mode, ctx.config.cipher, &bss));
    ctx.aux.adopt(&bss);
    join(ctx, bss)
}

fn iterate_roam<D: Device>(ctx: &mut Context<D>) -> State {
    let bss = match ctx.aux.roam_candidates.get(ctx.aux.roam_idx) {
        Some(bss) if !ctx.op.block_assoc => bss.clone(),
        _ => {
            info!("roaming failed, back to channel {}", ctx.channel);
            let channel = ctx.channel;
            ctx.lock_channel(channel);
            return to_idle(ctx);
        }
    };
    debug!("reassociating with {:02x?}", bss.bssid);
    ctx.lock_channel(bss.channel);
    ctx.aux.cipher = Some(negotiate_cipher(ctx.config.auth_mode, ctx.config.cipher, &bss));
    ctx.aux.adopt(&bss);
    ctx.queue.push(MlmeMsg::Assoc(AssocEvent::ReassocReq(AssocRequest {
        bssid: bss.bssid,
        capability: bss.capability,
        timeout: ctx.config.assoc_timeout,
        listen_interval: ctx.config.listen_interval,
    })));
    State::WaitReassoc
}

/// Ends the attempt without contacting another peer while association is blocked.
fn reject_blocked<D>(ctx: &mut Context<D>) -> State {
    warn!("association blocked, abandoning attempt");
    finish(ctx, ConnectResult::Failed(StatusCode::STATE_MACHINE_REJECT))
}

fn finish<D>(ctx: &mut Context<D>, result: ConnectResult) -> State {
    info!("connect finished: {:?}", result);
    if ctx.aux.from_user {
        ctx.info_sink.send(InfoEvent::ConnectFinished { result });
    }
    to_idle(ctx)
}

fn to_idle<D>(ctx: &mut Context<D>) -> State {
    ctx.aux = WorkingContext::default();
    State::Idle
}
