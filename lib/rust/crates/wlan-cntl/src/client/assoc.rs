// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{
            bss::EdcaParams, cntl::CntlEvent, context::Context, rsn::build_security_ie, MlmeMsg,
        },
        config::BssType,
        device::{AssocReqFrame, Device, MgmtFrame},
        error::Error,
        mac::{
            is_unicast, Bssid, CapabilityInfo, MacAddr, ReasonCode, StatusCode, AID_MASK, MAX_AID,
            MAX_SUPPORTED_RATES, SUPPORTED_CAPABILITY_INFO, ZERO_ADDR,
        },
        timer::EventId,
    },
    bytes::{BufMut, BytesMut},
    log::{debug, error, info, warn},
    std::time::Duration,
};

const IE_VENDOR_SPECIFIC: u8 = 221;
// WMM information element, version 1. The last byte carries the QoS info.
const WME_IE_PREFIX: [u8; 8] = [IE_VENDOR_SPECIFIC, 0x07, 0x00, 0x50, 0xf2, 0x02, 0x00, 0x01];

#[derive(Clone, Debug, PartialEq)]
pub struct AssocRequest {
    pub bssid: Bssid,
    pub capability: CapabilityInfo,
    pub timeout: Duration,
    pub listen_interval: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisassocRequest {
    pub addr: MacAddr,
    pub reason: ReasonCode,
}

/// A parsed association or reassociation response.
#[derive(Clone, Debug, PartialEq)]
pub struct AssocResponse {
    /// Transmitter address.
    pub addr: MacAddr,
    pub capability: CapabilityInfo,
    pub status: StatusCode,
    pub aid: u16,
    pub rates: Vec<u8>,
    pub ext_rates: Vec<u8>,
    pub edca: Option<EdcaParams>,
}

#[derive(Debug)]
pub enum AssocEvent {
    AssocReq(AssocRequest),
    ReassocReq(AssocRequest),
    DisassocReq(DisassocRequest),
    PeerAssocRsp(AssocResponse),
    PeerReassocRsp(AssocResponse),
    PeerDisassoc { addr: MacAddr, reason: ReasonCode },
    PeerDeauth { addr: MacAddr, reason: ReasonCode },
    AssocTimeout,
    ReassocTimeout,
    DisassocTimeout,
    Cls3Err { addr: MacAddr },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exchange {
    Assoc,
    Reassoc,
    Disassoc,
}

impl Exchange {
    fn conf(self, status: StatusCode) -> CntlEvent {
        match self {
            Exchange::Assoc => CntlEvent::AssocConf { status },
            Exchange::Reassoc => CntlEvent::ReassocConf { status },
            Exchange::Disassoc => CntlEvent::DisassocConf { status },
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum State {
    Idle,
    WaitAssocRsp { timeout: EventId },
    WaitReassocRsp { timeout: EventId },
    WaitDisassocRsp { timeout: EventId },
}

impl State {
    pub fn on_event<D: Device>(self, event: AssocEvent, ctx: &mut Context<D>) -> Self {
        match event {
            AssocEvent::PeerDisassoc { addr, reason } | AssocEvent::PeerDeauth { addr, reason } => {
                self.on_peer_link_loss(addr, reason, ctx)
            }
            AssocEvent::Cls3Err { addr } => {
                send_cls3_disassoc(addr, ctx);
                self
            }
            event => match self {
                State::Idle => match event {
                    AssocEvent::AssocReq(req) => send_assoc_req(req, Exchange::Assoc, ctx),
                    AssocEvent::ReassocReq(req) => send_assoc_req(req, Exchange::Reassoc, ctx),
                    AssocEvent::DisassocReq(req) => send_disassoc_req(req, ctx),
                    other => {
                        // Responses and timeouts of an exchange that already ended.
                        debug!("ignoring {:?} while idle", other);
                        State::Idle
                    }
                },
                State::WaitAssocRsp { timeout } => match event {
                    AssocEvent::PeerAssocRsp(rsp) => {
                        on_assoc_rsp(rsp, timeout, Exchange::Assoc, ctx)
                            .unwrap_or(State::WaitAssocRsp { timeout })
                    }
                    AssocEvent::AssocTimeout => {
                        info!("no association response from {:02x?}", ctx.aux.bssid);
                        confirm(ctx, Exchange::Assoc, StatusCode::REJECTED_TIMEOUT)
                    }
                    other => State::WaitAssocRsp { timeout }.on_unexpected(other, ctx),
                },
                State::WaitReassocRsp { timeout } => match event {
                    AssocEvent::PeerReassocRsp(rsp) => {
                        on_assoc_rsp(rsp, timeout, Exchange::Reassoc, ctx)
                            .unwrap_or(State::WaitReassocRsp { timeout })
                    }
                    AssocEvent::ReassocTimeout => {
                        info!("no reassociation response from {:02x?}", ctx.aux.bssid);
                        confirm(ctx, Exchange::Reassoc, StatusCode::REJECTED_TIMEOUT)
                    }
                    other => State::WaitReassocRsp { timeout }.on_unexpected(other, ctx),
                },
                State::WaitDisassocRsp { timeout } => match event {
                    AssocEvent::DisassocTimeout => {
                        confirm(ctx, Exchange::Disassoc, StatusCode::SUCCESS)
                    }
                    other => State::WaitDisassocRsp { timeout }.on_unexpected(other, ctx),
                },
            },
        }
    }

    // A new request in the middle of an exchange: return to Idle and reject it.
    fn on_unexpected<D: Device>(self, event: AssocEvent, ctx: &mut Context<D>) -> Self {
        let exchange = match event {
            AssocEvent::AssocReq(_) => Exchange::Assoc,
            AssocEvent::ReassocReq(_) => Exchange::Reassoc,
            AssocEvent::DisassocReq(_) => Exchange::Disassoc,
            other => {
                debug!("ignoring {:?} in {}", other, self.name());
                return self;
            }
        };
        warn!("{:?} request in {}, resetting association machine", exchange, self.name());
        self.cancel(ctx);
        confirm(ctx, exchange, StatusCode::STATE_MACHINE_REJECT)
    }

    fn on_peer_link_loss<D: Device>(
        self,
        addr: MacAddr,
        reason: ReasonCode,
        ctx: &mut Context<D>,
    ) -> Self {
        if !ctx.active.is_infra() || addr != ctx.active.bssid {
            debug!("ignoring disassociation from {:02x?}", addr);
            return self;
        }
        info!("disassociated by {:02x?}, reason {}", addr, reason.0);
        ctx.link_down(true);
        let was_disassociating = matches!(self, State::WaitDisassocRsp { .. });
        self.cancel(ctx);
        if was_disassociating {
            ctx.queue.push(MlmeMsg::Cntl(Exchange::Disassoc.conf(StatusCode::SUCCESS)));
        }
        ctx.queue.push(MlmeMsg::Cntl(CntlEvent::PeerLinkLost));
        State::Idle
    }

    /// Abandons the exchange in progress, if any, without confirming it.
    pub fn cancel<D>(self, ctx: &mut Context<D>) {
        match self {
            State::Idle => {}
            State::WaitAssocRsp { timeout }
            | State::WaitReassocRsp { timeout }
            | State::WaitDisassocRsp { timeout } => ctx.timer.cancel_event(timeout),
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == State::Idle
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::WaitAssocRsp { .. } => "WaitAssocRsp",
            State::WaitReassocRsp { .. } => "WaitReassocRsp",
            State::WaitDisassocRsp { .. } => "WaitDisassocRsp",
        }
    }
}

fn confirm<D>(ctx: &mut Context<D>, exchange: Exchange, status: StatusCode) -> State {
    ctx.queue.push(MlmeMsg::Cntl(exchange.conf(status)));
    State::Idle
}

fn validate_assoc_req(req: &AssocRequest) -> Result<(), Error> {
    if req.bssid == ZERO_ADDR || !is_unicast(&req.bssid) {
        return Err(Error::InvalidRequest(format!("bad BSSID {:02x?}", req.bssid)));
    }
    if req.listen_interval == 0 || req.timeout == Duration::from_secs(0) {
        return Err(Error::InvalidRequest("listen interval and timeout must be non-zero".into()));
    }
    Ok(())
}

fn wme_ie(edca: &EdcaParams) -> [u8; 9] {
    let mut ie = [0u8; 9];
    ie[..8].copy_from_slice(&WME_IE_PREFIX[..]);
    ie[8] = edca.qos_info & 0x0f;
    ie
}

fn build_assoc_frame<D>(req: &AssocRequest, ctx: &Context<D>) -> AssocReqFrame {
    let mut ies = BytesMut::new();
    if ctx.config.wmm_capable {
        if let Some(edca) = ctx.aux.edca.as_ref() {
            ies.put_slice(&wme_ie(edca)[..]);
        }
    }
    if let Some(cipher) = ctx.aux.cipher.as_ref() {
        let pmkid = ctx.pmkid_cache.get(&req.bssid);
        if let Some(ie) = build_security_ie(ctx.config.auth_mode, cipher, pmkid) {
            ies.put_slice(&ie[..]);
        }
    }
    AssocReqFrame {
        bssid: req.bssid,
        capability: req.capability & SUPPORTED_CAPABILITY_INFO,
        listen_interval: req.listen_interval,
        ssid: ctx.aux.ssid.clone(),
        rates: ctx.config.supported_rates.clone(),
        ext_rates: ctx.config.ext_supported_rates.clone(),
        ies: ies.freeze(),
    }
}

fn send_assoc_req<D: Device>(req: AssocRequest, exchange: Exchange, ctx: &mut Context<D>) -> State {
    if ctx.op.block_assoc {
        warn!("association blocked, rejecting {:?} request", exchange);
        return confirm(ctx, exchange, StatusCode::STATE_MACHINE_REJECT);
    }
    if let Err(e) = validate_assoc_req(&req) {
        error!("{:?} request failed sanity check: {}", exchange, e);
        return confirm(ctx, exchange, StatusCode::from(&e));
    }

    ctx.aux.bssid = req.bssid;
    let frame = build_assoc_frame(&req, ctx);
    let (frame, timeout_msg) = match exchange {
        Exchange::Reassoc => (
            MgmtFrame::ReassocReq { current_ap: ctx.active.bssid, req: frame },
            AssocEvent::ReassocTimeout,
        ),
        _ => (MgmtFrame::AssocReq(frame), AssocEvent::AssocTimeout),
    };
    if let Err(e) = ctx.device.send_mgmt_frame(frame) {
        error!("error sending {:?} request: {}", exchange, e);
        return confirm(ctx, exchange, StatusCode::from(&e));
    }
    debug!("sent {:?} request to {:02x?}", exchange, req.bssid);

    let timeout = ctx.timer.schedule_event(req.timeout, MlmeMsg::Assoc(timeout_msg));
    match exchange {
        Exchange::Reassoc => State::WaitReassocRsp { timeout },
        _ => State::WaitAssocRsp { timeout },
    }
}

fn send_disassoc_req<D: Device>(req: DisassocRequest, ctx: &mut Context<D>) -> State {
    let frame = MgmtFrame::Disassoc { peer: req.addr, bssid: req.addr, reason: req.reason };
    if let Err(e) = ctx.device.send_mgmt_frame(frame) {
        error!("error sending disassociation: {}", e);
        return confirm(ctx, Exchange::Disassoc, StatusCode::from(&e));
    }
    debug!("sent disassociation to {:02x?}, reason {}", req.addr, req.reason.0);
    let delay = ctx.config.disassoc_timeout;
    let timeout = ctx.timer.schedule_event(delay, MlmeMsg::Assoc(AssocEvent::DisassocTimeout));
    State::WaitDisassocRsp { timeout }
}

fn send_cls3_disassoc<D: Device>(addr: MacAddr, ctx: &mut Context<D>) {
    let frame = MgmtFrame::Disassoc {
        peer: addr,
        bssid: ctx.active.bssid,
        reason: ReasonCode::CLASS3_FRAME_FROM_NONASSOC_STA,
    };
    match ctx.device.send_mgmt_frame(frame) {
        Ok(()) => debug!("class 3 frame from {:02x?}, sent disassociation", addr),
        Err(e) => error!("error sending class 3 disassociation: {}", e),
    }
}

fn validate_assoc_rsp(rsp: &AssocResponse) -> Result<(), Error> {
    if rsp.rates.len() + rsp.ext_rates.len() > MAX_SUPPORTED_RATES {
        return Err(Error::InvalidFrame(format!(
            "{} rates",
            rsp.rates.len() + rsp.ext_rates.len()
        )));
    }
    if rsp.status.is_success() {
        let aid = rsp.aid & AID_MASK;
        if aid == 0 || aid > MAX_AID {
            return Err(Error::InvalidFrame(format!("AID {} out of range", aid)));
        }
        if rsp.rates.is_empty() {
            return Err(Error::InvalidFrame("no supported rates".into()));
        }
    }
    Ok(())
}

// Returns `None` if the response is not the one we wait for.
fn on_assoc_rsp<D>(
    rsp: AssocResponse,
    timeout: EventId,
    exchange: Exchange,
    ctx: &mut Context<D>,
) -> Option<State> {
    if let Err(e) = validate_assoc_rsp(&rsp) {
        // Let the timeout handle it.
        warn!("dropping {:?} response: {}", exchange, e);
        return None;
    }
    if rsp.addr != ctx.aux.bssid {
        debug!("dropping {:?} response from {:02x?}", exchange, rsp.addr);
        return None;
    }

    ctx.timer.cancel_event(timeout);
    info!("{:?} response from {:02x?}, status {}", exchange, rsp.addr, rsp.status.0);
    if rsp.status.is_success() {
        commit_response(&rsp, ctx);
    }
    Some(confirm(ctx, exchange, rsp.status))
}

fn supported_rates<'a>(
    rates: &'a [u8],
    ours: &'a [u8],
    ours_ext: &'a [u8],
) -> impl Iterator<Item = u8> + 'a {
    rates
        .iter()
        .filter(move |r| ours.iter().chain(ours_ext.iter()).any(|o| o & 0x7f == *r & 0x7f))
        .cloned()
}

fn commit_response<D>(rsp: &AssocResponse, ctx: &mut Context<D>) {
    let config = &ctx.config;
    let aux = &mut ctx.aux;
    aux.bss_type = Some(BssType::Infrastructure);
    aux.bssid = rsp.addr;
    aux.aid = rsp.aid & AID_MASK;
    aux.capability = rsp.capability & SUPPORTED_CAPABILITY_INFO;
    aux.edca = rsp.edca;
    aux.rates =
        supported_rates(&rsp.rates, &config.supported_rates, &config.ext_supported_rates).collect();
    aux.ext_rates =
        supported_rates(&rsp.ext_rates, &config.supported_rates, &config.ext_supported_rates)
            .collect();
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            client::{
                bss::BssEntry,
                rsn::negotiate_cipher,
                test_utils::{fake_assoc_rsp, fake_bss, fake_rsn_bss, TestHelper},
            },
            config::{AuthMode, Cipher},
            InfoEvent,
        },
        assert_matches::assert_matches,
    };

    const TIMEOUT: Duration = Duration::from_millis(300);

    fn assoc_req(bssid: Bssid) -> AssocRequest {
        AssocRequest {
            bssid,
            capability: CapabilityInfo::ESS | CapabilityInfo::CF_POLLABLE,
            timeout: TIMEOUT,
            listen_interval: 3,
        }
    }

    fn start_assoc(h: &mut TestHelper) -> (State, Bssid) {
        let bss = fake_bss(b"foo", 1, -40);
        h.ctx.aux.adopt(&bss);
        let state = State::Idle.on_event(AssocEvent::AssocReq(assoc_req(bss.bssid)), &mut h.ctx);
        (state, bss.bssid)
    }

    fn connect(h: &mut TestHelper) -> Bssid {
        let (state, bssid) = start_assoc(h);
        let state = state.on_event(AssocEvent::PeerAssocRsp(fake_assoc_rsp(bssid)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        h.drain_queue();
        h.ctx.link_up(BssType::Infrastructure);
        h.drain_info_events();
        bssid
    }

    #[test]
    fn assoc_happy_path() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);
        assert_matches!(state, State::WaitAssocRsp { .. });
        assert_eq!(h.scheduler.pending().len(), 1);
        assert_eq!(h.scheduler.pending()[0].1, TIMEOUT);

        let frames = h.device.take_frames();
        assert_matches!(&frames[..], [MgmtFrame::AssocReq(frame)] => {
            assert_eq!(frame.bssid, bssid);
            assert_eq!(frame.capability, CapabilityInfo::ESS);
            assert_eq!(frame.ssid, b"foo".to_vec());
            assert_eq!(frame.listen_interval, 3);
            assert!(frame.ies.is_empty());
        });

        let rsp = AssocResponse { aid: 0xc005, ..fake_assoc_rsp(bssid) };
        let state = state.on_event(AssocEvent::PeerAssocRsp(rsp), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.scheduler.pending().is_empty());
        assert_eq!(h.ctx.aux.aid, 5);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::SUCCESS })]
        );
    }

    #[test]
    fn assoc_rsp_post_processing() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);
        let rsp = AssocResponse {
            capability: CapabilityInfo::ESS | CapabilityInfo::CF_POLLABLE | CapabilityInfo::QOS,
            rates: vec![0x82, 0x84, 0x0b, 0x99],
            ext_rates: vec![0x30, 0xee],
            edca: Some(EdcaParams { qos_info: 3, ..EdcaParams::default() }),
            ..fake_assoc_rsp(bssid)
        };
        state.on_event(AssocEvent::PeerAssocRsp(rsp), &mut h.ctx);

        assert_eq!(h.ctx.aux.capability, CapabilityInfo::ESS);
        assert_eq!(h.ctx.aux.rates, vec![0x82, 0x84, 0x0b]);
        assert_eq!(h.ctx.aux.ext_rates, vec![0x30]);
        assert_eq!(h.ctx.aux.edca.map(|e| e.qos_info), Some(3));
        assert_eq!(h.ctx.aux.bss_type, Some(BssType::Infrastructure));
    }

    #[test]
    fn assoc_rejected_by_peer() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);
        let rsp = AssocResponse { status: StatusCode(17), aid: 0, ..fake_assoc_rsp(bssid) };
        let state = state.on_event(AssocEvent::PeerAssocRsp(rsp), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_eq!(h.ctx.aux.aid, 0);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode(17) })]
        );
    }

    #[test]
    fn assoc_rsp_from_other_peer_ignored() {
        let mut h = TestHelper::new();
        let (state, _) = start_assoc(&mut h);
        let state = state.on_event(AssocEvent::PeerAssocRsp(fake_assoc_rsp([7; 6])), &mut h.ctx);
        assert_matches!(state, State::WaitAssocRsp { .. });
        assert!(h.drain_queue().is_empty());
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[test]
    fn malformed_assoc_rsp_ignored() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);

        let too_many_rates = AssocResponse { ext_rates: vec![0x0c; 10], ..fake_assoc_rsp(bssid) };
        let state = state.on_event(AssocEvent::PeerAssocRsp(too_many_rates), &mut h.ctx);
        assert_matches!(state, State::WaitAssocRsp { .. });

        let bad_aid = AssocResponse { aid: 2008, ..fake_assoc_rsp(bssid) };
        let state = state.on_event(AssocEvent::PeerAssocRsp(bad_aid), &mut h.ctx);
        assert_matches!(state, State::WaitAssocRsp { .. });
        assert!(h.drain_queue().is_empty());

        // The timeout still applies.
        let state = state.on_event(AssocEvent::AssocTimeout, &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::REJECTED_TIMEOUT })]
        );
    }

    #[test]
    fn late_response_after_timeout_is_ignored() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);
        let state = state.on_event(AssocEvent::AssocTimeout, &mut h.ctx);
        assert_eq!(state, State::Idle);
        let state = state.on_event(AssocEvent::PeerAssocRsp(fake_assoc_rsp(bssid)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_eq!(h.ctx.aux.aid, 0);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::REJECTED_TIMEOUT })]
        );
    }

    #[test]
    fn reassoc_uses_current_ap() {
        let mut h = TestHelper::new();
        let current = connect(&mut h);
        h.device.take_frames();

        let target = fake_bss(b"foo", 2, -30);
        h.ctx.aux.adopt(&target);
        let state =
            State::Idle.on_event(AssocEvent::ReassocReq(assoc_req(target.bssid)), &mut h.ctx);
        assert_matches!(state, State::WaitReassocRsp { .. });
        assert_matches!(&h.device.take_frames()[..], [MgmtFrame::ReassocReq { current_ap, req }] => {
            assert_eq!(*current_ap, current);
            assert_eq!(req.bssid, target.bssid);
        });

        // An association response does not answer a reassociation request.
        let state =
            state.on_event(AssocEvent::PeerAssocRsp(fake_assoc_rsp(target.bssid)), &mut h.ctx);
        assert_matches!(state, State::WaitReassocRsp { .. });

        let state = state.on_event(AssocEvent::ReassocTimeout, &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::ReassocConf { status: StatusCode::REJECTED_TIMEOUT })]
        );
    }

    #[test]
    fn assoc_request_carries_security_ies() {
        let mut h = TestHelper::new();
        h.ctx.config.auth_mode = AuthMode::Wpa2;
        h.ctx.config.cipher = Cipher::Ccmp;
        h.ctx.config.wmm_capable = true;
        let bss = fake_rsn_bss(b"foo", 1, -40, Cipher::Ccmp, Cipher::Ccmp);
        let edca = EdcaParams { qos_info: 0x12, ..EdcaParams::default() };
        let bss = BssEntry { edca: Some(edca), ..bss };
        h.ctx.aux.adopt(&bss);
        h.ctx.aux.cipher = Some(negotiate_cipher(AuthMode::Wpa2, Cipher::Ccmp, &bss));
        h.ctx.pmkid_cache.insert(bss.bssid, [0x42; 16]);

        State::Idle.on_event(AssocEvent::AssocReq(assoc_req(bss.bssid)), &mut h.ctx);

        assert_matches!(&h.device.take_frames()[..], [MgmtFrame::AssocReq(frame)] => {
            let ies = &frame.ies[..];
            assert_eq!(&ies[..9], &[0xdd, 0x07, 0x00, 0x50, 0xf2, 0x02, 0x00, 0x01, 0x02]);
            assert_eq!(ies[9], 0x30);
            assert_eq!(ies[10], 0x26);
            assert_eq!(&ies[ies.len() - 16..], &[0x42; 16]);
        });
    }

    #[test]
    fn assoc_blocked() {
        let mut h = TestHelper::new();
        h.ctx.op.block_assoc = true;
        let state = State::Idle.on_event(AssocEvent::AssocReq(assoc_req([1; 6])), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.device.take_frames().is_empty());
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::STATE_MACHINE_REJECT })]
        );
    }

    #[test]
    fn invalid_assoc_request() {
        let mut h = TestHelper::new();
        let state = State::Idle.on_event(AssocEvent::AssocReq(assoc_req(ZERO_ADDR)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.device.take_frames().is_empty());
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::INVALID_FORMAT })]
        );
    }

    #[test]
    fn assoc_out_of_buffers() {
        let mut h = TestHelper::new();
        let bssid = fake_bss(b"foo", 1, -40).bssid;
        h.device.fail_next_tx();
        let state = State::Idle.on_event(AssocEvent::AssocReq(assoc_req(bssid)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.scheduler.pending().is_empty());
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::AssocConf { status: StatusCode::FAIL_NO_RESOURCE })]
        );

        // The failure was used up by the first request; the next one goes out.
        let state = State::Idle.on_event(AssocEvent::AssocReq(assoc_req(bssid)), &mut h.ctx);
        assert_matches!(state, State::WaitAssocRsp { .. });
        assert_eq!(h.device.take_frames().len(), 1);
    }

    #[test]
    fn reassoc_out_of_buffers() {
        let mut h = TestHelper::new();
        h.device.fail_next_tx();
        let bssid = fake_bss(b"foo", 2, -40).bssid;
        let state = State::Idle.on_event(AssocEvent::ReassocReq(assoc_req(bssid)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.scheduler.pending().is_empty());
        assert!(h.device.take_frames().is_empty());
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::ReassocConf { status: StatusCode::FAIL_NO_RESOURCE })]
        );
    }

    #[test]
    fn request_while_waiting_resets() {
        let mut h = TestHelper::new();
        let (state, bssid) = start_assoc(&mut h);
        let state = state.on_event(
            AssocEvent::DisassocReq(DisassocRequest { addr: bssid, reason: ReasonCode::UNSPECIFIED }),
            &mut h.ctx,
        );
        assert_eq!(state, State::Idle);
        assert!(h.scheduler.pending().is_empty());
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::DisassocConf { status: StatusCode::STATE_MACHINE_REJECT })]
        );
    }

    #[test]
    fn disassoc_waits_for_tx() {
        let mut h = TestHelper::new();
        let bssid = connect(&mut h);
        h.device.take_frames();

        let req = DisassocRequest { addr: bssid, reason: ReasonCode::DISASSOC_STA_LEAVING };
        let state = State::Idle.on_event(AssocEvent::DisassocReq(req), &mut h.ctx);
        assert_matches!(state, State::WaitDisassocRsp { .. });
        assert_eq!(
            h.device.take_frames(),
            vec![MgmtFrame::Disassoc {
                peer: bssid,
                bssid,
                reason: ReasonCode::DISASSOC_STA_LEAVING
            }]
        );
        assert_eq!(h.scheduler.pending()[0].1, h.ctx.config.disassoc_timeout);
        assert!(h.drain_queue().is_empty());

        let state = state.on_event(AssocEvent::DisassocTimeout, &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_matches!(
            h.drain_queue()[..],
            [MlmeMsg::Cntl(CntlEvent::DisassocConf { status: StatusCode::SUCCESS })]
        );
    }

    #[test]
    fn peer_deauth_while_disassociating() {
        let mut h = TestHelper::new();
        let bssid = connect(&mut h);
        let req = DisassocRequest { addr: bssid, reason: ReasonCode::DISASSOC_STA_LEAVING };
        let state = State::Idle.on_event(AssocEvent::DisassocReq(req), &mut h.ctx);

        let state = state.on_event(
            AssocEvent::PeerDeauth { addr: bssid, reason: ReasonCode::DEAUTH_STA_LEAVING },
            &mut h.ctx,
        );
        assert_eq!(state, State::Idle);
        assert!(!h.ctx.active.is_connected());
        assert_matches!(
            h.drain_queue()[..],
            [
                MlmeMsg::Cntl(CntlEvent::DisassocConf { status: StatusCode::SUCCESS }),
                MlmeMsg::Cntl(CntlEvent::PeerLinkLost),
            ]
        );
    }

    #[test]
    fn peer_deauth_mid_reassoc() {
        let mut h = TestHelper::new();
        let current = connect(&mut h);

        let target = fake_bss(b"foo", 2, -30);
        h.ctx.aux.adopt(&target);
        let state =
            State::Idle.on_event(AssocEvent::ReassocReq(assoc_req(target.bssid)), &mut h.ctx);
        assert_matches!(state, State::WaitReassocRsp { .. });

        let state = state.on_event(
            AssocEvent::PeerDeauth { addr: current, reason: ReasonCode::UNSPECIFIED },
            &mut h.ctx,
        );
        assert_eq!(state, State::Idle);
        assert!(h.scheduler.pending().iter().all(|(_, d)| *d != TIMEOUT));
        assert_eq!(
            h.drain_info_events().last(),
            Some(&InfoEvent::LinkDown { locally_requested: false })
        );
        assert_matches!(h.drain_queue()[..], [MlmeMsg::Cntl(CntlEvent::PeerLinkLost)]);

        // A late response finds the machine idle.
        let state = state
            .on_event(AssocEvent::PeerReassocRsp(fake_assoc_rsp(target.bssid)), &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert!(h.drain_queue().is_empty());
    }

    #[test]
    fn disassoc_from_other_peer_ignored() {
        let mut h = TestHelper::new();
        connect(&mut h);
        let state = State::Idle.on_event(
            AssocEvent::PeerDisassoc { addr: [9; 6], reason: ReasonCode::UNSPECIFIED },
            &mut h.ctx,
        );
        assert_eq!(state, State::Idle);
        assert!(h.ctx.active.is_connected());
        assert!(h.drain_queue().is_empty());
    }

    #[test]
    fn class3_error_sends_disassoc() {
        let mut h = TestHelper::new();
        let bssid = connect(&mut h);
        h.device.take_frames();
        let state = State::Idle.on_event(AssocEvent::Cls3Err { addr: [3; 6] }, &mut h.ctx);
        assert_eq!(state, State::Idle);
        assert_eq!(
            h.device.take_frames(),
            vec![MgmtFrame::Disassoc {
                peer: [3; 6],
                bssid,
                reason: ReasonCode::CLASS3_FRAME_FROM_NONASSOC_STA
            }]
        );
        assert!(h.ctx.active.is_connected());
    }
}
