// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Connection control for an 802.11 station.
//!
//! A [`client::Station`] owns two cooperating state machines: the connection controller,
//! which picks networks and drives join, authentication and association, and the
//! association machine, which runs the association frame exchange with one peer.
//! Everything outside this crate talks to the station through an [`queue::MlmeHandle`]
//! and listens on the [`MlmeStream`] and [`InfoStream`] it returns.

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod mac;
pub mod queue;
pub mod sink;
pub mod timer;

use {
    crate::{
        client::{ActiveRecord, BssEntry},
        config::BssType,
        mac::{MacAddr, Ssid, StatusCode},
    },
    futures::channel::mpsc,
    std::time::Duration,
};

pub use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanType {
    Active,
    Passive,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanRequest {
    /// Empty for a wildcard scan.
    pub ssid: Ssid,
    pub bss_type: BssType,
    pub scan_type: ScanType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinRequest {
    pub selected_bss: Box<BssEntry>,
    pub join_failure_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartRequest {
    pub ssid: Ssid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthAlgorithm {
    OpenSystem,
    SharedKey,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticateRequest {
    pub peer_sta_address: MacAddr,
    pub auth_type: AuthAlgorithm,
    pub auth_failure_timeout: Duration,
}

/// Requests for the synchronization and authentication machines, which live outside
/// this crate. Each is answered by a confirmation passed back through the `MlmeHandle`.
#[derive(Clone, Debug, PartialEq)]
pub enum MlmeRequest {
    Scan(ScanRequest),
    Join(JoinRequest),
    Start(StartRequest),
    Authenticate(AuthenticateRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectResult {
    Success,
    Canceled,
    Failed(StatusCode),
}

/// Notifications for the layers above the station.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoEvent {
    LinkUp(ActiveRecord),
    LinkDown { locally_requested: bool },
    MediaDisconnected,
    /// The BSS should not be tried again until it shows up in a new scan.
    CandidateUnusable { bssid: MacAddr, channel: u8 },
    /// Outcome of an attempt started by a user request.
    ConnectFinished { result: ConnectResult },
    ScanFinished,
}

pub type MlmeStream = mpsc::UnboundedReceiver<MlmeRequest>;
pub type InfoStream = mpsc::UnboundedReceiver<InfoEvent>;
