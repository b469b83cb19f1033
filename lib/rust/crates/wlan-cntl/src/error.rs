// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::mac::StatusCode, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("out of buffers; requested {0} bytes")]
    NoResources(usize),
    #[error("MLME queue is full")]
    QueueFull,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("error parsing configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device error: {0}")]
    Device(String),
}

impl From<&Error> for StatusCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::NoResources(_) => StatusCode::FAIL_NO_RESOURCE,
            Error::InvalidRequest(_) | Error::InvalidFrame(_) => StatusCode::INVALID_FORMAT,
            _ => StatusCode::UNSPECIFIED_FAILURE,
        }
    }
}
