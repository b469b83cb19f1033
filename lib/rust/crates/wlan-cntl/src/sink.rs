// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {futures::channel::mpsc, log::warn};

#[derive(Debug)]
pub struct UnboundedSink<T> {
    sink: mpsc::UnboundedSender<T>,
}

impl<T> UnboundedSink<T> {
    pub fn new(sink: mpsc::UnboundedSender<T>) -> Self {
        UnboundedSink { sink }
    }

    pub fn send(&self, msg: T) {
        if let Err(e) = self.sink.unbounded_send(msg) {
            if e.is_disconnected() {
                warn!("dropping message, receiver is gone");
            }
        }
    }
}

pub type MlmeSink = UnboundedSink<crate::MlmeRequest>;
pub type InfoSink = UnboundedSink<crate::InfoEvent>;
