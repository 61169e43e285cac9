// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Background maintenance thread.
//!
//! The caller and the worker take turns. Every `Start` or `Run` request is answered by exactly one
//! reply, and the worker only touches the tables between receiving a request and sending its
//! reply. `Shutdown` is answered by the thread exiting.

use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::heavyhitters::maintenance::Budget;
use crate::heavyhitters::maintenance::MaintenanceJob;
use crate::heavyhitters::partitions::Partitions;

const THREAD_NAME: &str = "dimsum-maintenance";

#[derive(Debug)]
enum Request {
    /// Begin a new generation with this many steps.
    Start(usize),
    /// Continue the current generation with this many steps.
    Run(usize),
    Shutdown,
}

#[derive(Debug)]
enum Reply {
    Paused,
    Done,
    Failed(Error),
}

/// State of the current generation after a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Progress {
    Paused,
    Done,
}

/// Handle to the maintenance thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub(super) struct Worker {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(job: MaintenanceJob, tables: Arc<Mutex<Partitions>>) -> Result<Self, Error> {
        let (requests, request_rx) = crossbeam_channel::bounded(1);
        let (reply_tx, replies) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || serve(job, tables, request_rx, reply_tx))
            .map_err(|err| {
                Error::maintenance_stopped("failed to spawn the maintenance thread")
                    .with_context("cause", err)
            })?;
        Ok(Self {
            requests,
            replies,
            handle: Some(handle),
        })
    }

    /// Starts a generation on freshly rotated tables and lets it take `steps` steps.
    pub fn start(&self, steps: usize) -> Result<Progress, Error> {
        self.request(Request::Start(steps))
    }

    /// Lets the pending generation take `steps` more steps.
    pub fn advance(&self, steps: usize) -> Result<Progress, Error> {
        self.request(Request::Run(steps))
    }

    /// Runs the pending generation to completion.
    pub fn finish(&self) -> Result<(), Error> {
        match self.request(Request::Run(usize::MAX))? {
            Progress::Done => Ok(()),
            Progress::Paused => Err(Error::maintenance_stopped(
                "maintenance paused with an unbounded budget",
            )),
        }
    }

    /// Stops the thread and waits for it to exit.
    pub fn shutdown(&mut self) {
        // the thread may already be gone after a failure
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn request(&self, request: Request) -> Result<Progress, Error> {
        self.requests
            .send(request)
            .map_err(|_| Error::maintenance_stopped("maintenance thread has exited"))?;
        match self.replies.recv() {
            Ok(Reply::Paused) => Ok(Progress::Paused),
            Ok(Reply::Done) => Ok(Progress::Done),
            Ok(Reply::Failed(err)) => Err(err),
            Err(_) => Err(Error::maintenance_stopped("maintenance thread has exited")),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hands control back to the caller whenever the granted steps run out.
struct Handoff<'a> {
    remaining: usize,
    requests: &'a Receiver<Request>,
    replies: &'a Sender<Reply>,
}

impl Budget for Handoff<'_> {
    fn step(&mut self) -> Result<(), Error> {
        while self.remaining == 0 {
            if self.replies.send(Reply::Paused).is_err() {
                return Err(Error::maintenance_stopped("sketch dropped"));
            }
            match self.requests.recv() {
                Ok(Request::Start(steps) | Request::Run(steps)) => self.remaining = steps,
                Ok(Request::Shutdown) | Err(_) => {
                    return Err(Error::maintenance_stopped("shutdown during maintenance"));
                }
            }
        }
        self.remaining -= 1;
        Ok(())
    }
}

fn serve(
    mut job: MaintenanceJob,
    tables: Arc<Mutex<Partitions>>,
    requests: Receiver<Request>,
    replies: Sender<Reply>,
) {
    debug!("maintenance worker started");
    while let Ok(request) = requests.recv() {
        let steps = match request {
            Request::Start(steps) => steps,
            // nothing pending
            Request::Run(_) => {
                if replies.send(Reply::Done).is_err() {
                    break;
                }
                continue;
            }
            Request::Shutdown => break,
        };

        let mut budget = Handoff {
            remaining: steps,
            requests: &requests,
            replies: &replies,
        };
        let reply = match job.run(&tables, &mut budget) {
            Ok(()) => Reply::Done,
            Err(err) if err.kind() == ErrorKind::MaintenanceStopped => break,
            Err(err) => {
                error!(error = %err, "maintenance failed, stopping worker");
                let _ = replies.send(Reply::Failed(err));
                break;
            }
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("maintenance worker stopped");
}
