//! In-memory fakes for the device traits, used by unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http::StatusCode;

use crate::bootstrap::WifiRadio;
use crate::context::System;
use crate::control::NetworkStatus;
use crate::credential::{CredentialStore, NetworkCredential, StoreError, StoredRecord};
use crate::server::Exchange;
use crate::stream::FrameSource;

#[derive(Debug, Default)]
struct StoreState {
    record: Option<String>,
    saves: usize,
}

/// Credential store over a shared in-memory record. Clones see the same record,
/// which stands in for flash surviving a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn with(credential: NetworkCredential) -> Self {
        let store = Self::default();
        store.state().record = StoredRecord::encode(&credential).ok();
        store
    }

    pub fn saves(&self) -> usize {
        self.state().saves
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Option<NetworkCredential> {
        let state = self.state();
        state.record.as_deref().and_then(StoredRecord::decode)
    }

    fn save(&mut self, credential: &NetworkCredential) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Write("flash is read-only".to_string()));
        }
        let raw = StoredRecord::encode(credential)?;
        let mut state = self.state();
        state.record = Some(raw);
        state.saves += 1;
        Ok(())
    }
}

/// Radio that reports joined on the n-th poll.
#[derive(Debug, Default)]
pub struct ScriptedRadio {
    join_after: Option<u32>,
    pub reject_join: bool,
    pub polls: u32,
    pub joined_with: Option<String>,
    pub ap_started: Option<String>,
}

impl ScriptedRadio {
    pub fn joins_after(polls: u32) -> Self {
        Self {
            join_after: Some(polls),
            ..Default::default()
        }
    }

    pub fn never_joins() -> Self {
        Self::default()
    }
}

impl WifiRadio for ScriptedRadio {
    fn begin_join(&mut self, credential: &NetworkCredential) -> anyhow::Result<()> {
        if self.reject_join {
            anyhow::bail!("driver refused configuration");
        }
        self.joined_with = Some(credential.name.clone());
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.polls += 1;
        self.join_after.is_some_and(|n| self.polls >= n)
    }

    fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<()> {
        self.ap_started = Some(ssid.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FrameCounters {
    checkouts: Cell<usize>,
    releases: Cell<usize>,
    max_outstanding: Cell<usize>,
}

impl FrameCounters {
    fn outstanding(&self) -> usize {
        self.checkouts.get() - self.releases.get()
    }
}

/// Frame handed out by `ScriptedFrames`; dropping it counts as a release.
pub struct MockFrame {
    data: Vec<u8>,
    counters: Rc<FrameCounters>,
}

impl AsRef<[u8]> for MockFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        self.counters.releases.set(self.counters.releases.get() + 1);
    }
}

/// Frame source replaying a script of captures (`None` = nothing ready).
#[derive(Clone)]
pub struct ScriptedFrames {
    script: Rc<RefCell<VecDeque<Option<Vec<u8>>>>>,
    repeat: Option<Vec<u8>>,
    counters: Rc<FrameCounters>,
}

impl ScriptedFrames {
    pub fn new(script: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            script: Rc::new(RefCell::new(script.into())),
            repeat: None,
            counters: Rc::default(),
        }
    }

    /// Always has this frame ready.
    pub fn repeating(frame: Vec<u8>) -> Self {
        Self {
            repeat: Some(frame),
            ..Self::new(Vec::new())
        }
    }

    pub fn checkouts(&self) -> usize {
        self.counters.checkouts.get()
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.get()
    }

    pub fn outstanding(&self) -> usize {
        self.counters.outstanding()
    }

    pub fn max_outstanding(&self) -> usize {
        self.counters.max_outstanding.get()
    }
}

impl FrameSource for ScriptedFrames {
    type Frame = MockFrame;

    fn capture(&self) -> Option<MockFrame> {
        let data = match &self.repeat {
            Some(frame) => frame.clone(),
            None => self.script.borrow_mut().pop_front().flatten()?,
        };
        let c = &self.counters;
        c.checkouts.set(c.checkouts.get() + 1);
        c.max_outstanding
            .set(c.max_outstanding.get().max(c.outstanding()));
        Some(MockFrame {
            data,
            counters: self.counters.clone(),
        })
    }
}

/// Writer that accepts `limit` bytes, then fails like a reset socket.
#[derive(Debug)]
pub struct FailingWriter {
    remaining: usize,
}

impl FailingWriter {
    pub fn after(limit: usize) -> Self {
        Self { remaining: limit }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        let n = buf.len().min(self.remaining);
        self.remaining -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a handler sent back through a `MockExchange`.
#[derive(Debug, Default)]
pub struct Captured {
    pub status: Option<StatusCode>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// In-memory request/response pair standing in for the HTTP server.
pub struct MockExchange {
    body: io::Cursor<Vec<u8>>,
    stalled: bool,
    write_limit: Option<usize>,
    captured: Rc<RefCell<Captured>>,
}

impl MockExchange {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: io::Cursor::new(body.into()),
            stalled: false,
            write_limit: None,
            captured: Rc::default(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Reads time out, like a client that sent headers and went quiet.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::empty()
        }
    }

    /// The response writer fails once `limit` body bytes went out.
    pub fn failing_after(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn captured(&self) -> Rc<RefCell<Captured>> {
        self.captured.clone()
    }
}

impl Exchange for MockExchange {
    type Writer = MockWriter;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stalled {
            return Err(io::ErrorKind::TimedOut.into());
        }
        self.body.read(buf)
    }

    fn respond(self, status: StatusCode, headers: &[(&str, &str)]) -> io::Result<MockWriter> {
        {
            let mut captured = self.captured.borrow_mut();
            captured.status = Some(status);
            captured.headers = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
        Ok(MockWriter {
            captured: self.captured,
            remaining: self.write_limit,
            failed: false,
        })
    }
}

pub struct MockWriter {
    captured: Rc<RefCell<Captured>>,
    remaining: Option<usize>,
    failed: bool,
}

impl MockWriter {
    /// Open until a write has failed.
    pub fn is_open(&self) -> bool {
        !self.failed
    }
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.remaining {
            Some(0) => {
                self.failed = true;
                return Err(io::ErrorKind::ConnectionReset.into());
            }
            Some(left) => buf.len().min(left),
            None => buf.len(),
        };
        if let Some(left) = &mut self.remaining {
            *left -= n;
        }
        self.captured.borrow_mut().body.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FixedNetwork {
    ip: Option<Ipv4Addr>,
    rssi: i32,
}

impl FixedNetwork {
    pub fn new(ip: Option<Ipv4Addr>, rssi: i32) -> Self {
        Self { ip, rssi }
    }
}

impl NetworkStatus for FixedNetwork {
    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    fn rssi(&self) -> i32 {
        self.rssi
    }
}

/// Counts restart requests instead of rebooting.
#[derive(Debug, Clone, Default)]
pub struct RecordingSystem {
    restarts: Arc<AtomicUsize>,
    last_delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingSystem {
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn last_delay(&self) -> Option<Duration> {
        *self.last_delay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl System for RecordingSystem {
    fn restart_after(&self, delay: Duration) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        *self.last_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }
}
