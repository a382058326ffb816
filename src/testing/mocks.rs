//! Mock implementations for testing
//!
//! Provides fake NetworkInterface, OutputDevice, BusSession and
//! TransportStack implementations. Each records what was asked of it so
//! tests can assert on the calls afterwards.

use crate::device::{DeviceError, OutputDevice};
use crate::net::{AddressFamily, NetworkInterface, ProvisionError};
use crate::transport::{BusSession, InboundMessage, NatsError, TransportStack};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted network interface
#[derive(Debug)]
pub struct FakeInterface {
    name: String,
    /// Dynamic address, offered on poll N and owned from poll M
    dynamic: Option<(IpAddr, u32, u32)>,
    offer_polls: AtomicU32,
    assign_polls: AtomicU32,
    dynamic_requests: AtomicU32,
    static_assignments: Mutex<Vec<IpAddr>>,
}

impl FakeInterface {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dynamic: None,
            offer_polls: AtomicU32::new(0),
            assign_polls: AtomicU32::new(0),
            dynamic_requests: AtomicU32::new(0),
            static_assignments: Mutex::new(Vec::new()),
        }
    }

    /// Offer `addr` from the `offer_after`-th poll and report it owned from
    /// the `assign_after`-th ownership check. `u32::MAX` means never.
    pub fn with_dynamic_address(mut self, addr: IpAddr, offer_after: u32, assign_after: u32) -> Self {
        self.dynamic = Some((addr, offer_after, assign_after));
        self
    }

    pub fn static_assignments(&self) -> Vec<IpAddr> {
        lock(&self.static_assignments).clone()
    }

    pub fn dynamic_requests(&self) -> u32 {
        self.dynamic_requests.load(Ordering::SeqCst)
    }
}

impl NetworkInterface for FakeInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn assign_static(&self, addr: IpAddr) -> Result<(), ProvisionError> {
        lock(&self.static_assignments).push(addr);
        Ok(())
    }

    fn request_dynamic_address(&self, _family: AddressFamily) -> Result<(), ProvisionError> {
        self.dynamic_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn requested_address(&self, _family: AddressFamily) -> Option<IpAddr> {
        let polls = self.offer_polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.dynamic {
            Some((addr, offer_after, _)) if polls >= offer_after => Some(addr),
            _ => None,
        }
    }

    fn owns_address(&self, addr: IpAddr) -> bool {
        if self.static_assignments().contains(&addr) {
            return true;
        }

        let polls = self.assign_polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.dynamic {
            Some((dynamic, _, assign_after)) => dynamic == addr && polls >= assign_after,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    on: bool,
    writes: Vec<bool>,
    fail_reads: bool,
}

/// Output device whose clones share one state
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(on: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                on,
                ..Default::default()
            })),
        }
    }

    pub fn failing_reads(self) -> Self {
        lock(&self.state).fail_reads = true;
        self
    }

    pub fn state(&self) -> bool {
        lock(&self.state).on
    }

    pub fn writes(&self) -> Vec<bool> {
        lock(&self.state).writes.clone()
    }
}

impl OutputDevice for FakeDevice {
    fn name(&self) -> &str {
        "fake-led"
    }

    fn read(&self) -> Result<bool, DeviceError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(DeviceError::Io("read failed".to_string()));
        }
        Ok(state.on)
    }

    fn write(&mut self, on: bool) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.on = on;
        state.writes.push(on);
        Ok(())
    }
}

pub type PublishedMessage = (String, Option<String>, Vec<u8>);

/// Bus session that records publishes and replays a queued inbox
#[derive(Debug, Default)]
pub struct RecordingBus {
    published: Vec<PublishedMessage>,
    subscriptions: Vec<(String, Option<String>, String)>,
    inbox: VecDeque<InboundMessage>,
    fail_publish: bool,
    fail_subscribe: bool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Queue a message for `next_message`
    pub fn deliver(&mut self, message: InboundMessage) {
        self.inbox.push_back(message);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, Option<String>, String)> {
        self.subscriptions.clone()
    }
}

#[async_trait]
impl BusSession for RecordingBus {
    async fn subscribe(
        &mut self,
        subject: &str,
        queue_group: Option<&str>,
        sid: &str,
    ) -> Result<(), NatsError> {
        if self.fail_subscribe {
            return Err(NatsError::Server("Permissions Violation".to_string()));
        }
        self.subscriptions.push((
            subject.to_string(),
            queue_group.map(str::to_string),
            sid.to_string(),
        ));
        Ok(())
    }

    async fn publish(
        &mut self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<(), NatsError> {
        if self.fail_publish {
            return Err(NatsError::Closed);
        }
        self.published.push((
            subject.to_string(),
            reply_to.map(str::to_string),
            payload.to_vec(),
        ));
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, NatsError> {
        Ok(self.inbox.pop_front())
    }
}

/// Counters shared between a [`FakeStack`] and the test holding it
#[derive(Debug, Default)]
pub struct StackProbe {
    acquired: AtomicUsize,
    bound: AtomicUsize,
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl StackProbe {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn bound(&self) -> usize {
        self.bound.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Context handed out by [`FakeStack`]; counts as released when dropped
#[derive(Debug)]
pub struct FakeContext {
    probe: Arc<StackProbe>,
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Client half of an in-memory connection, holding its context
#[derive(Debug)]
pub struct FakeStream {
    io: DuplexStream,
    _context: FakeContext,
}

impl AsyncRead for FakeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

/// Transport stack that connects to in-memory servers.
///
/// Every successful `open` sends the server half of a duplex stream to the
/// receiver returned by [`FakeStack::new`].
#[derive(Debug)]
pub struct FakeStack {
    probe: Arc<StackProbe>,
    servers: mpsc::UnboundedSender<DuplexStream>,
    fail_acquire: bool,
    fail_bind: bool,
    fail_open: bool,
}

impl FakeStack {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let stack = Self {
            probe: Arc::new(StackProbe::default()),
            servers,
            fail_acquire: false,
            fail_bind: false,
            fail_open: false,
        };
        (stack, accepted)
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn probe(&self) -> Arc<StackProbe> {
        self.probe.clone()
    }
}

#[async_trait]
impl TransportStack for FakeStack {
    type Context = FakeContext;
    type Stream = FakeStream;

    fn acquire(&self, _family: AddressFamily) -> io::Result<FakeContext> {
        if self.fail_acquire {
            return Err(io::Error::new(io::ErrorKind::Other, "socket table full"));
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            probe: self.probe.clone(),
        })
    }

    fn bind(&self, _context: &FakeContext, _local: SocketAddr) -> io::Result<()> {
        if self.fail_bind {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "address not available",
            ));
        }
        self.probe.bound.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open(&self, context: FakeContext, _remote: SocketAddr) -> io::Result<FakeStream> {
        if self.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }

        let (client, server) = duplex(64 * 1024);
        self.servers
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no server listening"))?;
        self.probe.opened.fetch_add(1, Ordering::SeqCst);

        Ok(FakeStream {
            io: client,
            _context: context,
        })
    }
}
