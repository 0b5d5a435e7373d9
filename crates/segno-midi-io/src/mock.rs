//! In-memory fakes for the native seams.
//!
//! [`MockService`] and [`MockRawMidi`] stand in for the service-oriented
//! and raw-device native layers: scriptable topology, live-object
//! accounting, release-order recording, packet capture and per-stage
//! failure injection. They back the crate's own tests and give downstream
//! runtimes a hardware-free backend.

use crate::blocking::RawMidiApi;
use crate::service::{
    ConnectionContext, DeliveryCallback, MidiService, ObjectKind, ObjectRef, PacketList,
};
use crate::transport::Direction;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Status the mocks return for references that are not (or no longer) live.
pub const MOCK_BAD_REF: i32 = -50;
/// Status a scripted read returns once its script is exhausted.
pub const MOCK_EXHAUSTED: i32 = -5;

// ---------------------------------------------------------------------------
// Service-oriented fake
// ---------------------------------------------------------------------------

/// Endpoint references created by [`MockService::add_entity`].
///
/// Endpoint unique IDs equal their object reference cast to `i32`.
#[derive(Debug, Clone)]
pub struct MockEntity {
    pub entity: ObjectRef,
    pub sources: Vec<ObjectRef>,
    pub destinations: Vec<ObjectRef>,
}

#[derive(Default)]
struct ServiceState {
    devices: Vec<ObjectRef>,
    names: HashMap<ObjectRef, String>,
    entities: HashMap<ObjectRef, Vec<ObjectRef>>,
    sources: HashMap<ObjectRef, Vec<ObjectRef>>,
    destinations: HashMap<ObjectRef, Vec<ObjectRef>>,
    unique_ids: HashMap<i32, (ObjectRef, ObjectKind)>,
    next_ref: ObjectRef,
    live: HashMap<ObjectRef, &'static str>,
    released: Vec<String>,
    callbacks: HashMap<ObjectRef, DeliveryCallback>,
    connections: HashMap<ObjectRef, (ObjectRef, ConnectionContext)>,
    sent: Vec<PacketList>,
    fail_next: HashMap<&'static str, i32>,
    max_list_bytes: usize,
}

/// Scriptable fake of the service-oriented native layer.
pub struct MockService {
    state: Mutex<ServiceState>,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                next_ref: 1,
                max_list_bytes: 65_536,
                ..ServiceState::default()
            }),
        }
    }

    pub fn add_device(&self, name: &str) -> ObjectRef {
        let mut state = self.state.lock();
        let device = state.alloc(ObjectKind::Device);
        state.devices.push(device);
        state.names.insert(device, name.to_string());
        device
    }

    /// Adds an entity with the given endpoint counts under `device`.
    pub fn add_entity(
        &self,
        device: ObjectRef,
        n_sources: usize,
        n_destinations: usize,
    ) -> MockEntity {
        let mut state = self.state.lock();
        let entity = state.alloc(ObjectKind::Entity);
        state.entities.entry(device).or_default().push(entity);

        let mut sources = Vec::new();
        for i in 0..n_sources {
            let endpoint = state.alloc(ObjectKind::Source);
            state.names.insert(endpoint, format!("source {i}"));
            sources.push(endpoint);
        }
        let mut destinations = Vec::new();
        for i in 0..n_destinations {
            let endpoint = state.alloc(ObjectKind::Destination);
            state.names.insert(endpoint, format!("destination {i}"));
            destinations.push(endpoint);
        }
        state.sources.insert(entity, sources.clone());
        state.destinations.insert(entity, destinations.clone());
        MockEntity {
            entity,
            sources,
            destinations,
        }
    }

    /// Makes the next call of the named stage fail with `status`.
    ///
    /// Stages: `create client`, `create input port`, `create output port`,
    /// `connect source`, `disconnect source`, `send`, `dispose port`,
    /// `dispose client`, `query name`.
    pub fn fail_next(&self, stage: &'static str, status: i32) {
        self.state.lock().fail_next.insert(stage, status);
    }

    /// Clients and ports currently registered.
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Labels of released resources, in release order.
    pub fn released(&self) -> Vec<String> {
        self.state.lock().released.clone()
    }

    /// Packet lists accepted by `send`, in submit order.
    pub fn sent(&self) -> Vec<PacketList> {
        self.state.lock().sent.clone()
    }

    pub fn set_max_packet_list_bytes(&self, limit: usize) {
        self.state.lock().max_list_bytes = limit;
    }

    /// Plays the native service thread: pushes one packet list through the
    /// connection registered for `source`. Returns false if nothing is
    /// connected there.
    pub fn deliver(&self, source: ObjectRef, packets: PacketList) -> bool {
        let (callback, context) = {
            let state = self.state.lock();
            let Some((port, context)) = state.connections.get(&source) else {
                return false;
            };
            let Some(callback) = state.callbacks.get(port) else {
                return false;
            };
            (callback.clone(), context.clone())
        };
        // Lock dropped: the callback may re-enter the mock.
        callback(&packets, &context);
        true
    }
}

impl ServiceState {
    fn alloc(&mut self, kind: ObjectKind) -> ObjectRef {
        let object = self.next_ref;
        self.next_ref += 1;
        self.unique_ids.insert(object as i32, (object, kind));
        object
    }

    fn take_failure(&mut self, stage: &'static str) -> Option<i32> {
        self.fail_next.remove(stage)
    }
}

impl MidiService for MockService {
    fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    fn device_at(&self, index: usize) -> Option<ObjectRef> {
        self.state.lock().devices.get(index).copied()
    }

    fn display_name(&self, object: ObjectRef) -> Result<String, i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("query name") {
            return Err(status);
        }
        state.names.get(&object).cloned().ok_or(MOCK_BAD_REF)
    }

    fn entities(&self, device: ObjectRef) -> Vec<ObjectRef> {
        self.state
            .lock()
            .entities
            .get(&device)
            .cloned()
            .unwrap_or_default()
    }

    fn sources(&self, entity: ObjectRef) -> Vec<ObjectRef> {
        self.state
            .lock()
            .sources
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    fn destinations(&self, entity: ObjectRef) -> Vec<ObjectRef> {
        self.state
            .lock()
            .destinations
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    fn find_by_unique_id(&self, unique_id: i32) -> Option<(ObjectRef, ObjectKind)> {
        self.state.lock().unique_ids.get(&unique_id).copied()
    }

    fn create_client(&self, _name: &str) -> Result<ObjectRef, i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("create client") {
            return Err(status);
        }
        let client = state.alloc(ObjectKind::Other);
        state.live.insert(client, "client");
        Ok(client)
    }

    fn create_input_port(
        &self,
        client: ObjectRef,
        _name: &str,
        callback: DeliveryCallback,
    ) -> Result<ObjectRef, i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("create input port") {
            return Err(status);
        }
        if state.live.get(&client) != Some(&"client") {
            return Err(MOCK_BAD_REF);
        }
        let port = state.alloc(ObjectKind::Other);
        state.live.insert(port, "input port");
        state.callbacks.insert(port, callback);
        Ok(port)
    }

    fn create_output_port(&self, client: ObjectRef, _name: &str) -> Result<ObjectRef, i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("create output port") {
            return Err(status);
        }
        if state.live.get(&client) != Some(&"client") {
            return Err(MOCK_BAD_REF);
        }
        let port = state.alloc(ObjectKind::Other);
        state.live.insert(port, "output port");
        Ok(port)
    }

    fn connect_source(
        &self,
        port: ObjectRef,
        source: ObjectRef,
        context: ConnectionContext,
    ) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("connect source") {
            return Err(status);
        }
        if state.live.get(&port) != Some(&"input port") {
            return Err(MOCK_BAD_REF);
        }
        state.connections.insert(source, (port, context));
        Ok(())
    }

    fn disconnect_source(&self, _port: ObjectRef, source: ObjectRef) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("disconnect source") {
            return Err(status);
        }
        if state.connections.remove(&source).is_none() {
            return Err(MOCK_BAD_REF);
        }
        state.released.push("source connection".to_string());
        Ok(())
    }

    fn send(
        &self,
        _port: ObjectRef,
        _destination: ObjectRef,
        packets: &PacketList,
    ) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("send") {
            return Err(status);
        }
        state.sent.push(packets.clone());
        Ok(())
    }

    fn dispose_port(&self, port: ObjectRef) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("dispose port") {
            return Err(status);
        }
        let Some(label) = state.live.remove(&port) else {
            return Err(MOCK_BAD_REF);
        };
        state.callbacks.remove(&port);
        state.released.push(label.to_string());
        Ok(())
    }

    fn dispose_client(&self, client: ObjectRef) -> Result<(), i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_failure("dispose client") {
            return Err(status);
        }
        if state.live.remove(&client).is_none() {
            return Err(MOCK_BAD_REF);
        }
        state.released.push("client".to_string());
        Ok(())
    }

    fn max_packet_list_bytes(&self) -> usize {
        self.state.lock().max_list_bytes
    }
}

// ---------------------------------------------------------------------------
// Raw-device fake
// ---------------------------------------------------------------------------

enum ReadStep {
    Data(Vec<u8>),
    Fail(i32),
}

#[derive(Default)]
struct RawDeviceState {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    write_fail: Option<i32>,
}

#[derive(Default)]
struct RawState {
    devices: HashMap<String, RawDeviceState>,
    open_streams: usize,
    fail_open: HashMap<(String, Direction), i32>,
    close_failures: VecDeque<i32>,
}

/// Scriptable fake of the raw-device native layer.
pub struct MockRawMidi {
    state: Mutex<RawState>,
}

/// A stream handed out by [`MockRawMidi`]; all state lives in the fake.
pub struct MockStream {
    path: String,
}

impl Default for MockRawMidi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRawMidi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RawState::default()),
        }
    }

    pub fn add_device(&self, path: &str) {
        self.state
            .lock()
            .devices
            .insert(path.to_string(), RawDeviceState::default());
    }

    /// Appends one native read's worth of bytes to the script. Small
    /// segments script short reads.
    pub fn push_read(&self, path: &str, bytes: &[u8]) {
        if let Some(device) = self.state.lock().devices.get_mut(path) {
            device.reads.push_back(ReadStep::Data(bytes.to_vec()));
        }
    }

    pub fn push_read_error(&self, path: &str, status: i32) {
        if let Some(device) = self.state.lock().devices.get_mut(path) {
            device.reads.push_back(ReadStep::Fail(status));
        }
    }

    /// Everything written to the device so far.
    pub fn written(&self, path: &str) -> Vec<u8> {
        self.state
            .lock()
            .devices
            .get(path)
            .map(|d| d.written.clone())
            .unwrap_or_default()
    }

    /// Streams currently open across all devices.
    pub fn open_streams(&self) -> usize {
        self.state.lock().open_streams
    }

    pub fn fail_open(&self, path: &str, direction: Direction, status: i32) {
        self.state
            .lock()
            .fail_open
            .insert((path.to_string(), direction), status);
    }

    pub fn fail_write(&self, path: &str, status: i32) {
        if let Some(device) = self.state.lock().devices.get_mut(path) {
            device.write_fail = Some(status);
        }
    }

    /// Makes the next stream close report `status`. The stream is still
    /// accounted as released.
    pub fn fail_next_close(&self, status: i32) {
        self.state.lock().close_failures.push_back(status);
    }
}

impl RawMidiApi for MockRawMidi {
    type Stream = MockStream;

    fn open(&self, path: &str, direction: Direction) -> Result<MockStream, i32> {
        let mut state = self.state.lock();
        if let Some(status) = state.fail_open.remove(&(path.to_string(), direction)) {
            return Err(status);
        }
        if !state.devices.contains_key(path) {
            // No such device node.
            return Err(-2);
        }
        state.open_streams += 1;
        Ok(MockStream {
            path: path.to_string(),
        })
    }

    fn read(&self, stream: &mut MockStream, buf: &mut [u8]) -> Result<usize, i32> {
        let mut state = self.state.lock();
        let device = state.devices.get_mut(&stream.path).ok_or(MOCK_BAD_REF)?;
        match device.reads.pop_front() {
            None => Err(MOCK_EXHAUSTED),
            Some(ReadStep::Fail(status)) => Err(status),
            Some(ReadStep::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    device.reads.push_front(ReadStep::Data(bytes[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }

    fn write(&self, stream: &mut MockStream, buf: &[u8]) -> Result<usize, i32> {
        let mut state = self.state.lock();
        let device = state.devices.get_mut(&stream.path).ok_or(MOCK_BAD_REF)?;
        if let Some(status) = device.write_fail.take() {
            return Err(status);
        }
        device.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&self, stream: MockStream) -> Result<(), i32> {
        let mut state = self.state.lock();
        state.open_streams = state.open_streams.saturating_sub(1);
        drop(stream);
        match state.close_failures.pop_front() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}
