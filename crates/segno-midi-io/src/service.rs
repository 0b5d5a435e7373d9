//! Service-oriented native seam.
//!
//! Models native APIs in the shape of CoreMIDI: a flat namespace of object
//! references organised as device → entity → endpoint, client and port
//! objects acquired per connection, and inbound data pushed to a
//! process-wide callback carrying an opaque per-connection context. The
//! hardware implementation lives in [`crate::backend::coremidi`]; tests and
//! hardware-free runtimes use [`crate::mock::MockService`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Reference to a native object in the service namespace.
pub type ObjectRef = u32;

/// What a native object turned out to be when looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Device,
    Entity,
    Source,
    Destination,
    Other,
}

/// One native packet, as delivered to the callback or submitted for send.
///
/// The transport contract only ever puts [`segno_midi::FRAME_LEN`] bytes in
/// an outbound packet, but inbound packets are whatever the native layer
/// coalesced and may be longer or shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

/// Native list header bytes counted against the submit-size limit.
const LIST_HEADER_LEN: usize = 4;
/// Per-packet header bytes (timestamp + length) counted against the limit.
const PACKET_HEADER_LEN: usize = 10;

/// An ordered batch of packets sharing one delivery or submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketList {
    pub packets: Vec<Packet>,
}

impl PacketList {
    pub fn new(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Size of the list in the native encoding, header overhead included.
    pub fn encoded_len(&self) -> usize {
        LIST_HEADER_LEN
            + self
                .packets
                .iter()
                .map(|p| PACKET_HEADER_LEN + p.data.len())
                .sum::<usize>()
    }
}

/// Opaque per-connection value handed back with every delivery.
///
/// This is the binding point that lets one process-wide callback route to
/// per-handle state: the adapter stores its handle state here instead of in
/// module globals, preserving re-entrancy for simultaneous handles.
pub type ConnectionContext = Arc<dyn Any + Send + Sync>;

/// The process-wide delivery function registered with an input port.
pub type DeliveryCallback = Arc<dyn Fn(&PacketList, &ConnectionContext) + Send + Sync>;

/// The service-oriented native seam.
///
/// Status codes are the native layer's own, passed through unchanged.
/// Delivery callbacks are invoked from a native service thread outside
/// caller control.
pub trait MidiService: Send + Sync + 'static {
    fn device_count(&self) -> usize;

    fn device_at(&self, index: usize) -> Option<ObjectRef>;

    fn display_name(&self, object: ObjectRef) -> std::result::Result<String, i32>;

    fn entities(&self, device: ObjectRef) -> Vec<ObjectRef>;

    fn sources(&self, entity: ObjectRef) -> Vec<ObjectRef>;

    fn destinations(&self, entity: ObjectRef) -> Vec<ObjectRef>;

    /// Looks an object up in the flat unique-ID namespace.
    fn find_by_unique_id(&self, unique_id: i32) -> Option<(ObjectRef, ObjectKind)>;

    fn create_client(&self, name: &str) -> std::result::Result<ObjectRef, i32>;

    fn create_input_port(
        &self,
        client: ObjectRef,
        name: &str,
        callback: DeliveryCallback,
    ) -> std::result::Result<ObjectRef, i32>;

    fn create_output_port(
        &self,
        client: ObjectRef,
        name: &str,
    ) -> std::result::Result<ObjectRef, i32>;

    fn connect_source(
        &self,
        port: ObjectRef,
        source: ObjectRef,
        context: ConnectionContext,
    ) -> std::result::Result<(), i32>;

    fn disconnect_source(&self, port: ObjectRef, source: ObjectRef)
        -> std::result::Result<(), i32>;

    /// Submits a whole packet list; acceptance is atomic across the list.
    fn send(
        &self,
        port: ObjectRef,
        destination: ObjectRef,
        packets: &PacketList,
    ) -> std::result::Result<(), i32>;

    fn dispose_port(&self, port: ObjectRef) -> std::result::Result<(), i32>;

    fn dispose_client(&self, client: ObjectRef) -> std::result::Result<(), i32>;

    /// Largest encoded packet list the native submit path accepts.
    fn max_packet_list_bytes(&self) -> usize {
        65_536
    }
}

/// Descriptor for one enumerated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    /// Display names of source endpoints, across all entities.
    pub inputs: Vec<String>,
    /// Display names of destination endpoints, across all entities.
    pub outputs: Vec<String>,
}

/// Enumerates the device tree into serializable descriptors.
pub fn list_devices<S: MidiService>(service: &S) -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();
    for index in 0..service.device_count() {
        let Some(device) = service.device_at(index) else {
            continue;
        };
        let name = service
            .display_name(device)
            .map_err(|status| Error::Resource {
                stage: "query device name",
                status,
            })?;
        let mut info = DeviceInfo {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        for entity in service.entities(device) {
            for source in service.sources(entity) {
                info.inputs.push(endpoint_name(service, source));
            }
            for destination in service.destinations(entity) {
                info.outputs.push(endpoint_name(service, destination));
            }
        }
        devices.push(info);
    }
    Ok(devices)
}

fn endpoint_name<S: MidiService>(service: &S, endpoint: ObjectRef) -> String {
    service
        .display_name(endpoint)
        .unwrap_or_else(|_| format!("endpoint {endpoint}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockService;

    #[test]
    fn test_encoded_len_counts_headers() {
        let list = PacketList::new(vec![Packet::new([0x90, 60, 100]), Packet::new([0x80, 60, 0])]);
        assert_eq!(list.encoded_len(), 4 + 2 * (10 + 3));
    }

    #[test]
    fn test_list_devices_walks_the_tree() {
        let service = MockService::new();
        let device = service.add_device("Keystation");
        service.add_entity(device, 1, 1);
        let lonely = service.add_device("Display Only");
        service.add_entity(lonely, 0, 1);

        let devices = list_devices(&service).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Keystation");
        assert_eq!(devices[0].inputs.len(), 1);
        assert_eq!(devices[0].outputs.len(), 1);
        assert_eq!(devices[1].inputs.len(), 0);
        assert_eq!(devices[1].outputs.len(), 1);
    }
}
