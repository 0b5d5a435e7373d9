//! Callback-push backend adapter.
//!
//! Fronts service-oriented native APIs: open acquires a client, an input
//! port, an output port and a source connection; inbound frames arrive on a
//! native service thread through a process-wide callback and are routed to
//! the handle's registered sink via the opaque per-connection context.

use crate::error::{Error, Result};
use crate::release::{record_failure, ReleaseStack};
use crate::service::{
    ConnectionContext, MidiService, ObjectKind, ObjectRef, Packet, PacketList,
};
use crate::transport::{
    check_alignment, Direction, FrameSink, HandleId, PushDelivered, RawMidiTransport,
};
use parking_lot::RwLock;
use segno_midi::{Frame, FRAME_LEN};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const CLIENT_NAME: &str = "segno-midi";
const INPUT_PORT_NAME: &str = "segno-midi input";
const OUTPUT_PORT_NAME: &str = "segno-midi output";

/// How a device identifier string is interpreted by this backend.
///
/// The syntax is backend-local; the transport contract treats identifiers
/// as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Exact display-name match against the device tree.
    Name(String),
    /// Unique IDs of the source (input) and destination (output) endpoints.
    UniqueIds { input: i32, output: i32 },
}

impl DeviceSpec {
    /// `"in:out"` with two signed decimal integers selects unique-ID
    /// lookup; a lone integer is used for both directions; anything else
    /// is a display name.
    pub fn parse(identifier: &str) -> Self {
        if let Some((input, output)) = identifier.split_once(':') {
            if let (Ok(input), Ok(output)) = (input.trim().parse(), output.trim().parse()) {
                return DeviceSpec::UniqueIds { input, output };
            }
        } else if let Ok(id) = identifier.trim().parse() {
            return DeviceSpec::UniqueIds {
                input: id,
                output: id,
            };
        }
        DeviceSpec::Name(identifier.to_string())
    }
}

/// Per-connection state carried through the native context argument.
///
/// The native API supplies one process-wide callback; this is the value it
/// hands back per delivery, so simultaneous handles stay independent.
struct SinkSlot {
    id: HandleId,
    sink: RwLock<Option<FrameSink>>,
}

/// The process-wide delivery callback.
///
/// Forwards every packet in the delivered list, in arrival order, taking
/// the first frame's worth of bytes from each. Sub-frame packets are
/// skipped. Deliveries before a sink is registered are dropped.
fn deliver(packets: &PacketList, context: &ConnectionContext) {
    let Some(slot) = context.downcast_ref::<SinkSlot>() else {
        trace!("delivery with foreign connection context, ignoring");
        return;
    };
    let sink = slot.sink.read();
    let Some(sink) = sink.as_ref() else {
        trace!(id = %slot.id, "delivery before sink registration, dropping");
        return;
    };
    for packet in &packets.packets {
        match Frame::from_slice(&packet.data) {
            Some(frame) => sink(slot.id, frame),
            None => trace!(len = packet.data.len(), "skipping sub-frame packet"),
        }
    }
}

/// A duplex connection through the service-oriented backend.
///
/// Cancellation note: there is no pending read to unblock; closing stops
/// future deliveries by disconnecting the source. Callers must quiesce
/// in-progress deliveries before closing.
pub struct PushTransport<S: MidiService> {
    service: Arc<S>,
    id: HandleId,
    identifier: String,
    client: ObjectRef,
    input_port: ObjectRef,
    output_port: ObjectRef,
    source: ObjectRef,
    destination: ObjectRef,
    slot: Arc<SinkSlot>,
    open: bool,
}

impl<S: MidiService> PushTransport<S> {
    /// Resolves `identifier` (see [`DeviceSpec::parse`]) and acquires the
    /// native client, ports and source connection.
    ///
    /// Any failure after partial acquisition releases everything acquired
    /// so far, in reverse order, before the error is surfaced.
    pub fn open(service: Arc<S>, identifier: &str) -> Result<Self> {
        let spec = DeviceSpec::parse(identifier);
        let (source, destination) = resolve(&*service, &spec)?;

        let mut stack = ReleaseStack::new();

        let client = match service.create_client(CLIENT_NAME) {
            Ok(client) => client,
            Err(status) => {
                return Err(fail(
                    stack,
                    Error::Resource {
                        stage: "create client",
                        status,
                    },
                ))
            }
        };
        {
            let service = Arc::clone(&service);
            stack.push("dispose client", move || {
                service
                    .dispose_client(client)
                    .map_err(|status| Error::Resource {
                        stage: "dispose client",
                        status,
                    })
            });
        }

        let input_port = match service.create_input_port(client, INPUT_PORT_NAME, Arc::new(deliver))
        {
            Ok(port) => port,
            Err(status) => {
                return Err(fail(
                    stack,
                    Error::Resource {
                        stage: "create input port",
                        status,
                    },
                ))
            }
        };
        {
            let service = Arc::clone(&service);
            stack.push("dispose input port", move || {
                service
                    .dispose_port(input_port)
                    .map_err(|status| Error::Resource {
                        stage: "dispose input port",
                        status,
                    })
            });
        }

        let output_port = match service.create_output_port(client, OUTPUT_PORT_NAME) {
            Ok(port) => port,
            Err(status) => {
                return Err(fail(
                    stack,
                    Error::Resource {
                        stage: "create output port",
                        status,
                    },
                ))
            }
        };
        {
            let service = Arc::clone(&service);
            stack.push("dispose output port", move || {
                service
                    .dispose_port(output_port)
                    .map_err(|status| Error::Resource {
                        stage: "dispose output port",
                        status,
                    })
            });
        }

        let id = HandleId::next();
        let slot = Arc::new(SinkSlot {
            id,
            sink: RwLock::new(None),
        });

        let context: ConnectionContext = slot.clone();
        if let Err(status) = service.connect_source(input_port, source, context) {
            return Err(fail(
                stack,
                Error::Resource {
                    stage: "connect source",
                    status,
                },
            ));
        }

        stack.disarm();
        debug!(identifier, %id, "opened MIDI service transport");
        Ok(Self {
            service,
            id,
            identifier: identifier.to_string(),
            client,
            input_port,
            output_port,
            source,
            destination,
            slot,
            open: true,
        })
    }
}

impl<S: MidiService> RawMidiTransport for PushTransport<S> {
    fn id(&self) -> HandleId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::Closed);
        }
        if bytes.is_empty() {
            return Ok(0);
        }
        check_alignment(bytes)?;

        let packets = encode_packet_list(bytes);
        let required = packets.encoded_len();
        let limit = self.service.max_packet_list_bytes();
        if required > limit {
            return Err(Error::BufferEncoding { required, limit });
        }
        self.service
            .send(self.output_port, self.destination, &packets)
            .map_err(|status| Error::Send { status })?;
        Ok(bytes.len())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.open = false;

        // Every step is evaluated up front so all releases are attempted
        // regardless of earlier failures.
        let steps = [
            (
                "disconnect source",
                self.service
                    .disconnect_source(self.input_port, self.source),
            ),
            ("dispose input port", self.service.dispose_port(self.input_port)),
            (
                "dispose output port",
                self.service.dispose_port(self.output_port),
            ),
            ("dispose client", self.service.dispose_client(self.client)),
        ];
        let mut first: Option<Error> = None;
        for (stage, result) in steps {
            if let Err(status) = result {
                record_failure(&mut first, stage, Error::Resource { stage, status });
            }
        }
        debug!(identifier = %self.identifier, id = %self.id, "closed MIDI service transport");
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: MidiService> PushDelivered for PushTransport<S> {
    fn register_sink(&mut self, sink: FrameSink) {
        *self.slot.sink.write() = Some(sink);
    }
}

impl<S: MidiService> fmt::Debug for PushTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushTransport")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<S: MidiService> Drop for PushTransport<S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.close() {
                debug!(error = %err, "close failure while dropping transport");
            }
        }
    }
}

/// Runs the partial-open unwind, keeping `err` as the surfaced failure.
fn fail(stack: ReleaseStack, err: Error) -> Error {
    if let Err(release_err) = stack.unwind() {
        warn!(error = %release_err, "release failure while unwinding failed open");
    }
    err
}

fn resolve<S: MidiService>(service: &S, spec: &DeviceSpec) -> Result<(ObjectRef, ObjectRef)> {
    match spec {
        DeviceSpec::Name(name) => resolve_by_name(service, name),
        DeviceSpec::UniqueIds { input, output } => Ok((
            lookup_endpoint(service, *input, Direction::Input)?,
            lookup_endpoint(service, *output, Direction::Output)?,
        )),
    }
}

/// By-name scan: exact display-name match, then the first entity exposing
/// both a source and a destination supplies the endpoint pair.
fn resolve_by_name<S: MidiService>(service: &S, name: &str) -> Result<(ObjectRef, ObjectRef)> {
    for index in 0..service.device_count() {
        let Some(device) = service.device_at(index) else {
            continue;
        };
        let display = service
            .display_name(device)
            .map_err(|status| Error::Resource {
                stage: "query device name",
                status,
            })?;
        if display != name {
            continue;
        }
        for entity in service.entities(device) {
            let sources = service.sources(entity);
            let destinations = service.destinations(entity);
            if let (Some(&source), Some(&destination)) = (sources.first(), destinations.first()) {
                return Ok((source, destination));
            }
        }
        // Matching name but no duplex entity: keep scanning, another
        // device may carry the same display name.
    }
    Err(Error::DeviceNotFound(name.to_string()))
}

/// By-unique-ID lookup with a directionality check.
fn lookup_endpoint<S: MidiService>(
    service: &S,
    unique_id: i32,
    direction: Direction,
) -> Result<ObjectRef> {
    let (object, kind) = service
        .find_by_unique_id(unique_id)
        .ok_or_else(|| Error::DeviceNotFound(unique_id.to_string()))?;
    let expected = match direction {
        Direction::Input => ObjectKind::Source,
        Direction::Output => ObjectKind::Destination,
    };
    if kind != expected {
        return Err(Error::DeviceTypeMismatch {
            identifier: unique_id.to_string(),
            expected: direction,
        });
    }
    Ok(object)
}

/// One 3-byte packet per frame, sharing a single submit.
fn encode_packet_list(bytes: &[u8]) -> PacketList {
    PacketList::new(
        bytes
            .chunks_exact(FRAME_LEN)
            .map(Packet::new)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_parsing() {
        assert_eq!(
            DeviceSpec::parse("Launchpad Mini"),
            DeviceSpec::Name("Launchpad Mini".to_string())
        );
        assert_eq!(
            DeviceSpec::parse("123:456"),
            DeviceSpec::UniqueIds {
                input: 123,
                output: 456
            }
        );
        assert_eq!(
            DeviceSpec::parse("-5:17"),
            DeviceSpec::UniqueIds {
                input: -5,
                output: 17
            }
        );
        // A lone integer names one endpoint pair for both directions.
        assert_eq!(
            DeviceSpec::parse("123"),
            DeviceSpec::UniqueIds {
                input: 123,
                output: 123
            }
        );
        assert_eq!(
            DeviceSpec::parse("-7"),
            DeviceSpec::UniqueIds {
                input: -7,
                output: -7
            }
        );
        // Colon without two integers stays a name.
        assert_eq!(
            DeviceSpec::parse("hw:x"),
            DeviceSpec::Name("hw:x".to_string())
        );
    }

    #[test]
    fn test_encode_packet_list_splits_frames() {
        let list = encode_packet_list(&[0x90, 60, 100, 0x80, 60, 0]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.packets[0].data, vec![0x90, 60, 100]);
        assert_eq!(list.packets[1].data, vec![0x80, 60, 0]);
    }
}
