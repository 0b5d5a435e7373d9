//! Integration tests for segno-midi-io.
//!
//! Everything runs against the in-memory mock native layers, so the suite
//! exercises both adapters end to end without hardware MIDI devices.

use std::sync::{Arc, Mutex};

use segno_midi_io::mock::{MockEntity, MockRawMidi, MockService};
use segno_midi_io::{
    BlockingReadable, BlockingTransport, Error, Frame, HandleId, Packet, PacketList,
    PushDelivered, PushTransport, RawMidiTransport,
};

/// One device with a duplex entity, the common case.
fn duplex_service(name: &str) -> (Arc<MockService>, MockEntity) {
    let service = Arc::new(MockService::new());
    let device = service.add_device(name);
    let entity = service.add_entity(device, 1, 1);
    (service, entity)
}

fn collecting_sink(
    into: Arc<Mutex<Vec<(HandleId, Frame)>>>,
) -> Box<dyn Fn(HandleId, Frame) + Send + Sync> {
    Box::new(move |id, frame| into.lock().unwrap().push((id, frame)))
}

// ---------------------------------------------------------------------------
// 1. Open/close resource accounting
// ---------------------------------------------------------------------------

/// Open followed by close leaves zero native objects registered.
#[test]
fn test_open_close_leaves_no_native_resources() {
    let (service, _) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();
    assert!(service.live_objects() > 0);

    transport.close().unwrap();
    assert_eq!(service.live_objects(), 0);
}

/// An identifier that resolves nowhere acquires nothing.
#[test]
fn test_unknown_device_not_found_acquires_nothing() {
    let (service, _) = duplex_service("Keystation");
    let err = PushTransport::open(Arc::clone(&service), "Launchpad").unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(ref name) if name == "Launchpad"));
    assert_eq!(service.live_objects(), 0);
}

/// A name match without a duplex entity is still "not found".
#[test]
fn test_name_match_without_duplex_entity_is_not_found() {
    let service = Arc::new(MockService::new());
    let device = service.add_device("Display Only");
    service.add_entity(device, 0, 1);

    let err = PushTransport::open(Arc::clone(&service), "Display Only").unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(_)));
}

/// The by-name scan skips entities missing a direction and settles on the
/// first entity exposing both.
#[test]
fn test_name_scan_picks_first_duplex_entity() {
    let service = Arc::new(MockService::new());
    let device = service.add_device("Hybrid");
    service.add_entity(device, 1, 0); // input-only entity
    let duplex = service.add_entity(device, 1, 1);

    let mut transport = PushTransport::open(Arc::clone(&service), "Hybrid").unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    transport.register_sink(collecting_sink(Arc::clone(&frames)));

    // Delivery on the duplex entity's source reaches the sink, proving the
    // scan bound that endpoint pair.
    assert!(service.deliver(
        duplex.sources[0],
        PacketList::new(vec![Packet::new([0x90, 60, 100])]),
    ));
    assert_eq!(frames.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Unique-ID resolution
// ---------------------------------------------------------------------------

/// Unique-ID identifiers bind the named endpoints directly.
#[test]
fn test_open_by_unique_id_pair() {
    let (service, entity) = duplex_service("Keystation");
    let identifier = format!("{}:{}", entity.sources[0], entity.destinations[0]);

    let mut transport = PushTransport::open(Arc::clone(&service), &identifier).unwrap();
    transport.write(Frame::note_on(0, 60, 100).as_ref()).unwrap();
    assert_eq!(service.sent().len(), 1);
    transport.close().unwrap();
    assert_eq!(service.live_objects(), 0);
}

/// A unique ID that resolves to the wrong directionality is a type
/// mismatch, not "not found".
#[test]
fn test_wrong_directionality_is_type_mismatch() {
    let (service, entity) = duplex_service("Keystation");
    // Destination where a source is required.
    let identifier = format!("{}:{}", entity.destinations[0], entity.destinations[0]);

    let err = PushTransport::open(Arc::clone(&service), &identifier).unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceTypeMismatch {
            expected: segno_midi_io::Direction::Input,
            ..
        }
    ));
    assert_eq!(service.live_objects(), 0);
}

/// An unknown unique ID is "not found".
#[test]
fn test_unknown_unique_id_is_not_found() {
    let (service, entity) = duplex_service("Keystation");
    let identifier = format!("999999:{}", entity.destinations[0]);
    let err = PushTransport::open(Arc::clone(&service), &identifier).unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(ref id) if id == "999999"));
}

// ---------------------------------------------------------------------------
// 3. Partial-open unwind
// ---------------------------------------------------------------------------

/// A failure partway through open releases everything acquired so far, in
/// reverse acquisition order.
#[test]
fn test_partial_open_releases_in_reverse_order() {
    let (service, _) = duplex_service("Keystation");
    service.fail_next("create output port", -42);

    let err = PushTransport::open(Arc::clone(&service), "Keystation").unwrap_err();
    assert!(matches!(
        err,
        Error::Resource {
            stage: "create output port",
            status: -42
        }
    ));
    assert_eq!(service.live_objects(), 0, "failed open must not leak");
    assert_eq!(service.released(), vec!["input port", "client"]);
}

/// A connect failure releases both ports and the client.
#[test]
fn test_connect_failure_unwinds_fully() {
    let (service, _) = duplex_service("Keystation");
    service.fail_next("connect source", -42);

    let err = PushTransport::open(Arc::clone(&service), "Keystation").unwrap_err();
    assert!(matches!(
        err,
        Error::Resource {
            stage: "connect source",
            ..
        }
    ));
    assert_eq!(service.live_objects(), 0);
    assert_eq!(
        service.released(),
        vec!["output port", "input port", "client"]
    );
}

// ---------------------------------------------------------------------------
// 4. Write path
// ---------------------------------------------------------------------------

/// Buffers that are not a whole number of frames are rejected before the
/// native layer sees them.
#[test]
fn test_unaligned_write_rejected() {
    let (service, _) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    let err = transport.write(&[0x90, 60, 100, 0x80]).unwrap_err();
    assert!(matches!(err, Error::UnalignedWrite { len: 4 }));
    assert!(service.sent().is_empty(), "nothing may be submitted");
}

/// A batch whose encoding exceeds the native limit fails without sending.
#[test]
fn test_oversized_batch_is_buffer_encoding_error() {
    let (service, _) = duplex_service("Keystation");
    service.set_max_packet_list_bytes(20);
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    // Two frames encode to 4 + 2 * 13 = 30 bytes.
    let err = transport
        .write(&[0x90, 60, 100, 0x80, 60, 0])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::BufferEncoding {
            required: 30,
            limit: 20
        }
    ));
    assert!(service.sent().is_empty());
}

/// Native send rejection carries the native status through unchanged and
/// reports zero bytes written.
#[test]
fn test_send_rejection_passes_status_through() {
    let (service, _) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    service.fail_next("send", -10844);
    let err = transport.write(Frame::note_on(0, 60, 100).as_ref()).unwrap_err();
    assert!(matches!(err, Error::Send { status: -10844 }));

    // The handle survives a rejected send.
    transport.write(Frame::note_on(0, 62, 100).as_ref()).unwrap();
    assert_eq!(service.sent().len(), 1);
}

// ---------------------------------------------------------------------------
// 5. Push delivery
// ---------------------------------------------------------------------------

/// N packets in one native delivery produce N sink invocations in the
/// same order, not just the first packet.
#[test]
fn test_full_packet_list_is_delivered_in_order() {
    let (service, entity) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    transport.register_sink(collecting_sink(Arc::clone(&frames)));

    service.deliver(
        entity.sources[0],
        PacketList::new(vec![
            Packet::new([0x90, 60, 100]),
            Packet::new([0x90, 64, 100]),
            Packet::new([0x90, 67, 100]),
        ]),
    );

    let frames = frames.lock().unwrap();
    let notes: Vec<u8> = frames.iter().map(|(_, f)| f.data1()).collect();
    assert_eq!(notes, vec![60, 64, 67]);
    assert!(frames.iter().all(|(id, _)| *id == transport.id()));
}

/// Deliveries before a sink is registered are dropped, not queued.
#[test]
fn test_delivery_before_sink_registration_is_dropped() {
    let (service, entity) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    service.deliver(
        entity.sources[0],
        PacketList::new(vec![Packet::new([0x90, 60, 100])]),
    );

    let frames = Arc::new(Mutex::new(Vec::new()));
    transport.register_sink(collecting_sink(Arc::clone(&frames)));
    service.deliver(
        entity.sources[0],
        PacketList::new(vec![Packet::new([0x80, 60, 0])]),
    );

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].1, Frame::new(0x80, 60, 0));
}

/// Packets shorter than a frame are skipped; the rest still arrive.
#[test]
fn test_sub_frame_packets_are_skipped() {
    let (service, entity) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    transport.register_sink(collecting_sink(Arc::clone(&frames)));

    service.deliver(
        entity.sources[0],
        PacketList::new(vec![
            Packet::new([0xF8]),
            Packet::new([0x90, 60, 100]),
        ]),
    );

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].1, Frame::new(0x90, 60, 100));
}

/// Two simultaneous handles route deliveries independently through their
/// per-connection contexts, not shared module state.
#[test]
fn test_simultaneous_handles_route_independently() {
    let service = Arc::new(MockService::new());
    let device_a = service.add_device("Alpha");
    let entity_a = service.add_entity(device_a, 1, 1);
    let device_b = service.add_device("Beta");
    let entity_b = service.add_entity(device_b, 1, 1);

    let mut transport_a = PushTransport::open(Arc::clone(&service), "Alpha").unwrap();
    let mut transport_b = PushTransport::open(Arc::clone(&service), "Beta").unwrap();

    let frames_a = Arc::new(Mutex::new(Vec::new()));
    let frames_b = Arc::new(Mutex::new(Vec::new()));
    transport_a.register_sink(collecting_sink(Arc::clone(&frames_a)));
    transport_b.register_sink(collecting_sink(Arc::clone(&frames_b)));

    service.deliver(
        entity_a.sources[0],
        PacketList::new(vec![Packet::new([0x90, 60, 100])]),
    );
    service.deliver(
        entity_b.sources[0],
        PacketList::new(vec![Packet::new([0x90, 72, 100])]),
    );

    let frames_a = frames_a.lock().unwrap();
    let frames_b = frames_b.lock().unwrap();
    assert_eq!(frames_a.len(), 1);
    assert_eq!(frames_b.len(), 1);
    assert_eq!(frames_a[0].0, transport_a.id());
    assert_eq!(frames_a[0].1.data1(), 60);
    assert_eq!(frames_b[0].0, transport_b.id());
    assert_eq!(frames_b[0].1.data1(), 72);
}

// ---------------------------------------------------------------------------
// 6. Close discipline
// ---------------------------------------------------------------------------

/// Double close reports an error instead of touching released resources.
#[test]
fn test_double_close_reports_closed() {
    let (service, _) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    transport.close().unwrap();
    assert!(matches!(transport.close().unwrap_err(), Error::Closed));
    assert_eq!(service.live_objects(), 0);

    // A closed handle also rejects writes.
    let err = transport.write(Frame::note_on(0, 60, 100).as_ref()).unwrap_err();
    assert!(matches!(err, Error::Closed));
}

/// A failing release step does not stop the remaining steps; the first
/// failure is the one reported.
#[test]
fn test_close_attempts_every_release_step() {
    let (service, _) = duplex_service("Keystation");
    let mut transport = PushTransport::open(Arc::clone(&service), "Keystation").unwrap();

    service.fail_next("dispose port", -7);
    let err = transport.close().unwrap_err();
    assert!(matches!(
        err,
        Error::Resource {
            stage: "dispose input port",
            status: -7
        }
    ));
    // Later steps still ran.
    let released = service.released();
    assert!(released.contains(&"output port".to_string()));
    assert!(released.contains(&"client".to_string()));
}

// ---------------------------------------------------------------------------
// 7. End-to-end scenario
// ---------------------------------------------------------------------------

/// Open, write one note-on frame, observe exactly one accepted 3-byte
/// packet, close, and verify ports are released before the client.
#[test]
fn test_end_to_end_note_on_roundtrip() {
    let (service, _) = duplex_service("device-A");

    let mut transport = PushTransport::open(Arc::clone(&service), "device-A").unwrap();
    let frame = Frame::note_on(0, 60, 100);
    assert_eq!(transport.write(frame.as_ref()).unwrap(), 3);

    let sent = service.sent();
    assert_eq!(sent.len(), 1, "exactly one submit");
    assert_eq!(sent[0].len(), 1, "exactly one packet");
    assert_eq!(sent[0].packets[0].data, vec![0x90, 60, 100]);

    transport.close().unwrap();
    assert_eq!(service.live_objects(), 0);
    assert_eq!(
        service.released(),
        vec!["source connection", "input port", "output port", "client"]
    );
}

// ---------------------------------------------------------------------------
// 8. Blocking adapter end-to-end
// ---------------------------------------------------------------------------

/// The blocking adapter speaks the same contract: read a frame, answer
/// with a write, close cleanly.
#[test]
fn test_blocking_round_trip() {
    let api = Arc::new(MockRawMidi::new());
    api.add_device("hw:1,0");
    api.push_read("hw:1,0", &[0x90, 60, 100]);

    let mut transport = BlockingTransport::open(Arc::clone(&api), "hw:1,0").unwrap();
    let frame = transport.read_frame().unwrap();
    assert_eq!(frame, Frame::new(0x90, 60, 100));

    let reply = Frame::note_off(0, 60, 0);
    assert_eq!(transport.write(reply.as_ref()).unwrap(), 3);
    assert_eq!(api.written("hw:1,0"), reply.as_ref().to_vec());

    transport.close().unwrap();
    assert_eq!(api.open_streams(), 0);
}

/// Both adapters surface the same error for an unresolvable identifier.
#[test]
fn test_both_backends_agree_on_device_not_found() {
    let api = Arc::new(MockRawMidi::new());
    let blocking_err = BlockingTransport::open(api, "hw:9,9").unwrap_err();
    assert!(matches!(blocking_err, Error::DeviceNotFound(_)));

    let service = Arc::new(MockService::new());
    let push_err = PushTransport::open(service, "missing").unwrap_err();
    assert!(matches!(push_err, Error::DeviceNotFound(_)));
}
