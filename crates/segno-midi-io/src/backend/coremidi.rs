//! CoreMIDI binding for the service-oriented seam.
//!
//! Thin unsafe glue over `coremidi-sys`. The read proc is the one
//! process-wide callback CoreMIDI allows per input port; per-connection
//! state travels through `srcConnRefCon`, exactly as the seam models it.

use crate::service::{
    ConnectionContext, DeliveryCallback, MidiService, ObjectKind, ObjectRef, Packet, PacketList,
};
use core_foundation_sys::base::{CFRelease, OSStatus};
use core_foundation_sys::string::{
    kCFStringEncodingUTF8, CFStringCreateWithBytes, CFStringGetCString, CFStringGetLength,
    CFStringGetMaximumSizeForEncoding, CFStringRef,
};
use coremidi_sys::{
    kMIDIObjectType_Destination, kMIDIObjectType_Device, kMIDIObjectType_Entity,
    kMIDIObjectType_ExternalDestination, kMIDIObjectType_ExternalSource, kMIDIObjectType_Source,
    kMIDIPropertyName, MIDIClientCreate, MIDIClientDispose, MIDIDeviceGetEntity,
    MIDIDeviceGetNumberOfEntities, MIDIEntityGetDestination, MIDIEntityGetNumberOfDestinations,
    MIDIEntityGetNumberOfSources, MIDIEntityGetSource, MIDIGetDevice, MIDIGetNumberOfDevices,
    MIDIInputPortCreate, MIDIObjectFindByUniqueID, MIDIObjectGetStringProperty, MIDIObjectRef,
    MIDIObjectType, MIDIOutputPortCreate, MIDIPacket, MIDIPacketList, MIDIPacketListAdd,
    MIDIPacketListInit, MIDIPacketNext, MIDIPortConnectSource, MIDIPortDisconnectSource,
    MIDIPortDispose, MIDISend,
};
use libc::c_void;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr;

/// Status used when a CFString round-trip fails without an OSStatus.
const STRING_CONVERSION_FAILED: i32 = -10901;
/// Status used when the packet list buffer fills despite the size check.
const PACKET_LIST_FULL: i32 = -10902;

/// Per-input-port state handed to CoreMIDI as `readProcRefCon`.
struct PortContext {
    callback: DeliveryCallback,
}

/// The service-oriented seam over CoreMIDI.
///
/// Bookkeeping maps own the heap cells referenced by the raw refCon
/// pointers so dispose/disconnect can free them.
pub struct CoreMidiService {
    ports: Mutex<HashMap<ObjectRef, *mut PortContext>>,
    connections: Mutex<HashMap<ObjectRef, *mut ConnectionContext>>,
}

// The raw pointers are only dereferenced by the CoreMIDI service thread
// and freed under the mutexes.
unsafe impl Send for CoreMidiService {}
unsafe impl Sync for CoreMidiService {}

impl Default for CoreMidiService {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreMidiService {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }
}

extern "C" fn read_proc(
    pktlist: *const MIDIPacketList,
    read_proc_refcon: *mut c_void,
    src_conn_refcon: *mut c_void,
) {
    if pktlist.is_null() || read_proc_refcon.is_null() || src_conn_refcon.is_null() {
        return;
    }
    let port_ctx = unsafe { &*(read_proc_refcon as *const PortContext) };
    let context = unsafe { &*(src_conn_refcon as *const ConnectionContext) };

    // Walk the whole packet list, not just the first packet.
    let mut packets = Vec::new();
    unsafe {
        let list = &*pktlist;
        let mut pkt = list.packet.as_ptr();
        for _ in 0..list.numPackets {
            let packet = &*pkt;
            let len = (packet.length as usize).min(packet.data.len());
            packets.push(Packet::new(&packet.data[..len]));
            pkt = MIDIPacketNext(pkt);
        }
    }
    (port_ctx.callback)(&PacketList::new(packets), context);
}

impl MidiService for CoreMidiService {
    fn device_count(&self) -> usize {
        unsafe { MIDIGetNumberOfDevices() as usize }
    }

    fn device_at(&self, index: usize) -> Option<ObjectRef> {
        let device = unsafe { MIDIGetDevice(index as u64) };
        (device != 0).then_some(device)
    }

    fn display_name(&self, object: ObjectRef) -> Result<String, i32> {
        let mut name: CFStringRef = ptr::null();
        let rc =
            unsafe { MIDIObjectGetStringProperty(object, kMIDIPropertyName, &mut name as *mut _) };
        if rc != 0 {
            return Err(rc);
        }
        let result = cfstring_to_string(name).ok_or(STRING_CONVERSION_FAILED);
        unsafe { CFRelease(name as *const c_void) };
        result
    }

    fn entities(&self, device: ObjectRef) -> Vec<ObjectRef> {
        let count = unsafe { MIDIDeviceGetNumberOfEntities(device) };
        (0..count)
            .map(|i| unsafe { MIDIDeviceGetEntity(device, i) })
            .filter(|&entity| entity != 0)
            .collect()
    }

    fn sources(&self, entity: ObjectRef) -> Vec<ObjectRef> {
        let count = unsafe { MIDIEntityGetNumberOfSources(entity) };
        (0..count)
            .map(|i| unsafe { MIDIEntityGetSource(entity, i) })
            .filter(|&endpoint| endpoint != 0)
            .collect()
    }

    fn destinations(&self, entity: ObjectRef) -> Vec<ObjectRef> {
        let count = unsafe { MIDIEntityGetNumberOfDestinations(entity) };
        (0..count)
            .map(|i| unsafe { MIDIEntityGetDestination(entity, i) })
            .filter(|&endpoint| endpoint != 0)
            .collect()
    }

    fn find_by_unique_id(&self, unique_id: i32) -> Option<(ObjectRef, ObjectKind)> {
        let mut object: MIDIObjectRef = 0;
        let mut object_type: MIDIObjectType = 0;
        let rc = unsafe {
            MIDIObjectFindByUniqueID(unique_id, &mut object as *mut _, &mut object_type as *mut _)
        };
        if rc != 0 {
            return None;
        }
        Some((object, kind_of(object_type)))
    }

    fn create_client(&self, name: &str) -> Result<ObjectRef, i32> {
        let cf_name = cfstring(name)?;
        let mut client: MIDIObjectRef = 0;
        let rc =
            unsafe { MIDIClientCreate(cf_name, None, ptr::null_mut(), &mut client as *mut _) };
        unsafe { CFRelease(cf_name as *const c_void) };
        if rc != 0 {
            return Err(rc);
        }
        Ok(client)
    }

    fn create_input_port(
        &self,
        client: ObjectRef,
        name: &str,
        callback: DeliveryCallback,
    ) -> Result<ObjectRef, i32> {
        let cf_name = cfstring(name)?;
        let refcon = Box::into_raw(Box::new(PortContext { callback }));
        let mut port: MIDIObjectRef = 0;
        let rc = unsafe {
            MIDIInputPortCreate(
                client,
                cf_name,
                Some(read_proc),
                refcon as *mut c_void,
                &mut port as *mut _,
            )
        };
        unsafe { CFRelease(cf_name as *const c_void) };
        if rc != 0 {
            unsafe { drop(Box::from_raw(refcon)) };
            return Err(rc);
        }
        self.ports.lock().insert(port, refcon);
        Ok(port)
    }

    fn create_output_port(&self, client: ObjectRef, name: &str) -> Result<ObjectRef, i32> {
        let cf_name = cfstring(name)?;
        let mut port: MIDIObjectRef = 0;
        let rc = unsafe { MIDIOutputPortCreate(client, cf_name, &mut port as *mut _) };
        unsafe { CFRelease(cf_name as *const c_void) };
        if rc != 0 {
            return Err(rc);
        }
        Ok(port)
    }

    fn connect_source(
        &self,
        port: ObjectRef,
        source: ObjectRef,
        context: ConnectionContext,
    ) -> Result<(), i32> {
        let refcon = Box::into_raw(Box::new(context));
        let rc = unsafe { MIDIPortConnectSource(port, source, refcon as *mut c_void) };
        if rc != 0 {
            unsafe { drop(Box::from_raw(refcon)) };
            return Err(rc);
        }
        self.connections.lock().insert(source, refcon);
        Ok(())
    }

    fn disconnect_source(&self, port: ObjectRef, source: ObjectRef) -> Result<(), i32> {
        let rc = unsafe { MIDIPortDisconnectSource(port, source) };
        // Free the context cell whether or not CoreMIDI complained; the
        // connection is gone either way.
        if let Some(refcon) = self.connections.lock().remove(&source) {
            unsafe { drop(Box::from_raw(refcon)) };
        }
        if rc != 0 {
            return Err(rc);
        }
        Ok(())
    }

    fn send(
        &self,
        port: ObjectRef,
        destination: ObjectRef,
        packets: &PacketList,
    ) -> Result<(), i32> {
        // Slack for the native encoding's internal alignment.
        let list_bytes = packets.encoded_len() + 64;
        let mut buf = vec![0u8; list_bytes];
        let list = buf.as_mut_ptr() as *mut coremidi_sys::MIDIPacketList;

        unsafe {
            let mut cur: *mut MIDIPacket = MIDIPacketListInit(list);
            for packet in &packets.packets {
                // Timestamp 0 means "now" on the CoreMIDI schedule.
                cur = MIDIPacketListAdd(
                    list,
                    list_bytes as u64,
                    cur,
                    0,
                    packet.data.len() as u64,
                    packet.data.as_ptr(),
                );
                if cur.is_null() {
                    return Err(PACKET_LIST_FULL);
                }
            }
            let rc = MIDISend(port, destination, list);
            if rc != 0 {
                return Err(rc);
            }
        }
        Ok(())
    }

    fn dispose_port(&self, port: ObjectRef) -> Result<(), i32> {
        let rc = unsafe { MIDIPortDispose(port) };
        if let Some(refcon) = self.ports.lock().remove(&port) {
            unsafe { drop(Box::from_raw(refcon)) };
        }
        if rc != 0 {
            return Err(rc);
        }
        Ok(())
    }

    fn dispose_client(&self, client: ObjectRef) -> Result<(), i32> {
        let rc = unsafe { MIDIClientDispose(client) };
        if rc != 0 {
            return Err(rc);
        }
        Ok(())
    }
}

#[allow(non_upper_case_globals)]
fn kind_of(object_type: MIDIObjectType) -> ObjectKind {
    match object_type {
        kMIDIObjectType_Device => ObjectKind::Device,
        kMIDIObjectType_Entity => ObjectKind::Entity,
        kMIDIObjectType_Source | kMIDIObjectType_ExternalSource => ObjectKind::Source,
        kMIDIObjectType_Destination | kMIDIObjectType_ExternalDestination => {
            ObjectKind::Destination
        }
        _ => ObjectKind::Other,
    }
}

fn cfstring(s: &str) -> Result<CFStringRef, i32> {
    let cf = unsafe {
        CFStringCreateWithBytes(
            ptr::null(),
            s.as_ptr(),
            s.len() as isize,
            kCFStringEncodingUTF8,
            0,
        )
    };
    if cf.is_null() {
        return Err(STRING_CONVERSION_FAILED);
    }
    Ok(cf)
}

fn cfstring_to_string(cf: CFStringRef) -> Option<String> {
    if cf.is_null() {
        return None;
    }
    unsafe {
        let length = CFStringGetLength(cf);
        let max_size = CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8) + 1;
        let mut buf = vec![0u8; max_size as usize];
        if CFStringGetCString(
            cf,
            buf.as_mut_ptr() as *mut i8,
            max_size,
            kCFStringEncodingUTF8,
        ) == 0
        {
            return None;
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(end);
        String::from_utf8(buf).ok()
    }
}
