//! LADSPA C ABI (`ladspa.h`, version 1.1).
//!
//! Layouts mirror the header exactly; nothing here may be reordered.

use std::ffi::{c_char, c_int, c_ulong, c_void};

/// Symbol every LADSPA library exports.
pub const DESCRIPTOR_SYMBOL: &str = "ladspa_descriptor";

/// Sample type used by audio and control ports.
pub type LadspaData = f32;

/// Opaque instance handle returned by `instantiate`.
pub type LadspaHandle = *mut c_void;

/// Bit set describing one port.
pub type LadspaPortDescriptor = c_int;

/// Bit set describing one port's range hints.
pub type LadspaPortRangeHintDescriptor = c_int;

pub const PORT_INPUT: LadspaPortDescriptor = 0x1;
pub const PORT_OUTPUT: LadspaPortDescriptor = 0x2;
pub const PORT_CONTROL: LadspaPortDescriptor = 0x4;
pub const PORT_AUDIO: LadspaPortDescriptor = 0x8;

pub const HINT_BOUNDED_BELOW: LadspaPortRangeHintDescriptor = 0x1;
pub const HINT_BOUNDED_ABOVE: LadspaPortRangeHintDescriptor = 0x2;
pub const HINT_TOGGLED: LadspaPortRangeHintDescriptor = 0x4;
pub const HINT_SAMPLE_RATE: LadspaPortRangeHintDescriptor = 0x8;
pub const HINT_LOGARITHMIC: LadspaPortRangeHintDescriptor = 0x10;
pub const HINT_INTEGER: LadspaPortRangeHintDescriptor = 0x20;

pub const HINT_DEFAULT_MASK: LadspaPortRangeHintDescriptor = 0x3C0;
pub const HINT_DEFAULT_NONE: LadspaPortRangeHintDescriptor = 0x0;
pub const HINT_DEFAULT_MINIMUM: LadspaPortRangeHintDescriptor = 0x40;
pub const HINT_DEFAULT_LOW: LadspaPortRangeHintDescriptor = 0x80;
pub const HINT_DEFAULT_MIDDLE: LadspaPortRangeHintDescriptor = 0xC0;
pub const HINT_DEFAULT_HIGH: LadspaPortRangeHintDescriptor = 0x100;
pub const HINT_DEFAULT_MAXIMUM: LadspaPortRangeHintDescriptor = 0x140;
pub const HINT_DEFAULT_0: LadspaPortRangeHintDescriptor = 0x200;
pub const HINT_DEFAULT_1: LadspaPortRangeHintDescriptor = 0x240;
pub const HINT_DEFAULT_100: LadspaPortRangeHintDescriptor = 0x280;
pub const HINT_DEFAULT_440: LadspaPortRangeHintDescriptor = 0x2C0;

/// Range hint for one port.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LadspaPortRangeHint {
    pub hint_descriptor: LadspaPortRangeHintDescriptor,
    pub lower_bound: LadspaData,
    pub upper_bound: LadspaData,
}

/// `LADSPA_Descriptor`.
#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: c_int,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const LadspaPortDescriptor,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const LadspaPortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(descriptor: *const LadspaDescriptor, sample_rate: c_ulong) -> LadspaHandle>,
    pub connect_port:
        Option<unsafe extern "C" fn(instance: LadspaHandle, port: c_ulong, data: *mut LadspaData)>,
    pub activate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(instance: LadspaHandle, gain: LadspaData)>,
    pub deactivate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
}

/// `ladspa_descriptor(index)`; returns null past the last plugin.
pub type LadspaDescriptorFn = unsafe extern "C" fn(index: c_ulong) -> *const LadspaDescriptor;
