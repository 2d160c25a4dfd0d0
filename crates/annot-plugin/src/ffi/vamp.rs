//! Vamp plugin C ABI (`vamp/vamp.h`, API version 2).
//!
//! Output and feature structures are left opaque; the host only needs
//! their pointers to pass back into the plugin.

use std::ffi::{c_char, c_int, c_uint, c_void};

/// Symbol every Vamp library exports.
pub const DESCRIPTOR_SYMBOL: &str = "vampGetPluginDescriptor";

/// Host API version passed to the descriptor function.
pub const VAMP_API_VERSION: c_uint = 2;

/// Opaque instance handle returned by `instantiate`.
pub type VampPluginHandle = *mut c_void;

/// `VampInputDomain`.
pub type VampInputDomain = c_int;
pub const TIME_DOMAIN: VampInputDomain = 0;
pub const FREQUENCY_DOMAIN: VampInputDomain = 1;

/// `VampParameterDescriptor`.
#[repr(C)]
pub struct VampParameterDescriptor {
    pub identifier: *const c_char,
    pub name: *const c_char,
    pub description: *const c_char,
    pub unit: *const c_char,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub is_quantized: c_int,
    pub quantize_step: f32,
    pub value_names: *const *const c_char,
}

/// `VampPluginDescriptor`.
#[repr(C)]
pub struct VampPluginDescriptor {
    pub vamp_api_version: c_uint,
    pub identifier: *const c_char,
    pub name: *const c_char,
    pub description: *const c_char,
    pub maker: *const c_char,
    pub plugin_version: c_int,
    pub copyright: *const c_char,
    pub parameter_count: c_uint,
    pub parameters: *const *const VampParameterDescriptor,
    pub program_count: c_uint,
    pub programs: *const *const c_char,
    pub input_domain: VampInputDomain,
    pub instantiate:
        Option<unsafe extern "C" fn(descriptor: *const VampPluginDescriptor, input_sample_rate: f32) -> VampPluginHandle>,
    pub cleanup: Option<unsafe extern "C" fn(handle: VampPluginHandle)>,
    pub initialise: Option<
        unsafe extern "C" fn(handle: VampPluginHandle, channels: c_uint, step_size: c_uint, block_size: c_uint) -> c_int,
    >,
    pub reset: Option<unsafe extern "C" fn(handle: VampPluginHandle)>,
    pub get_parameter: Option<unsafe extern "C" fn(handle: VampPluginHandle, index: c_int) -> f32>,
    pub set_parameter: Option<unsafe extern "C" fn(handle: VampPluginHandle, index: c_int, value: f32)>,
    pub get_current_program: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub select_program: Option<unsafe extern "C" fn(handle: VampPluginHandle, program: c_uint)>,
    pub get_preferred_step_size: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub get_preferred_block_size: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub get_min_channel_count: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub get_max_channel_count: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub get_output_count: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> c_uint>,
    pub get_output_descriptor: Option<unsafe extern "C" fn(handle: VampPluginHandle, index: c_uint) -> *mut c_void>,
    pub release_output_descriptor: Option<unsafe extern "C" fn(descriptor: *mut c_void)>,
    pub process: Option<
        unsafe extern "C" fn(handle: VampPluginHandle, inputs: *const *const f32, sec: c_int, nsec: c_int) -> *mut c_void,
    >,
    pub get_remaining_features: Option<unsafe extern "C" fn(handle: VampPluginHandle) -> *mut c_void>,
    pub release_feature_set: Option<unsafe extern "C" fn(features: *mut c_void)>,
}

/// `vampGetPluginDescriptor(hostApiVersion, index)`; returns null past the
/// last plugin.
pub type VampGetPluginDescriptorFn =
    unsafe extern "C" fn(host_api_version: c_uint, index: c_uint) -> *const VampPluginDescriptor;
