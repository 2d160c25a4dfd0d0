//! In-process stand-ins for native plugin libraries.
//!
//! [`MockLoader`] maps file paths to [`MockFixture`]s. Each fixture's entry
//! point is a real `extern "C"` function returning real `#[repr(C)]`
//! descriptor tables, so the ABI-parsing and instance code paths run
//! unchanged against them.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex};

use crate::error::PluginError;
use crate::ffi::ladspa::{self, LadspaData, LadspaDescriptor, LadspaDescriptorFn, LadspaHandle, LadspaPortRangeHint};
use crate::ffi::vamp::{
    self, VampGetPluginDescriptorFn, VampParameterDescriptor, VampPluginDescriptor, VampPluginHandle,
};
use crate::loader::{Library, LibraryLoader};

/// A canned library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFixture {
    /// LADSPA: `amp_mono` (id 1048) and `amp_stereo` (id 1049).
    LadspaAmp,
    /// LADSPA: returns `delay` at indices 0 and 1.
    LadspaDuplicate,
    /// Vamp: `onsetdetector`, `tempo`, and `broken` (whose instantiate fails).
    VampOnsets,
    /// Vamp: returns `a` at indices 0 and 1.
    VampDuplicate,
    /// Opens, but exports no entry point.
    NoEntryPoint,
    /// Fails to open.
    Unloadable,
}

impl MockFixture {
    fn symbols(&self) -> HashMap<&'static str, usize> {
        let mut symbols = HashMap::new();
        match self {
            Self::LadspaAmp => {
                symbols.insert(ladspa::DESCRIPTOR_SYMBOL, amp_library as LadspaDescriptorFn as usize);
            }
            Self::LadspaDuplicate => {
                symbols.insert(ladspa::DESCRIPTOR_SYMBOL, delay_library as LadspaDescriptorFn as usize);
            }
            Self::VampOnsets => {
                symbols.insert(vamp::DESCRIPTOR_SYMBOL, onsets_library as VampGetPluginDescriptorFn as usize);
            }
            Self::VampDuplicate => {
                symbols.insert(vamp::DESCRIPTOR_SYMBOL, duplicate_vamp_library as VampGetPluginDescriptorFn as usize);
            }
            Self::NoEntryPoint | Self::Unloadable => {}
        }
        symbols
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    opens: usize,
    closes: usize,
}

/// Loader serving [`MockFixture`]s and counting opens and closes per path.
#[derive(Debug, Default)]
pub struct MockLoader {
    fixtures: Mutex<HashMap<PathBuf, MockFixture>>,
    counts: Arc<Mutex<HashMap<PathBuf, Counts>>>,
}

impl MockLoader {
    /// Creates a loader with no libraries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `fixture` for `path`. Unregistered paths fail to open.
    pub fn register(&self, path: impl AsRef<Path>, fixture: MockFixture) {
        self.fixtures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.as_ref().to_path_buf(), fixture);
    }

    /// Times `path` was opened.
    pub fn opens(&self, path: impl AsRef<Path>) -> usize {
        self.counts_for(path.as_ref()).opens
    }

    /// Times `path` was closed.
    pub fn closes(&self, path: impl AsRef<Path>) -> usize {
        self.counts_for(path.as_ref()).closes
    }

    /// Handles to `path` opened and not yet closed.
    pub fn open_handles(&self, path: impl AsRef<Path>) -> usize {
        let counts = self.counts_for(path.as_ref());
        counts.opens.saturating_sub(counts.closes)
    }

    fn counts_for(&self, path: &Path) -> Counts {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
            .unwrap_or_default()
    }
}

impl LibraryLoader for MockLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Library>, PluginError> {
        let fixture = self
            .fixtures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied();

        let fixture = match fixture {
            Some(MockFixture::Unloadable) | None => {
                return Err(PluginError::LoadFailure {
                    path: path.to_path_buf(),
                    reason: "not a loadable library".to_string(),
                });
            }
            Some(fixture) => fixture,
        };

        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_path_buf())
            .or_default()
            .opens += 1;

        Ok(Box::new(MockLibrary {
            path: path.to_path_buf(),
            symbols: fixture.symbols(),
            counts: Arc::clone(&self.counts),
        }))
    }
}

#[derive(Debug)]
struct MockLibrary {
    path: PathBuf,
    symbols: HashMap<&'static str, usize>,
    counts: Arc<Mutex<HashMap<PathBuf, Counts>>>,
}

impl Library for MockLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Result<*const c_void, PluginError> {
        self.symbols
            .get(name)
            .map(|address| *address as *const c_void)
            .ok_or_else(|| PluginError::SymbolMissing {
                path: self.path.clone(),
                symbol: name.to_string(),
            })
    }

    fn close(self: Box<Self>) -> Result<(), PluginError> {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(self.path.clone())
            .or_default()
            .closes += 1;
        Ok(())
    }
}

/// Static descriptor data holding raw pointers into other statics.
struct Shared<T>(T);

// SAFETY: wrapped values are immutable and point only at other statics.
unsafe impl<T> Sync for Shared<T> {}

// LADSPA amplifiers

const IN_CONTROL: c_int = ladspa::PORT_INPUT | ladspa::PORT_CONTROL;
const OUT_CONTROL: c_int = ladspa::PORT_OUTPUT | ladspa::PORT_CONTROL;
const IN_AUDIO: c_int = ladspa::PORT_INPUT | ladspa::PORT_AUDIO;
const OUT_AUDIO: c_int = ladspa::PORT_OUTPUT | ladspa::PORT_AUDIO;

const NO_HINT: LadspaPortRangeHint = LadspaPortRangeHint {
    hint_descriptor: 0,
    lower_bound: 0.0,
    upper_bound: 0.0,
};

const GAIN_HINT: LadspaPortRangeHint = LadspaPortRangeHint {
    hint_descriptor: ladspa::HINT_BOUNDED_BELOW
        | ladspa::HINT_BOUNDED_ABOVE
        | ladspa::HINT_LOGARITHMIC
        | ladspa::HINT_DEFAULT_1,
    lower_bound: 0.0,
    upper_bound: 10.0,
};

static AMP_MONO_PORTS: [c_int; 5] = [IN_CONTROL, IN_AUDIO, OUT_AUDIO, OUT_CONTROL, OUT_CONTROL];
static AMP_MONO_NAMES: Shared<[*const c_char; 5]> = Shared([
    c"Gain".as_ptr(),
    c"Input".as_ptr(),
    c"Output".as_ptr(),
    c"Peak".as_ptr(),
    c"latency".as_ptr(),
]);
static AMP_MONO_HINTS: [LadspaPortRangeHint; 5] = [GAIN_HINT, NO_HINT, NO_HINT, NO_HINT, NO_HINT];

static AMP_STEREO_PORTS: [c_int; 5] = [IN_CONTROL, IN_AUDIO, IN_AUDIO, OUT_AUDIO, OUT_AUDIO];
static AMP_STEREO_NAMES: Shared<[*const c_char; 5]> = Shared([
    c"Gain".as_ptr(),
    c"Input L".as_ptr(),
    c"Input R".as_ptr(),
    c"Output L".as_ptr(),
    c"Output R".as_ptr(),
]);
static AMP_STEREO_HINTS: [LadspaPortRangeHint; 5] = [GAIN_HINT, NO_HINT, NO_HINT, NO_HINT, NO_HINT];

static AMP_MONO: Shared<LadspaDescriptor> = Shared(LadspaDescriptor {
    unique_id: 1048,
    label: c"amp_mono".as_ptr(),
    properties: 0,
    name: c"Mono Amplifier".as_ptr(),
    maker: c"Annot Fixtures".as_ptr(),
    copyright: c"None".as_ptr(),
    port_count: 5,
    port_descriptors: AMP_MONO_PORTS.as_ptr(),
    port_names: AMP_MONO_NAMES.0.as_ptr(),
    port_range_hints: AMP_MONO_HINTS.as_ptr(),
    implementation_data: ptr::null_mut(),
    instantiate: Some(amp_instantiate),
    connect_port: Some(amp_connect_port),
    activate: Some(amp_activate),
    run: Some(amp_mono_run),
    run_adding: None,
    set_run_adding_gain: None,
    deactivate: Some(amp_deactivate),
    cleanup: Some(amp_cleanup),
});

static AMP_STEREO: Shared<LadspaDescriptor> = Shared(LadspaDescriptor {
    unique_id: 1049,
    label: c"amp_stereo".as_ptr(),
    properties: 0,
    name: c"Stereo Amplifier".as_ptr(),
    maker: c"Annot Fixtures".as_ptr(),
    copyright: c"None".as_ptr(),
    port_count: 5,
    port_descriptors: AMP_STEREO_PORTS.as_ptr(),
    port_names: AMP_STEREO_NAMES.0.as_ptr(),
    port_range_hints: AMP_STEREO_HINTS.as_ptr(),
    implementation_data: ptr::null_mut(),
    instantiate: Some(amp_instantiate),
    connect_port: Some(amp_connect_port),
    activate: Some(amp_activate),
    run: Some(amp_stereo_run),
    run_adding: None,
    set_run_adding_gain: None,
    deactivate: Some(amp_deactivate),
    cleanup: Some(amp_cleanup),
});

static DELAY_PORTS: [c_int; 1] = [IN_CONTROL];
static DELAY_NAMES: Shared<[*const c_char; 1]> = Shared([c"Delay".as_ptr()]);
static DELAY_HINTS: [LadspaPortRangeHint; 1] = [LadspaPortRangeHint {
    hint_descriptor: ladspa::HINT_BOUNDED_BELOW
        | ladspa::HINT_BOUNDED_ABOVE
        | ladspa::HINT_SAMPLE_RATE
        | ladspa::HINT_DEFAULT_MIDDLE,
    lower_bound: 0.0,
    upper_bound: 0.5,
}];

static DELAY: Shared<LadspaDescriptor> = Shared(LadspaDescriptor {
    unique_id: 2001,
    label: c"delay".as_ptr(),
    properties: 0,
    name: c"Simple Delay".as_ptr(),
    maker: c"Annot Fixtures".as_ptr(),
    copyright: c"None".as_ptr(),
    port_count: 1,
    port_descriptors: DELAY_PORTS.as_ptr(),
    port_names: DELAY_NAMES.0.as_ptr(),
    port_range_hints: DELAY_HINTS.as_ptr(),
    implementation_data: ptr::null_mut(),
    instantiate: Some(amp_instantiate),
    connect_port: Some(amp_connect_port),
    activate: None,
    run: None,
    run_adding: None,
    set_run_adding_gain: None,
    deactivate: None,
    cleanup: Some(amp_cleanup),
});

unsafe extern "C" fn amp_library(index: c_ulong) -> *const LadspaDescriptor {
    match index {
        0 => &raw const AMP_MONO.0,
        1 => &raw const AMP_STEREO.0,
        _ => ptr::null(),
    }
}

unsafe extern "C" fn delay_library(index: c_ulong) -> *const LadspaDescriptor {
    match index {
        0 | 1 => &raw const DELAY.0,
        _ => ptr::null(),
    }
}

struct AmpState {
    ports: [*mut LadspaData; 5],
}

unsafe extern "C" fn amp_instantiate(_descriptor: *const LadspaDescriptor, _sample_rate: c_ulong) -> LadspaHandle {
    Box::into_raw(Box::new(AmpState {
        ports: [ptr::null_mut(); 5],
    })) as LadspaHandle
}

unsafe extern "C" fn amp_connect_port(instance: LadspaHandle, port: c_ulong, data: *mut LadspaData) {
    let state = unsafe { &mut *(instance as *mut AmpState) };
    if let Some(slot) = state.ports.get_mut(port as usize) {
        *slot = data;
    }
}

unsafe extern "C" fn amp_activate(_instance: LadspaHandle) {}

unsafe extern "C" fn amp_deactivate(_instance: LadspaHandle) {}

unsafe fn amplify(gain: *mut LadspaData, input: *mut LadspaData, output: *mut LadspaData, count: usize) -> f32 {
    if gain.is_null() || input.is_null() || output.is_null() {
        return 0.0;
    }
    let gain = unsafe { *gain };
    let input = unsafe { std::slice::from_raw_parts(input, count) };
    let output = unsafe { std::slice::from_raw_parts_mut(output, count) };
    let mut peak = 0f32;
    for (out, sample) in output.iter_mut().zip(input) {
        *out = sample * gain;
        peak = peak.max(out.abs());
    }
    peak
}

unsafe extern "C" fn amp_mono_run(instance: LadspaHandle, sample_count: c_ulong) {
    let state = unsafe { &mut *(instance as *mut AmpState) };
    let [gain, input, output, peak, latency] = state.ports;
    let level = unsafe { amplify(gain, input, output, sample_count as usize) };
    if !peak.is_null() {
        unsafe { *peak = level };
    }
    if !latency.is_null() {
        unsafe { *latency = 0.0 };
    }
}

unsafe extern "C" fn amp_stereo_run(instance: LadspaHandle, sample_count: c_ulong) {
    let state = unsafe { &mut *(instance as *mut AmpState) };
    let [gain, left_in, right_in, left_out, right_out] = state.ports;
    unsafe {
        amplify(gain, left_in, left_out, sample_count as usize);
        amplify(gain, right_in, right_out, sample_count as usize);
    }
}

unsafe extern "C" fn amp_cleanup(instance: LadspaHandle) {
    drop(unsafe { Box::from_raw(instance as *mut AmpState) });
}

// Vamp analysers

static SENSITIVITY: Shared<VampParameterDescriptor> = Shared(VampParameterDescriptor {
    identifier: c"sensitivity".as_ptr(),
    name: c"Sensitivity".as_ptr(),
    description: c"Detection sensitivity".as_ptr(),
    unit: c"%".as_ptr(),
    min_value: 0.0,
    max_value: 100.0,
    default_value: 50.0,
    is_quantized: 0,
    quantize_step: 0.0,
    value_names: ptr::null(),
});

static DF_TYPE: Shared<VampParameterDescriptor> = Shared(VampParameterDescriptor {
    identifier: c"dftype".as_ptr(),
    name: c"Detection Function".as_ptr(),
    description: c"".as_ptr(),
    unit: c"".as_ptr(),
    min_value: 0.0,
    max_value: 4.0,
    default_value: 3.0,
    is_quantized: 1,
    quantize_step: 1.0,
    value_names: ptr::null(),
});

static ONSET_PARAMETERS: Shared<[*const VampParameterDescriptor; 2]> = Shared([&raw const SENSITIVITY.0, &raw const DF_TYPE.0]);

type VampInstantiateFn = unsafe extern "C" fn(*const VampPluginDescriptor, f32) -> VampPluginHandle;

const fn vamp_descriptor(
    identifier: *const c_char,
    name: *const c_char,
    parameters: *const *const VampParameterDescriptor,
    parameter_count: c_uint,
    instantiate: VampInstantiateFn,
) -> VampPluginDescriptor {
    VampPluginDescriptor {
        vamp_api_version: vamp::VAMP_API_VERSION,
        identifier,
        name,
        description: c"Fixture analyser".as_ptr(),
        maker: c"Annot Fixtures".as_ptr(),
        plugin_version: 2,
        copyright: c"None".as_ptr(),
        parameter_count,
        parameters,
        program_count: 0,
        programs: ptr::null(),
        input_domain: vamp::TIME_DOMAIN,
        instantiate: Some(instantiate),
        cleanup: Some(vamp_cleanup),
        initialise: Some(vamp_initialise),
        reset: Some(vamp_reset),
        get_parameter: Some(vamp_get_parameter),
        set_parameter: Some(vamp_set_parameter),
        get_current_program: None,
        select_program: None,
        get_preferred_step_size: Some(vamp_preferred_step),
        get_preferred_block_size: Some(vamp_preferred_block),
        get_min_channel_count: Some(vamp_channel_count),
        get_max_channel_count: Some(vamp_channel_count),
        get_output_count: Some(vamp_output_count),
        get_output_descriptor: None,
        release_output_descriptor: None,
        process: None,
        get_remaining_features: None,
        release_feature_set: None,
    }
}

static ONSET_DETECTOR: Shared<VampPluginDescriptor> = Shared(vamp_descriptor(
    c"onsetdetector".as_ptr(),
    c"Note Onset Detector".as_ptr(),
    ONSET_PARAMETERS.0.as_ptr(),
    2,
    vamp_instantiate,
));

static TEMPO: Shared<VampPluginDescriptor> = Shared(vamp_descriptor(
    c"tempo".as_ptr(),
    c"Tempo Tracker".as_ptr(),
    ptr::null(),
    0,
    vamp_instantiate,
));

static BROKEN: Shared<VampPluginDescriptor> = Shared(vamp_descriptor(
    c"broken".as_ptr(),
    c"Broken Analyser".as_ptr(),
    ptr::null(),
    0,
    vamp_instantiate_fails,
));

static DUPLICATE_A: Shared<VampPluginDescriptor> =
    Shared(vamp_descriptor(c"a".as_ptr(), c"A".as_ptr(), ptr::null(), 0, vamp_instantiate));

unsafe extern "C" fn onsets_library(_api: c_uint, index: c_uint) -> *const VampPluginDescriptor {
    match index {
        0 => &raw const ONSET_DETECTOR.0,
        1 => &raw const TEMPO.0,
        2 => &raw const BROKEN.0,
        _ => ptr::null(),
    }
}

unsafe extern "C" fn duplicate_vamp_library(_api: c_uint, index: c_uint) -> *const VampPluginDescriptor {
    match index {
        0 | 1 => &raw const DUPLICATE_A.0,
        _ => ptr::null(),
    }
}

struct AnalyserState {
    parameters: Vec<f32>,
}

unsafe extern "C" fn vamp_instantiate(descriptor: *const VampPluginDescriptor, _rate: f32) -> VampPluginHandle {
    let descriptor = unsafe { &*descriptor };
    let defaults = (0..descriptor.parameter_count as usize)
        .map(|i| unsafe { (**descriptor.parameters.add(i)).default_value })
        .collect();
    Box::into_raw(Box::new(AnalyserState { parameters: defaults })) as VampPluginHandle
}

unsafe extern "C" fn vamp_instantiate_fails(_descriptor: *const VampPluginDescriptor, _rate: f32) -> VampPluginHandle {
    ptr::null_mut()
}

unsafe extern "C" fn vamp_cleanup(handle: VampPluginHandle) {
    drop(unsafe { Box::from_raw(handle as *mut AnalyserState) });
}

unsafe extern "C" fn vamp_initialise(_handle: VampPluginHandle, channels: c_uint, step: c_uint, block: c_uint) -> c_int {
    c_int::from(channels == 1 && step > 0 && block > 0)
}

unsafe extern "C" fn vamp_reset(_handle: VampPluginHandle) {}

unsafe extern "C" fn vamp_get_parameter(handle: VampPluginHandle, index: c_int) -> f32 {
    let state = unsafe { &*(handle as *const AnalyserState) };
    usize::try_from(index)
        .ok()
        .and_then(|i| state.parameters.get(i).copied())
        .unwrap_or(0.0)
}

unsafe extern "C" fn vamp_set_parameter(handle: VampPluginHandle, index: c_int, value: f32) {
    let state = unsafe { &mut *(handle as *mut AnalyserState) };
    if let Some(slot) = usize::try_from(index).ok().and_then(|i| state.parameters.get_mut(i)) {
        *slot = value;
    }
}

unsafe extern "C" fn vamp_preferred_step(_handle: VampPluginHandle) -> c_uint {
    512
}

unsafe extern "C" fn vamp_preferred_block(_handle: VampPluginHandle) -> c_uint {
    1024
}

unsafe extern "C" fn vamp_channel_count(_handle: VampPluginHandle) -> c_uint {
    1
}

unsafe extern "C" fn vamp_output_count(_handle: VampPluginHandle) -> c_uint {
    1
}
