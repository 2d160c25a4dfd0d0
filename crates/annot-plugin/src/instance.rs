//! Live plugin instances.
//!
//! A [`PluginInstance`] owns one native plugin handle. When it is released
//! (explicitly or by drop) the native `cleanup` runs first, then the
//! registered release observer is told exactly once.

use std::ffi::{c_int, c_uint, c_ulong};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use annot_core::types::InstanceId;
use tracing::debug;

use crate::error::PluginError;
use crate::ffi::ladspa::{LadspaData, LadspaDescriptor, LadspaHandle};
use crate::ffi::vamp::{VampPluginDescriptor, VampPluginHandle};
use crate::identifier::{PluginIdentifier, PluginType};
use crate::loader::Library;
use crate::table::NativeDescriptor;

/// Shared ownership of an open library.
pub type SharedLibrary = Arc<Box<dyn Library>>;

/// Callback run once when an instance has released its native resources.
pub type ReleaseObserver = Box<dyn FnOnce(InstanceId) + Send>;

enum NativeInstance {
    Ladspa {
        descriptor: NonNull<LadspaDescriptor>,
        handle: LadspaHandle,
        active: bool,
        /// Ports given a buffer through `connect_port`.
        connected: Vec<bool>,
    },
    Vamp {
        descriptor: NonNull<VampPluginDescriptor>,
        handle: VampPluginHandle,
    },
}

/// A constructed plugin, ready for ABI-specific calls.
pub struct PluginInstance {
    id: InstanceId,
    identifier: PluginIdentifier,
    sample_rate: f32,
    native: NativeInstance,
    library: Option<SharedLibrary>,
    observer: Option<ReleaseObserver>,
}

// SAFETY: plugin handles may move between threads; calls on one instance
// are serialised through `&mut self`.
unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Calls the descriptor's `instantiate` and wraps the resulting handle.
    ///
    /// # Safety
    ///
    /// `descriptor` must come from `library`, which must be open.
    pub(crate) unsafe fn create(
        identifier: PluginIdentifier,
        descriptor: NativeDescriptor,
        sample_rate: f32,
        library: SharedLibrary,
    ) -> Result<Self, PluginError> {
        let failed = |reason: &str| PluginError::InstantiationFailure {
            label: identifier.label().to_string(),
            reason: reason.to_string(),
        };

        let native = match descriptor {
            NativeDescriptor::Ladspa(d) => {
                let instantiate = unsafe { d.as_ref() }
                    .instantiate
                    .ok_or_else(|| failed("descriptor has no instantiate function"))?;
                let handle = unsafe { instantiate(d.as_ptr(), sample_rate as c_ulong) };
                if handle.is_null() {
                    return Err(failed("instantiate returned null"));
                }
                let port_count = unsafe { d.as_ref() }.port_count as usize;
                NativeInstance::Ladspa {
                    descriptor: d,
                    handle,
                    active: false,
                    connected: vec![false; port_count],
                }
            }
            NativeDescriptor::Vamp(d) => {
                let instantiate = unsafe { d.as_ref() }
                    .instantiate
                    .ok_or_else(|| failed("descriptor has no instantiate function"))?;
                let handle = unsafe { instantiate(d.as_ptr(), sample_rate) };
                if handle.is_null() {
                    return Err(failed("instantiate returned null"));
                }
                NativeInstance::Vamp { descriptor: d, handle }
            }
        };

        Ok(Self {
            id: InstanceId::new(),
            identifier,
            sample_rate,
            native,
            library: Some(library),
            observer: None,
        })
    }

    pub(crate) fn set_release_observer(&mut self, observer: ReleaseObserver) {
        self.observer = Some(observer);
    }

    /// Unique ID of this instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The identifier the instance was created from.
    pub fn identifier(&self) -> &PluginIdentifier {
        &self.identifier
    }

    /// The ABI of the plugin.
    pub fn plugin_type(&self) -> PluginType {
        self.identifier.plugin_type()
    }

    /// Sample rate passed at instantiation.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Releases native resources and notifies the observer.
    pub fn release(self) {
        drop(self);
    }

    // LADSPA

    /// Connects a LADSPA port to a sample buffer.
    ///
    /// # Safety
    ///
    /// `data` must stay valid, and sized for every `run` call, until the
    /// port is reconnected or the instance is released.
    pub unsafe fn connect_port(&mut self, port: usize, data: *mut LadspaData) -> Result<(), PluginError> {
        let (descriptor, handle) = self.ladspa("connect_port")?;
        let d = unsafe { descriptor.as_ref() };
        if port >= d.port_count as usize {
            return Err(self.unsupported(&format!("port {port} out of range")));
        }
        if data.is_null() {
            return Err(self.unsupported(&format!("port {port} given a null buffer")));
        }
        if let Some(connect) = d.connect_port {
            unsafe { connect(handle, port as c_ulong, data) };
        }
        if let NativeInstance::Ladspa { connected, .. } = &mut self.native {
            connected[port] = true;
        }
        Ok(())
    }

    /// Activates a LADSPA instance. Repeated calls are ignored.
    pub fn activate(&mut self) -> Result<(), PluginError> {
        let (descriptor, handle) = self.ladspa("activate")?;
        if let NativeInstance::Ladspa { active: false, .. } = self.native {
            if let Some(activate) = unsafe { descriptor.as_ref() }.activate {
                unsafe { activate(handle) };
            }
            if let NativeInstance::Ladspa { active, .. } = &mut self.native {
                *active = true;
            }
        }
        Ok(())
    }

    /// Processes `sample_count` frames through the connected buffers.
    ///
    /// Fails without calling the plugin while any port is unconnected.
    /// Buffer sizes are the caller's promise made in `connect_port`.
    pub fn run(&mut self, sample_count: usize) -> Result<(), PluginError> {
        let (descriptor, handle) = self.ladspa("run")?;
        if let NativeInstance::Ladspa { connected, .. } = &self.native {
            if let Some(port) = connected.iter().position(|c| !c) {
                return Err(self.unsupported(&format!("port {port} is not connected")));
            }
        }
        let run = unsafe { descriptor.as_ref() }
            .run
            .ok_or_else(|| self.unsupported("plugin has no run function"))?;
        unsafe { run(handle, sample_count as c_ulong) };
        Ok(())
    }

    /// Deactivates a LADSPA instance. Calls on an inactive instance are ignored.
    pub fn deactivate(&mut self) -> Result<(), PluginError> {
        let (descriptor, handle) = self.ladspa("deactivate")?;
        if let NativeInstance::Ladspa { active: true, .. } = self.native {
            if let Some(deactivate) = unsafe { descriptor.as_ref() }.deactivate {
                unsafe { deactivate(handle) };
            }
            if let NativeInstance::Ladspa { active, .. } = &mut self.native {
                *active = false;
            }
        }
        Ok(())
    }

    // Vamp

    /// Prepares a Vamp instance for processing; false if the plugin refuses
    /// the configuration.
    pub fn initialise(&mut self, channels: usize, step_size: usize, block_size: usize) -> Result<bool, PluginError> {
        let (descriptor, handle) = self.vamp("initialise")?;
        let initialise = unsafe { descriptor.as_ref() }
            .initialise
            .ok_or_else(|| self.unsupported("plugin has no initialise function"))?;
        let accepted = unsafe { initialise(handle, channels as c_uint, step_size as c_uint, block_size as c_uint) };
        Ok(accepted != 0)
    }

    /// Resets a Vamp instance to its post-initialise state.
    pub fn reset(&mut self) -> Result<(), PluginError> {
        let (descriptor, handle) = self.vamp("reset")?;
        if let Some(reset) = unsafe { descriptor.as_ref() }.reset {
            unsafe { reset(handle) };
        }
        Ok(())
    }

    /// Current value of a Vamp parameter.
    pub fn parameter(&self, index: usize) -> Result<f32, PluginError> {
        let (descriptor, handle) = self.vamp("get_parameter")?;
        let get = unsafe { descriptor.as_ref() }
            .get_parameter
            .ok_or_else(|| self.unsupported("plugin has no get_parameter function"))?;
        Ok(unsafe { get(handle, index as c_int) })
    }

    /// Sets a Vamp parameter.
    pub fn set_parameter(&mut self, index: usize, value: f32) -> Result<(), PluginError> {
        let (descriptor, handle) = self.vamp("set_parameter")?;
        let set = unsafe { descriptor.as_ref() }
            .set_parameter
            .ok_or_else(|| self.unsupported("plugin has no set_parameter function"))?;
        unsafe { set(handle, index as c_int, value) };
        Ok(())
    }

    /// Preferred step size, or 0 if the plugin has no preference.
    pub fn preferred_step_size(&self) -> Result<usize, PluginError> {
        self.vamp_count("get_preferred_step_size", |d| d.get_preferred_step_size)
    }

    /// Preferred block size, or 0 if the plugin has no preference.
    pub fn preferred_block_size(&self) -> Result<usize, PluginError> {
        self.vamp_count("get_preferred_block_size", |d| d.get_preferred_block_size)
    }

    /// Fewest input channels the plugin accepts.
    pub fn min_channel_count(&self) -> Result<usize, PluginError> {
        self.vamp_count("get_min_channel_count", |d| d.get_min_channel_count)
    }

    /// Most input channels the plugin accepts.
    pub fn max_channel_count(&self) -> Result<usize, PluginError> {
        self.vamp_count("get_max_channel_count", |d| d.get_max_channel_count)
    }

    /// Number of outputs the plugin produces.
    pub fn output_count(&self) -> Result<usize, PluginError> {
        self.vamp_count("get_output_count", |d| d.get_output_count)
    }

    fn vamp_count(
        &self,
        operation: &str,
        select: impl Fn(&VampPluginDescriptor) -> Option<unsafe extern "C" fn(VampPluginHandle) -> c_uint>,
    ) -> Result<usize, PluginError> {
        let (descriptor, handle) = self.vamp(operation)?;
        Ok(match select(unsafe { descriptor.as_ref() }) {
            Some(f) => (unsafe { f(handle) }) as usize,
            None => 0,
        })
    }

    fn ladspa(&self, operation: &str) -> Result<(NonNull<LadspaDescriptor>, LadspaHandle), PluginError> {
        match self.native {
            NativeInstance::Ladspa { descriptor, handle, .. } => Ok((descriptor, handle)),
            NativeInstance::Vamp { .. } => Err(self.unsupported(&format!("{operation} is a LADSPA operation"))),
        }
    }

    fn vamp(&self, operation: &str) -> Result<(NonNull<VampPluginDescriptor>, VampPluginHandle), PluginError> {
        match self.native {
            NativeInstance::Vamp { descriptor, handle } => Ok((descriptor, handle)),
            NativeInstance::Ladspa { .. } => Err(self.unsupported(&format!("{operation} is a Vamp operation"))),
        }
    }

    fn unsupported(&self, reason: &str) -> PluginError {
        PluginError::UnsupportedOperation {
            label: self.identifier.label().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        // SAFETY: the library is still open; `self.library` (and the
        // factory's cache) keep it alive until after this block.
        unsafe {
            match self.native {
                NativeInstance::Ladspa {
                    descriptor,
                    handle,
                    active,
                    ..
                } => {
                    let d = descriptor.as_ref();
                    if active {
                        if let Some(deactivate) = d.deactivate {
                            deactivate(handle);
                        }
                    }
                    if let Some(cleanup) = d.cleanup {
                        cleanup(handle);
                    }
                }
                NativeInstance::Vamp { descriptor, handle } => {
                    if let Some(cleanup) = descriptor.as_ref().cleanup {
                        cleanup(handle);
                    }
                }
            }
        }

        drop(self.library.take());
        debug!(instance = %self.id, identifier = %self.identifier, "Released plugin instance");

        if let Some(observer) = self.observer.take() {
            observer(self.id);
        }
    }
}
