//! Walking a library's descriptor table.
//!
//! Both ABIs export one function returning the descriptor at a given index,
//! or null past the end. Descriptors returned here borrow from the open
//! library and must not outlive it.

use std::ffi::{c_ulong, c_void};
use std::path::Path;
use std::ptr::NonNull;

use tracing::warn;

use crate::descriptor::{
    DefaultPolicy, PluginDescriptorRecord, PortDescriptor, PortDirection, PortHints, PortKind, UniqueId,
};
use crate::error::PluginError;
use crate::ffi::ladspa::{self, LadspaDescriptor, LadspaDescriptorFn};
use crate::ffi::safety::{c_str_lossy, slice_or_empty};
use crate::ffi::vamp::{self, VampGetPluginDescriptorFn, VampParameterDescriptor, VampPluginDescriptor};
use crate::identifier::{PluginIdentifier, PluginType};
use crate::loader::Library;

/// Upper bound on table indices, for tables that never return null.
pub const MAX_TABLE_ENTRIES: u32 = 4096;

/// The entry point of an open library.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorTable {
    Ladspa(LadspaDescriptorFn),
    Vamp(VampGetPluginDescriptorFn),
}

/// One native descriptor, valid while its library is open.
#[derive(Debug, Clone, Copy)]
pub enum NativeDescriptor {
    Ladspa(NonNull<LadspaDescriptor>),
    Vamp(NonNull<VampPluginDescriptor>),
}

impl DescriptorTable {
    /// Resolves the well-known entry symbol for `plugin_type`.
    pub fn resolve(library: &dyn Library, plugin_type: PluginType) -> Result<Self, PluginError> {
        let address = library.symbol(plugin_type.descriptor_symbol())?;

        // SAFETY: the symbol is the ABI-defined entry point for this plugin
        // type, so its address has the corresponding function signature.
        let table = unsafe {
            match plugin_type {
                PluginType::Ladspa => {
                    Self::Ladspa(std::mem::transmute::<*const c_void, LadspaDescriptorFn>(address))
                }
                PluginType::Vamp => {
                    Self::Vamp(std::mem::transmute::<*const c_void, VampGetPluginDescriptorFn>(address))
                }
            }
        };
        Ok(table)
    }

    /// Returns the descriptor at `index`, or `None` at the end of the table.
    ///
    /// # Safety
    ///
    /// The library the table was resolved from must still be open.
    pub unsafe fn get(&self, index: u32) -> Option<NativeDescriptor> {
        match self {
            Self::Ladspa(f) => NonNull::new(unsafe { f(index as c_ulong) } as *mut LadspaDescriptor)
                .map(NativeDescriptor::Ladspa),
            Self::Vamp(f) => NonNull::new(unsafe { f(vamp::VAMP_API_VERSION, index) } as *mut VampPluginDescriptor)
                .map(NativeDescriptor::Vamp),
        }
    }

    /// Collects every descriptor in index order.
    ///
    /// # Safety
    ///
    /// The library the table was resolved from must still be open.
    pub unsafe fn entries(&self, path: &Path) -> Vec<NativeDescriptor> {
        let mut entries = Vec::new();
        for index in 0..MAX_TABLE_ENTRIES {
            match unsafe { self.get(index) } {
                Some(descriptor) => entries.push(descriptor),
                None => return entries,
            }
        }
        warn!(path = %path.display(), limit = MAX_TABLE_ENTRIES, "Descriptor table not terminated, truncating");
        entries
    }

    /// Finds the descriptor whose label is `label`.
    ///
    /// # Safety
    ///
    /// The library the table was resolved from must still be open.
    pub unsafe fn find(&self, path: &Path, label: &str) -> Result<NativeDescriptor, PluginError> {
        unsafe { self.entries(path) }
            .into_iter()
            .find(|d| unsafe { d.label() } == label)
            .ok_or_else(|| PluginError::DescriptorNotFound {
                path: path.to_path_buf(),
                label: label.to_string(),
            })
    }
}

impl NativeDescriptor {
    /// The plugin's label (LADSPA `Label`, Vamp `identifier`).
    ///
    /// # Safety
    ///
    /// The owning library must still be open.
    pub unsafe fn label(&self) -> String {
        unsafe {
            match self {
                Self::Ladspa(d) => c_str_lossy(d.as_ref().label),
                Self::Vamp(d) => c_str_lossy(d.as_ref().identifier),
            }
        }
    }

    /// Copies the descriptor into an owned record identified under `library`.
    ///
    /// # Safety
    ///
    /// The owning library must still be open.
    pub unsafe fn to_record(&self, library: &str) -> Result<PluginDescriptorRecord, PluginError> {
        unsafe {
            match self {
                Self::Ladspa(d) => ladspa_record(d.as_ref(), library),
                Self::Vamp(d) => vamp_record(d.as_ref(), library),
            }
        }
    }
}

unsafe fn ladspa_record(d: &LadspaDescriptor, library: &str) -> Result<PluginDescriptorRecord, PluginError> {
    let count = d.port_count as usize;
    let (kinds, names, hints) = unsafe {
        (
            slice_or_empty(d.port_descriptors, count),
            slice_or_empty(d.port_names, count),
            slice_or_empty(d.port_range_hints, count),
        )
    };

    if count > 0 && (kinds.len() != count || names.len() != count || hints.len() != count) {
        return Err(PluginError::MalformedDescriptor {
            path: library.into(),
            reason: format!("{count} ports declared but port arrays are missing"),
        });
    }

    let ports = (0..count)
        .map(|i| ladspa_port(i, kinds[i], unsafe { c_str_lossy(names[i]) }, hints[i]))
        .collect();

    let label = unsafe { c_str_lossy(d.label) };
    Ok(PluginDescriptorRecord {
        identifier: checked_identifier(PluginType::Ladspa, library, &label)?,
        unique_id: UniqueId::Numeric(d.unique_id as u64),
        label,
        name: unsafe { c_str_lossy(d.name) },
        maker: unsafe { c_str_lossy(d.maker) },
        copyright: unsafe { c_str_lossy(d.copyright) },
        description: String::new(),
        version: None,
        ports,
        category: String::new(),
    })
}

fn ladspa_port(index: usize, kind: ladspa::LadspaPortDescriptor, name: String, hint: ladspa::LadspaPortRangeHint) -> PortDescriptor {
    let bits = hint.hint_descriptor;
    let has = |flag| bits & flag != 0;

    let default_policy = match bits & ladspa::HINT_DEFAULT_MASK {
        ladspa::HINT_DEFAULT_MINIMUM => DefaultPolicy::Minimum,
        ladspa::HINT_DEFAULT_LOW => DefaultPolicy::Low,
        ladspa::HINT_DEFAULT_MIDDLE => DefaultPolicy::Middle,
        ladspa::HINT_DEFAULT_HIGH => DefaultPolicy::High,
        ladspa::HINT_DEFAULT_MAXIMUM => DefaultPolicy::Maximum,
        ladspa::HINT_DEFAULT_0 => DefaultPolicy::Zero,
        ladspa::HINT_DEFAULT_1 => DefaultPolicy::One,
        ladspa::HINT_DEFAULT_100 => DefaultPolicy::Hundred,
        ladspa::HINT_DEFAULT_440 => DefaultPolicy::FourForty,
        _ => DefaultPolicy::None,
    };

    PortDescriptor {
        index,
        name,
        direction: if kind & ladspa::PORT_OUTPUT != 0 {
            PortDirection::Output
        } else {
            PortDirection::Input
        },
        kind: if kind & ladspa::PORT_AUDIO != 0 {
            PortKind::Audio
        } else {
            PortKind::Control
        },
        hints: PortHints {
            toggled: has(ladspa::HINT_TOGGLED),
            integer: has(ladspa::HINT_INTEGER),
            logarithmic: has(ladspa::HINT_LOGARITHMIC),
            sample_rate: has(ladspa::HINT_SAMPLE_RATE),
        },
        lower_bound: has(ladspa::HINT_BOUNDED_BELOW).then_some(hint.lower_bound),
        upper_bound: has(ladspa::HINT_BOUNDED_ABOVE).then_some(hint.upper_bound),
        default_policy,
        default_override: None,
    }
}

unsafe fn vamp_record(d: &VampPluginDescriptor, library: &str) -> Result<PluginDescriptorRecord, PluginError> {
    let parameters = unsafe { slice_or_empty(d.parameters, d.parameter_count as usize) };
    let ports = parameters
        .iter()
        .enumerate()
        .filter_map(|(i, p)| NonNull::new(*p as *mut VampParameterDescriptor).map(|p| (i, p)))
        .map(|(i, p)| vamp_parameter(i, unsafe { p.as_ref() }))
        .collect();

    let label = unsafe { c_str_lossy(d.identifier) };
    Ok(PluginDescriptorRecord {
        identifier: checked_identifier(PluginType::Vamp, library, &label)?,
        unique_id: UniqueId::Text(label.clone()),
        label,
        name: unsafe { c_str_lossy(d.name) },
        maker: unsafe { c_str_lossy(d.maker) },
        copyright: unsafe { c_str_lossy(d.copyright) },
        description: unsafe { c_str_lossy(d.description) },
        version: Some(d.plugin_version),
        ports,
        category: String::new(),
    })
}

fn checked_identifier(plugin_type: PluginType, library: &str, label: &str) -> Result<PluginIdentifier, PluginError> {
    PluginIdentifier::try_new(plugin_type, library, label).map_err(|e| PluginError::MalformedDescriptor {
        path: library.into(),
        reason: e.to_string(),
    })
}

fn vamp_parameter(index: usize, p: &VampParameterDescriptor) -> PortDescriptor {
    let quantized = p.is_quantized != 0;
    // SAFETY: descriptor strings are NUL-terminated or null.
    let mut name = unsafe { c_str_lossy(p.name) };
    if name.is_empty() {
        name = unsafe { c_str_lossy(p.identifier) };
    }

    PortDescriptor {
        index,
        name,
        direction: PortDirection::Input,
        kind: PortKind::Control,
        hints: PortHints {
            toggled: quantized && p.quantize_step == 1.0 && p.min_value == 0.0 && p.max_value == 1.0,
            integer: quantized && p.quantize_step == 1.0,
            logarithmic: false,
            sample_rate: false,
        },
        lower_bound: Some(p.min_value),
        upper_bound: Some(p.max_value),
        default_policy: DefaultPolicy::Explicit(p.default_value),
        default_override: None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::loader::LibraryLoader;
    use crate::mock::{MockFixture, MockLoader};

    fn open(fixture: MockFixture) -> Box<dyn Library> {
        let loader = Arc::new(MockLoader::new());
        let path = PathBuf::from("/plugins/lib.so");
        loader.register(&path, fixture);
        loader.open(&path).expect("open")
    }

    #[test]
    fn test_ladspa_table_terminates_at_null() {
        let library = open(MockFixture::LadspaAmp);
        let table = DescriptorTable::resolve(library.as_ref(), PluginType::Ladspa).expect("resolve");
        let labels: Vec<String> = unsafe { table.entries(library.path()) }
            .iter()
            .map(|d| unsafe { d.label() })
            .collect();
        assert_eq!(labels, vec!["amp_mono", "amp_stereo"]);
    }

    #[test]
    fn test_ladspa_record_ports() {
        let library = open(MockFixture::LadspaAmp);
        let table = DescriptorTable::resolve(library.as_ref(), PluginType::Ladspa).expect("resolve");
        let descriptor = unsafe { table.find(library.path(), "amp_mono") }.expect("find");
        let record = unsafe { descriptor.to_record("/plugins/amp.so") }.expect("record");

        assert_eq!(record.identifier.to_string(), "ladspa:/plugins/amp.so:amp_mono");
        assert_eq!(record.unique_id, UniqueId::Numeric(1048));
        assert_eq!(record.name, "Mono Amplifier");
        assert_eq!(record.parameter_count(), 1);
        assert_eq!(record.audio_input_count(), 1);
        assert_eq!(record.audio_output_count(), 1);
        assert_eq!(record.control_output_names(), vec!["Peak"]);

        let gain = &record.ports[0];
        assert_eq!(gain.name, "Gain");
        assert_eq!(gain.default_policy, DefaultPolicy::One);
        assert_eq!(gain.maximum(48000.0), 10.0);
        assert!(gain.hints.logarithmic);
    }

    #[test]
    fn test_vamp_record_parameters() {
        let library = open(MockFixture::VampOnsets);
        let table = DescriptorTable::resolve(library.as_ref(), PluginType::Vamp).expect("resolve");
        let descriptor = unsafe { table.find(library.path(), "onsetdetector") }.expect("find");
        let record = unsafe { descriptor.to_record("/plugins/onsets.so") }.expect("record");

        assert_eq!(record.unique_id, UniqueId::Text("onsetdetector".to_string()));
        assert_eq!(record.version, Some(2));
        assert_eq!(record.parameter_count(), 2);

        let sensitivity = &record.ports[0];
        assert_eq!(sensitivity.default_value(44100.0), 50.0);
        assert!(!sensitivity.hints.integer);

        let df_type = &record.ports[1];
        assert!(df_type.hints.integer);
        assert_eq!(df_type.quantization(44100.0), 1.0);
        assert_eq!(df_type.default_value(44100.0), 3.0);
    }

    #[test]
    fn test_find_unknown_label() {
        let library = open(MockFixture::VampOnsets);
        let table = DescriptorTable::resolve(library.as_ref(), PluginType::Vamp).expect("resolve");
        let err = unsafe { table.find(library.path(), "nope") }.expect_err("missing");
        assert!(matches!(err, PluginError::DescriptorNotFound { .. }));
    }

    #[test]
    fn test_resolve_missing_symbol() {
        let library = open(MockFixture::NoEntryPoint);
        let err = DescriptorTable::resolve(library.as_ref(), PluginType::Ladspa).expect_err("missing");
        assert!(matches!(err, PluginError::SymbolMissing { .. }));
    }
}
