//! # annot-plugin
//!
//! Native plugin hosting for the LADSPA and Vamp ABIs. Provides:
//!
//! - Search-path resolution and candidate discovery
//! - Loadability pre-validation, in process or via a checker subprocess
//! - Descriptor enumeration into owned records
//! - Instantiation with shared, reference-counted library handles
//! - Category lookup from a semantic index or `.cat` files

pub mod descriptor;
pub mod enumerate;
pub mod error;
pub mod factory;
pub mod ffi;
pub mod host;
pub mod identifier;
pub mod instance;
pub mod loader;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod scan;
pub mod table;
pub mod taxonomy;

pub use descriptor::{DefaultPolicy, PluginDescriptorRecord, PortDescriptor, UniqueId};
pub use error::PluginError;
pub use factory::PluginFactory;
pub use host::{PluginHost, ScanState};
pub use identifier::{PluginIdentifier, PluginType};
pub use instance::PluginInstance;
pub use loader::{Library, LibraryLoader, NativeLoader};
pub use scan::{LoadStatus, ScanFailure, ScanReport, Scanner};
pub use taxonomy::{SemanticIndex, TaxonomyResolver};
