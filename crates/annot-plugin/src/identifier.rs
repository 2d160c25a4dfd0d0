//! Plugin identifiers: `(type, library, label)` triples with a single-string
//! serialized form `type:library:label`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// The native plugin ABIs this host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Real-time effect plugins exporting `ladspa_descriptor`.
    Ladspa,
    /// Feature-extraction plugins exporting `vampGetPluginDescriptor`.
    Vamp,
}

impl PluginType {
    /// Every supported type, in scan order.
    pub const ALL: [PluginType; 2] = [PluginType::Ladspa, PluginType::Vamp];

    /// The type tag used in serialized identifiers.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ladspa => "ladspa",
            Self::Vamp => "vamp",
        }
    }

    /// The well-known symbol each library of this type must export.
    pub fn descriptor_symbol(&self) -> &'static str {
        match self {
            Self::Ladspa => crate::ffi::ladspa::DESCRIPTOR_SYMBOL,
            Self::Vamp => crate::ffi::vamp::DESCRIPTOR_SYMBOL,
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for PluginType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ladspa" => Ok(Self::Ladspa),
            "vamp" => Ok(Self::Vamp),
            other => Err(PluginError::InvalidIdentifier(format!(
                "unknown plugin type '{other}'"
            ))),
        }
    }
}

/// Names one plugin within the host. Equality is exact on all three parts.
///
/// Labels may not contain `:` since the serialized form ends at the last
/// colon. [`PluginIdentifier::try_new`] enforces this; [`PluginIdentifier::new`]
/// trusts its caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginIdentifier {
    plugin_type: PluginType,
    library: String,
    label: String,
}

impl PluginIdentifier {
    /// Builds an identifier from its parts.
    pub fn new(plugin_type: PluginType, library: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            plugin_type,
            library: library.into(),
            label: label.into(),
        }
    }

    /// Builds an identifier, rejecting labels that would not survive
    /// [`PluginIdentifier::parse`] of the serialized form.
    pub fn try_new(
        plugin_type: PluginType,
        library: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Self, PluginError> {
        let label = label.into();
        if label.is_empty() {
            return Err(PluginError::InvalidIdentifier("empty label".to_string()));
        }
        if label.contains(':') {
            return Err(PluginError::InvalidIdentifier(format!("label '{label}' contains ':'")));
        }
        Ok(Self::new(plugin_type, library, label))
    }

    /// The ABI of the plugin.
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// The library path or name as recorded at creation.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// The plugin's label within its library.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The library's file stem, used for location-independent matching.
    pub fn library_stem(&self) -> &str {
        library_stem(&self.library)
    }

    /// The same identifier with the library reduced to its file stem.
    ///
    /// Category files and saved sessions refer to plugins this way so they
    /// stay valid when libraries move between directories.
    pub fn canonical(&self) -> PluginIdentifier {
        PluginIdentifier::new(self.plugin_type, self.library_stem(), self.label.clone())
    }

    /// Parses `type:library:label`, splitting at the first and last colon so
    /// the library part may itself contain colons.
    pub fn parse(s: &str) -> Result<Self, PluginError> {
        let (tag, rest) = s
            .split_once(':')
            .ok_or_else(|| PluginError::InvalidIdentifier(format!("missing type in '{s}'")))?;
        let (library, label) = rest
            .rsplit_once(':')
            .ok_or_else(|| PluginError::InvalidIdentifier(format!("missing label in '{s}'")))?;

        if label.is_empty() {
            return Err(PluginError::InvalidIdentifier(format!("empty label in '{s}'")));
        }

        Ok(Self::new(tag.parse()?, library, label))
    }
}

impl fmt::Display for PluginIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.plugin_type, self.library, self.label)
    }
}

impl FromStr for PluginIdentifier {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PluginIdentifier {
    type Error = PluginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PluginIdentifier> for String {
    fn from(id: PluginIdentifier) -> Self {
        id.to_string()
    }
}

fn library_stem(library: &str) -> &str {
    // Split on both separators so Windows paths reduce correctly on Unix hosts.
    let file = library
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(library);
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = PluginIdentifier::new(PluginType::Vamp, "/usr/lib/vamp/qm.so", "tempo");
        assert_eq!(id.to_string(), "vamp:/usr/lib/vamp/qm.so:tempo");
        assert_eq!(PluginIdentifier::parse(&id.to_string()).expect("parse"), id);
    }

    #[test]
    fn test_windows_library_keeps_drive_colon() {
        let id = PluginIdentifier::parse(r"ladspa:C:\Plugins\amp.dll:amp_mono").expect("parse");
        assert_eq!(id.plugin_type(), PluginType::Ladspa);
        assert_eq!(id.library(), r"C:\Plugins\amp.dll");
        assert_eq!(id.label(), "amp_mono");
        assert_eq!(id.library_stem(), "amp");
    }

    #[test]
    fn test_canonical_strips_directory_and_extension() {
        let id = PluginIdentifier::new(PluginType::Vamp, "/usr/lib/vamp/qm-vamp-plugins.so", "onsets");
        assert_eq!(id.canonical().to_string(), "vamp:qm-vamp-plugins:onsets");
        assert_ne!(id, id.canonical());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(PluginIdentifier::parse("vamp").is_err());
        assert!(PluginIdentifier::parse("vamp:lib.so:").is_err());
        assert!(PluginIdentifier::parse("dssi:lib.so:x").is_err());
    }

    #[test]
    fn test_colon_in_label_rejected() {
        let err = PluginIdentifier::try_new(PluginType::Vamp, "/p/lib.so", "a:b").expect_err("colon");
        assert!(matches!(err, PluginError::InvalidIdentifier(_)));
        assert!(PluginIdentifier::try_new(PluginType::Vamp, "/p/lib.so", "").is_err());

        // Built unchecked, the label does not survive the text form.
        let unchecked = PluginIdentifier::new(PluginType::Vamp, "/p/lib.so", "a:b");
        let back = PluginIdentifier::parse(&unchecked.to_string()).expect("parse");
        assert_ne!(back, unchecked);
        assert_eq!(back.label(), "b");

        let ok = PluginIdentifier::try_new(PluginType::Vamp, "C:/p/lib.so", "onsets").expect("valid");
        assert_eq!(PluginIdentifier::parse(&ok.to_string()).expect("parse"), ok);
    }

    #[test]
    fn test_serde_as_string() {
        let id = PluginIdentifier::new(PluginType::Ladspa, "amp", "amp_mono");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"ladspa:amp:amp_mono\"");
        let back: PluginIdentifier = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
