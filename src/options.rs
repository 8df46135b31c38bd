//! Configuration for reading, distributing and writing containers.
//!
//! [`Options`] bundles the target runtime capabilities (derived from the minimum API level),
//! the distribution switches (main-dex list, startup classes, feature splits, file-per-class
//! mode) and the writer switches (code canonicalization, container packing, checksum markers).
//! [`TestingOptions`] holds knobs that only make sense in tests, such as an artificially small
//! per-file class limit.
//!
//! # Examples
//!
//! ```rust
//! use dexscope::Options;
//!
//! let options = Options::default()
//!     .with_min_api_level(26)
//!     .with_main_dex_list(vec!["Lcom/example/App;".to_string()]);
//!
//! assert!(options.can_use_default_and_static_interface_methods());
//! assert!(!options.can_use_const_method_handle());
//! ```

use std::collections::HashMap;

use crate::{file::DexVersion, model::marker::Marker};

/// Maximum number of entries a single container can index in one table.
pub const MAX_ENTRIES: usize = u16::MAX as usize + 1;

/// Knobs used by tests to exercise limits without huge inputs.
#[derive(Debug, Clone, Default)]
pub struct TestingOptions {
    /// Treat a file as full once it holds more than this many classes
    pub limit_classes_per_file: Option<usize>,
    /// Run the jumbo string rewriter on every method even without jumbo strings
    pub force_jumbo_strings: bool,
    /// Replace the per-file method and field limit
    pub max_entries_override: Option<usize>,
}

/// Options that drive the whole pipeline.
#[derive(Debug, Clone)]
pub struct Options {
    /// Minimum API level of the runtime the output targets
    pub min_api_level: u32,
    /// Emit one container per input class
    pub dex_file_per_class: bool,
    /// In file-per-class mode, keep synthesized classes with their originating class
    pub combine_synthetic_classes_with_primary_class: bool,
    /// Keep the main-dex file limited to the main-dex list
    pub minimal_main_dex: bool,
    /// Keep the files holding startup classes limited to startup classes
    pub minimal_startup_dex: bool,
    /// Descriptors of classes that must be placed in the first file
    pub main_dex_list: Vec<String>,
    /// Descriptors of classes needed at startup, in priority order
    pub startup_classes: Vec<String>,
    /// Emit items of startup classes first in every mixed section
    pub startup_layout: bool,
    /// Maps a class descriptor to the feature split it belongs to
    pub feature_splits: HashMap<String, String>,
    /// Write structurally identical code bodies only once
    pub canonicalize_code: bool,
    /// Pack the files of the main partition into one multi-section container
    pub container_dex: bool,
    /// Emit the per-file checksum marker string
    pub encode_checksums: bool,
    /// Tool markers added to every output file
    pub markers: Vec<Marker>,
    /// Validate canonical table order when reading
    pub strict_checks: bool,
    /// Allow the reader to interpret debug info as pc-based
    pub allow_pc_based_debug_info: bool,
    /// Knobs for tests
    pub testing: TestingOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            min_api_level: 21,
            dex_file_per_class: false,
            combine_synthetic_classes_with_primary_class: false,
            minimal_main_dex: false,
            minimal_startup_dex: false,
            main_dex_list: Vec::new(),
            startup_classes: Vec::new(),
            startup_layout: false,
            feature_splits: HashMap::new(),
            canonicalize_code: false,
            container_dex: false,
            encode_checksums: false,
            markers: Vec::new(),
            strict_checks: true,
            allow_pc_based_debug_info: true,
            testing: TestingOptions::default(),
        }
    }
}

impl Options {
    /// Set the minimum API level.
    #[must_use]
    pub fn with_min_api_level(mut self, level: u32) -> Self {
        self.min_api_level = level;
        self
    }

    /// Enable one container per class.
    #[must_use]
    pub fn with_dex_file_per_class(mut self, combine_synthetics: bool) -> Self {
        self.dex_file_per_class = true;
        self.combine_synthetic_classes_with_primary_class = combine_synthetics;
        self
    }

    /// Set the main-dex list.
    #[must_use]
    pub fn with_main_dex_list(mut self, classes: Vec<String>) -> Self {
        self.main_dex_list = classes;
        self
    }

    /// Set the startup classes.
    #[must_use]
    pub fn with_startup_classes(mut self, classes: Vec<String>) -> Self {
        self.startup_classes = classes;
        self
    }

    /// Assign a class to a feature split.
    #[must_use]
    pub fn with_feature_split(
        mut self,
        descriptor: impl Into<String>,
        feature: impl Into<String>,
    ) -> Self {
        self.feature_splits.insert(descriptor.into(), feature.into());
        self
    }

    /// Enable or disable code canonicalization.
    #[must_use]
    pub fn with_canonicalize_code(mut self, enabled: bool) -> Self {
        self.canonicalize_code = enabled;
        self
    }

    /// Enable or disable multi-section container output.
    #[must_use]
    pub fn with_container_dex(mut self, enabled: bool) -> Self {
        self.container_dex = enabled;
        self
    }

    /// Enable or disable the checksum marker.
    #[must_use]
    pub fn with_encode_checksums(mut self, enabled: bool) -> Self {
        self.encode_checksums = enabled;
        self
    }

    /// Add a tool marker.
    #[must_use]
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Enable or disable strict reader checks.
    #[must_use]
    pub fn with_strict_checks(mut self, enabled: bool) -> Self {
        self.strict_checks = enabled;
        self
    }

    /// Replace the testing knobs.
    #[must_use]
    pub fn with_testing(mut self, testing: TestingOptions) -> Self {
        self.testing = testing;
        self
    }

    /// Interfaces may declare default and static methods.
    #[must_use]
    pub fn can_use_default_and_static_interface_methods(&self) -> bool {
        self.min_api_level >= 24
    }

    /// Interfaces may declare private methods.
    #[must_use]
    pub fn can_use_private_interface_methods(&self) -> bool {
        self.min_api_level >= 24
    }

    /// The runtime loads more than one container natively.
    #[must_use]
    pub fn can_use_multidex(&self) -> bool {
        self.min_api_level >= 21
    }

    /// The runtime understands const-method-handle and const-method-type.
    #[must_use]
    pub fn can_use_const_method_handle(&self) -> bool {
        self.min_api_level >= 28
    }

    /// The runtime understands multi-section containers.
    #[must_use]
    pub fn can_use_container_dex(&self) -> bool {
        self.min_api_level >= 36
    }

    /// Whether output is packed into a multi-section container.
    #[must_use]
    pub fn is_container_output(&self) -> bool {
        self.container_dex && self.can_use_container_dex() && !self.dex_file_per_class
    }

    /// The container version written for this configuration.
    #[must_use]
    pub fn dex_version(&self) -> DexVersion {
        if self.is_container_output() {
            return DexVersion::V41;
        }
        match self.min_api_level {
            0..=23 => DexVersion::V35,
            24..=25 => DexVersion::V37,
            26..=27 => DexVersion::V38,
            28..=34 => DexVersion::V39,
            _ => DexVersion::V40,
        }
    }

    /// The method and field limit per file.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.testing.max_entries_override.unwrap_or(MAX_ENTRIES)
    }

    /// Feature split of `descriptor`, if any.
    #[must_use]
    pub fn feature_of(&self, descriptor: &str) -> Option<&str> {
        self.feature_splits.get(descriptor).map(String::as_str)
    }
}
