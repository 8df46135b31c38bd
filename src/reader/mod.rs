//! Decoding containers into an [`Application`].
//!
//! The reader turns one or more inputs into program classes sharing one [`ItemFactory`]:
//!
//! - [`header`] - the fixed header and its field offsets
//! - [`sections`] - the section map
//! - [`parser`] - [`parser::DexParser`], the per-section decoder with its offset cache
//! - [`container`] - section discovery for multi-section containers
//!
//! [`ApplicationReader`] decodes its inputs in parallel with rayon. Decoded classes are appended
//! to a `boxcar::Vec` from the workers and sorted by type afterwards, when the
//! [`Application`] is built.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dexscope::{reader::{ApplicationReader, ProgramResource}, Options};
//! use std::path::Path;
//!
//! let options = Options::default();
//! let app = ApplicationReader::new(&options)
//!     .with_resource(ProgramResource::from_path(Path::new("classes.dex"))?)
//!     .read()?;
//! println!("{} classes", app.len());
//! # Ok::<(), dexscope::Error>(())
//! ```

pub mod container;
pub mod header;
pub mod parser;
pub mod sections;

use std::{path::Path, sync::Arc};

use rayon::prelude::*;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    file::File,
    model::{marker::Marker, Application, ItemFactory},
    Options, Result,
};

/// One input: a validated container and the name it is reported under.
#[derive(Debug)]
pub struct ProgramResource {
    file: File,
}

impl ProgramResource {
    /// An input held in memory.
    ///
    /// # Errors
    /// Returns an error if the data does not start with a supported magic.
    pub fn from_bytes(data: Vec<u8>, origin: impl Into<String>) -> Result<ProgramResource> {
        Ok(ProgramResource {
            file: File::from_mem_with_origin(data, origin)?,
        })
    }

    /// An input mapped from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or has no supported magic.
    pub fn from_path(path: &Path) -> Result<ProgramResource> {
        Ok(ProgramResource {
            file: File::from_file(path)?,
        })
    }

    /// Name used in diagnostics and on decoded classes.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.file.origin()
    }

    /// The raw bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.file.data()
    }
}

/// Reads a set of inputs into one [`Application`].
pub struct ApplicationReader<'a> {
    options: &'a Options,
    factory: Arc<ItemFactory>,
    resources: Vec<ProgramResource>,
    diagnostics: Arc<Diagnostics>,
}

impl<'a> ApplicationReader<'a> {
    /// Create a reader with a fresh item factory.
    #[must_use]
    pub fn new(options: &'a Options) -> ApplicationReader<'a> {
        ApplicationReader {
            options,
            factory: Arc::new(ItemFactory::new()),
            resources: Vec::new(),
            diagnostics: Arc::new(Diagnostics::new()),
        }
    }

    /// Intern into an existing factory, e.g. to merge with programmatically built classes.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<ItemFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Report into a shared diagnostics collection.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Add an input.
    #[must_use]
    pub fn with_resource(mut self, resource: ProgramResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// The diagnostics collected while reading.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Decode all inputs.
    ///
    /// # Errors
    /// Returns the first decoding error of any input, or [`crate::Error::DuplicateClass`] if
    /// two inputs define the same type.
    pub fn read(self) -> Result<Application> {
        let classes = boxcar::Vec::new();
        let markers: Vec<Vec<Marker>> = self
            .resources
            .par_iter()
            .map(|resource| {
                let contents = container::read_input(
                    resource.data(),
                    resource.origin(),
                    &self.factory,
                    self.options,
                )?;
                for class in contents.classes {
                    classes.push(Arc::new(class));
                }
                Ok(contents.markers)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut unique: Vec<Marker> = Vec::new();
        for marker in markers.into_iter().flatten() {
            if unique.contains(&marker) {
                self.diagnostics.warning(
                    DiagnosticCategory::Reader,
                    format!("Duplicate marker {marker}"),
                );
            } else {
                unique.push(marker);
            }
        }

        Application::new(self.factory, classes.into_iter().collect(), unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_magic() {
        let result = ProgramResource::from_bytes(b"dex\n099\0".to_vec(), "bad.dex");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_reader() {
        let options = Options::default();
        let app = ApplicationReader::new(&options).read().unwrap();
        assert!(app.is_empty());
    }
}
