//! Encoding an [`Application`] into output containers.
//!
//! # Architecture
//!
//! Writing runs as a pipeline over the files chosen by the distributor:
//!
//! 1. The tool markers become strings and the classes are distributed into [`VirtualFile`]s.
//!    With checksum encoding enabled, each file also receives a checksum marker string.
//! 2. For every file, in parallel, an [`ObjectToOffsetMapping`] freezes the index order. If the
//!    file has more strings than a 16-bit operand can address (or jumbo strings are forced),
//!    every code body that loads a string above the threshold is rewritten by the
//!    [`JumboStringRewriter`].
//! 3. Each file is serialized by a [`FileWriter`], in parallel. In container mode the files of
//!    one partition become the sections of a single container instead.
//! 4. The outputs are handed to the [`ProgramConsumer`] in file id order. Consumer failures are
//!    reported to the diagnostics and checked once all outputs were offered.
//!
//! # Key Components
//!
//! - [`buffer`] - growable little-endian output buffer
//! - [`mapping`] - frozen index tables of one file
//! - [`mixed`] - collection and offsets of the data section
//! - [`strategy`] - data section ordering
//! - [`layout`] - table placement and the map
//! - [`file_writer`] - serialization of one file
//! - [`integrity`] - signature and checksum
//! - [`container`] - multi-section containers
//! - [`consumer`] and [`output`] - delivery of the results
//!
//! # Examples
//!
//! ```rust,ignore
//! let consumer = InMemoryConsumer::new();
//! ApplicationWriter::new(&app, &options).write(&consumer)?;
//! for output in consumer.outputs() {
//!     println!("{}: {} bytes", output.file_name(), output.data.len());
//! }
//! ```

pub mod buffer;
pub mod consumer;
pub mod container;
pub mod file_writer;
pub mod integrity;
pub mod layout;
pub mod mapping;
pub mod mixed;
pub mod output;
pub mod strategy;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use rayon::prelude::*;

pub use consumer::{DexOutput, DirectoryConsumer, InMemoryConsumer, ProgramConsumer};
pub use file_writer::FileWriter;
pub use mapping::ObjectToOffsetMapping;
pub use strategy::{DefaultLayoutStrategy, MixedSectionLayoutStrategy, StartupLayoutStrategy};

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    distribution::{distribute, DistributionContext, VirtualFile},
    jumbo::JumboStringRewriter,
    model::{
        code::CodeRc,
        items::MethodRc,
        marker::encode_checksums,
        naming::{IdentityLens, NamingLens},
        string::StringRc,
        Application,
    },
    Options, Result,
};

/// A file with its frozen index order and rewritten code bodies.
struct PreparedFile<'f> {
    file: &'f VirtualFile,
    mapping: ObjectToOffsetMapping,
    rewritten: HashMap<MethodRc, CodeRc>,
}

/// Writes an application through a [`ProgramConsumer`].
pub struct ApplicationWriter<'a> {
    app: &'a Application,
    options: &'a Options,
    lens: &'a dyn NamingLens,
    diagnostics: Arc<Diagnostics>,
    strategy: Box<dyn MixedSectionLayoutStrategy>,
    code_to_keep: boxcar::Vec<MethodRc>,
}

impl<'a> ApplicationWriter<'a> {
    /// Create a writer with the identity naming lens.
    ///
    /// The startup layout strategy is selected when `options.startup_layout` is set.
    #[must_use]
    pub fn new(app: &'a Application, options: &'a Options) -> ApplicationWriter<'a> {
        let strategy: Box<dyn MixedSectionLayoutStrategy> = if options.startup_layout {
            Box::new(StartupLayoutStrategy::new(&options.startup_classes))
        } else {
            Box::new(DefaultLayoutStrategy)
        };
        ApplicationWriter {
            app,
            options,
            lens: &IdentityLens,
            diagnostics: Arc::new(Diagnostics::new()),
            strategy,
            code_to_keep: boxcar::Vec::new(),
        }
    }

    /// Rename items on output.
    #[must_use]
    pub fn with_lens(mut self, lens: &'a dyn NamingLens) -> Self {
        self.lens = lens;
        self
    }

    /// Report into a shared diagnostics collection.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Replace the data section layout strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn MixedSectionLayoutStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// The diagnostics of this writer.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Every method referenced by a written file, in the order the files were written.
    #[must_use]
    pub fn code_to_keep(&self) -> Vec<MethodRc> {
        self.code_to_keep
            .iter()
            .map(|(_, method)| method.clone())
            .collect()
    }

    /// Distribute, encode and deliver the application.
    ///
    /// # Errors
    /// Returns a capacity or capability error, the first encoding error of any file, the
    /// error of [`ProgramConsumer::finished`], or [`crate::Error::PendingErrors`] if errors
    /// were reported along the way.
    pub fn write(&self, consumer: &dyn ProgramConsumer) -> Result<()> {
        let factory = self.app.factory();
        let marker_strings: Vec<StringRc> = self
            .options
            .markers
            .iter()
            .map(|marker| factory.create_string(&marker.to_string()))
            .collect();

        let context =
            DistributionContext::new(self.app, self.options, self.lens, &self.diagnostics)
                .with_marker_strings(marker_strings);
        let mut files = distribute(context)?;

        if self.options.encode_checksums {
            for file in &mut files {
                let checksums: BTreeMap<String, u64> = file
                    .classes()
                    .iter()
                    .filter_map(|class| Some((class.descriptor(), class.checksum?)))
                    .collect();
                if !checksums.is_empty() {
                    let marker = factory.create_string(&encode_checksums(&checksums));
                    file.inject_string(&marker);
                }
            }
        }

        let outputs = if self.options.is_container_output() {
            self.write_containers(&files)?
        } else {
            self.write_files(&files)?
        };

        for output in &outputs {
            if let Err(error) = consumer.accept(output) {
                self.diagnostics.error(
                    DiagnosticCategory::Consumer,
                    format!("{}: {error}", output.file_name()),
                );
            }
        }
        consumer.finished()?;
        self.diagnostics.fail_if_pending_errors()
    }

    fn prepare<'f>(
        &self,
        file: &'f VirtualFile,
        strings: Option<&[StringRc]>,
    ) -> Result<PreparedFile<'f>> {
        let mapping = match strings {
            Some(strings) => {
                ObjectToOffsetMapping::with_strings(file.items(), self.lens, strings.to_vec())?
            }
            None => ObjectToOffsetMapping::new(file.items(), self.lens)?,
        };

        let mut rewritten = HashMap::new();
        let force = self.options.testing.force_jumbo_strings;
        if let Some(first_jumbo) = mapping.first_jumbo_string(force).cloned() {
            log::debug!(
                "File {} has {} strings, rewriting loads of {} and above",
                file.id(),
                mapping.strings().len(),
                first_jumbo
            );
            for class in file.classes() {
                for method in class.methods() {
                    let Some(code) = &method.code else {
                        continue;
                    };
                    if JumboStringRewriter::requires_rewrite(code, &first_jumbo) {
                        let code = JumboStringRewriter::new(code, &first_jumbo).rewrite()?;
                        rewritten.insert(method.method.clone(), Arc::new(code));
                    }
                }
            }
        }

        for method in mapping.methods() {
            self.code_to_keep.push(method.clone());
        }
        Ok(PreparedFile {
            file,
            mapping,
            rewritten,
        })
    }

    fn file_writer<'p>(&'p self, prepared: &'p PreparedFile<'_>) -> FileWriter<'p> {
        FileWriter::new(
            &prepared.mapping,
            self.lens,
            self.options,
            self.strategy.as_ref(),
            &self.diagnostics,
        )
        .with_rewritten_code(&prepared.rewritten)
    }

    fn write_files(&self, files: &[VirtualFile]) -> Result<Vec<DexOutput>> {
        files
            .par_iter()
            .map(|file| {
                let prepared = self.prepare(file, None)?;
                let data = self.file_writer(&prepared).write()?;
                log::debug!(
                    "Wrote file {} with {} classes: {} bytes",
                    file.id(),
                    file.classes().len(),
                    data.len()
                );
                Ok(DexOutput {
                    id: file.id(),
                    feature: file.feature().map(str::to_string),
                    primary_descriptor: file.primary_class_descriptor().map(str::to_string),
                    data,
                    descriptors: file.class_descriptors(),
                })
            })
            .collect()
    }

    fn write_containers(&self, files: &[VirtualFile]) -> Result<Vec<DexOutput>> {
        let mut partitions: Vec<(Option<&str>, Vec<&VirtualFile>)> = Vec::new();
        for file in files.iter().filter(|file| !file.is_empty()) {
            match partitions
                .iter_mut()
                .find(|(feature, _)| *feature == file.feature())
            {
                Some((_, members)) => members.push(file),
                None => partitions.push((file.feature(), vec![file])),
            }
        }

        partitions
            .into_iter()
            .map(|(feature, members)| {
                let strings = mapping::shared_strings(members.iter().map(|file| file.items()));
                let prepared = members
                    .par_iter()
                    .map(|file| self.prepare(file, Some(&strings)))
                    .collect::<Result<Vec<_>>>()?;
                let writers: Vec<FileWriter<'_>> = prepared
                    .iter()
                    .map(|prepared| self.file_writer(prepared))
                    .collect();
                let data = container::write_container(&writers)?;

                Ok(DexOutput {
                    id: 0,
                    feature: feature.map(str::to_string),
                    primary_descriptor: None,
                    data,
                    descriptors: prepared
                        .iter()
                        .flat_map(|prepared| prepared.file.class_descriptors())
                        .collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        class::{AccessFlags, DexProgramClass},
        ItemFactory,
    };

    fn app(descriptors: &[&str]) -> Application {
        let factory = Arc::new(ItemFactory::new());
        let object = factory.object_type();
        let classes = descriptors
            .iter()
            .map(|descriptor| {
                Arc::new(
                    DexProgramClass::new(
                        factory.create_type(descriptor),
                        AccessFlags::PUBLIC,
                        Some(object.clone()),
                    )
                    .with_checksum(0xabc),
                )
            })
            .collect();
        Application::new(factory, classes, Vec::new()).unwrap()
    }

    #[test]
    fn test_write_single_file() {
        let app = app(&["La/A;", "La/B;"]);
        let options = Options::default();
        let consumer = InMemoryConsumer::new();
        let writer = ApplicationWriter::new(&app, &options);
        writer.write(&consumer).unwrap();

        let outputs = consumer.outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(&outputs[0].data[..4], b"dex\n");
        assert_eq!(outputs[0].descriptors, ["La/A;", "La/B;"]);
        assert!(!writer.diagnostics().has_errors());
    }

    #[test]
    fn test_checksum_marker_is_written() {
        let app = app(&["La/A;"]);
        let options = Options::default().with_encode_checksums(true);
        let consumer = InMemoryConsumer::new();
        ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

        let data = &consumer.outputs()[0].data;
        let needle = b"~~~{\"La/A;\":\"abc\"}";
        assert!(data.windows(needle.len()).any(|window| window == needle));
    }

    struct FailingConsumer;

    impl ProgramConsumer for FailingConsumer {
        fn accept(&self, _output: &DexOutput) -> Result<()> {
            Err(crate::Error::Consumer("disk full".to_string()))
        }
    }

    #[test]
    fn test_consumer_failure_is_reported() {
        let app = app(&["La/A;"]);
        let options = Options::default();
        let writer = ApplicationWriter::new(&app, &options);
        assert!(matches!(
            writer.write(&FailingConsumer),
            Err(crate::Error::PendingErrors(1))
        ));
        assert_eq!(writer.diagnostics().error_count(), 1);
    }
}
