//! Receivers of finished output files.
//!
//! The [`crate::writer::ApplicationWriter`] hands every finished file to a [`ProgramConsumer`],
//! in file id order and partition by partition. Two consumers are provided:
//!
//! - [`InMemoryConsumer`] keeps the outputs, mostly for tests and tools that post-process them
//! - [`DirectoryConsumer`] writes `classes.dex`, `classes2.dex`, ... into a directory, feature
//!   split files into a subdirectory named after the feature, and per-class outputs into a
//!   path derived from the class descriptor

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{writer::output::Output, Error, Result};

/// One finished output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexOutput {
    /// File id within its partition
    pub id: usize,
    /// Feature split, `None` for the base partition
    pub feature: Option<String>,
    /// The class a per-class file was created for
    pub primary_descriptor: Option<String>,
    /// File contents
    pub data: Vec<u8>,
    /// Descriptors of the classes in the file
    pub descriptors: Vec<String>,
}

impl DexOutput {
    /// The conventional file name for this output: `classes.dex` for the first file,
    /// `classesN.dex` for the N-th.
    #[must_use]
    pub fn file_name(&self) -> String {
        if self.id == 0 {
            "classes.dex".to_string()
        } else {
            format!("classes{}.dex", self.id + 1)
        }
    }

    /// Path of the output relative to an output directory.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if let Some(feature) = &self.feature {
            path.push(feature);
        }
        match &self.primary_descriptor {
            Some(descriptor) => {
                let name = descriptor
                    .strip_prefix('L')
                    .and_then(|name| name.strip_suffix(';'))
                    .unwrap_or(descriptor);
                path.push(format!("{name}.dex"));
            }
            None => path.push(self.file_name()),
        }
        path
    }
}

/// Receives the files produced by a write.
pub trait ProgramConsumer: Send + Sync {
    /// Accept one finished file.
    ///
    /// # Errors
    /// Returns an error if the output cannot be stored. The writer reports it and continues
    /// with the next file.
    fn accept(&self, output: &DexOutput) -> Result<()>;

    /// Called once after all files were accepted.
    ///
    /// # Errors
    /// Returns an error if the consumer cannot complete.
    fn finished(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every output in memory.
#[derive(Debug, Default)]
pub struct InMemoryConsumer {
    outputs: Mutex<Vec<DexOutput>>,
}

impl InMemoryConsumer {
    /// An empty consumer.
    #[must_use]
    pub fn new() -> InMemoryConsumer {
        InMemoryConsumer::default()
    }

    /// The accepted outputs, in acceptance order.
    #[must_use]
    pub fn outputs(&self) -> Vec<DexOutput> {
        lock!(self.outputs).clone()
    }

    /// The accepted outputs of the base partition.
    #[must_use]
    pub fn base_outputs(&self) -> Vec<DexOutput> {
        lock!(self.outputs)
            .iter()
            .filter(|output| output.feature.is_none())
            .cloned()
            .collect()
    }
}

impl ProgramConsumer for InMemoryConsumer {
    fn accept(&self, output: &DexOutput) -> Result<()> {
        lock!(self.outputs).push(output.clone());
        Ok(())
    }
}

/// Writes outputs into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryConsumer {
    root: PathBuf,
}

impl DirectoryConsumer {
    /// A consumer writing below `root`. The directory is created on demand.
    pub fn new<P: AsRef<Path>>(root: P) -> DirectoryConsumer {
        DirectoryConsumer {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProgramConsumer for DirectoryConsumer {
    fn accept(&self, output: &DexOutput) -> Result<()> {
        let path = self.root.join(output.relative_path());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Consumer(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut file = Output::create(&path, output.data.len() as u64)?;
        file.write_at(0, &output.data)?;
        file.finalize()?;
        log::debug!("Wrote {} ({} bytes)", path.display(), output.data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn output(id: usize, feature: Option<&str>, primary: Option<&str>) -> DexOutput {
        DexOutput {
            id,
            feature: feature.map(str::to_string),
            primary_descriptor: primary.map(str::to_string),
            data: vec![1, 2, 3],
            descriptors: Vec::new(),
        }
    }

    #[test]
    fn test_relative_paths() {
        assert_eq!(output(0, None, None).relative_path(), PathBuf::from("classes.dex"));
        assert_eq!(output(1, None, None).relative_path(), PathBuf::from("classes2.dex"));
        assert_eq!(
            output(0, Some("camera"), None).relative_path(),
            PathBuf::from("camera/classes.dex")
        );
        assert_eq!(
            output(3, None, Some("Lcom/example/Main;")).relative_path(),
            PathBuf::from("com/example/Main.dex")
        );
    }

    #[test]
    fn test_directory_consumer() {
        let temp_dir = tempdir().unwrap();
        let consumer = DirectoryConsumer::new(temp_dir.path());
        consumer.accept(&output(1, Some("camera"), None)).unwrap();
        consumer.finished().unwrap();

        let written = std::fs::read(temp_dir.path().join("camera/classes2.dex")).unwrap();
        assert_eq!(written, [1, 2, 3]);
    }

    #[test]
    fn test_in_memory_consumer() {
        let consumer = InMemoryConsumer::new();
        consumer.accept(&output(0, None, None)).unwrap();
        consumer.accept(&output(0, Some("camera"), None)).unwrap();
        assert_eq!(consumer.outputs().len(), 2);
        assert_eq!(consumer.base_outputs().len(), 1);
    }
}
