//! Memory-mapped output files.
//!
//! [`Output`] creates a file of a known size at its final path, maps it and lets the writer copy
//! a finished container into it. Until [`Output::finalize`] has flushed the mapping, the file
//! counts as incomplete: dropping an unfinalized output removes it, so an interrupted write
//! never leaves a truncated container behind.
//!
//! # Examples
//!
//! ```rust,ignore
//! let mut output = Output::create("out/classes.dex", bytes.len() as u64)?;
//! output.write_at(0, &bytes)?;
//! output.finalize()?;
//! ```

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A memory-mapped output file that is removed unless finalized.
pub struct Output {
    mmap: MmapMut,
    target_path: PathBuf,
    finalized: bool,
}

impl Output {
    /// Create `target_path` with `size` bytes and map it.
    ///
    /// # Errors
    /// Returns [`Error::WriteMmapFailed`] if the file cannot be created, sized or mapped.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Output> {
        let target_path = target_path.as_ref().to_path_buf();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)
            .map_err(|e| Error::WriteMmapFailed {
                message: format!("Failed to create {}: {e}", target_path.display()),
            })?;

        file.set_len(size).map_err(|e| Error::WriteMmapFailed {
            message: format!("Failed to set file size: {e}"),
        })?;

        // The file was created above and is not shared with anything else.
        let mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|e| Error::WriteMmapFailed {
                    message: format!("Failed to create memory mapping: {e}"),
                })?
        };

        Ok(Output {
            mmap,
            target_path,
            finalized: false,
        })
    }

    /// Copy `data` into the file at `offset`.
    ///
    /// # Errors
    /// Returns [`Error::WriteMmapFailed`] if the write would exceed the file size.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.mmap.len() {
            return Err(Error::WriteMmapFailed {
                message: format!(
                    "Write would exceed file size: offset={}, len={}, file_size={}",
                    offset,
                    data.len(),
                    self.mmap.len()
                ),
            });
        }

        self.mmap[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Where the file is written.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Flush the mapping and keep the file.
    ///
    /// # Errors
    /// Returns [`Error::WriteFinalizationFailed`] if the flush fails. The file is removed in
    /// that case.
    pub fn finalize(mut self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| Error::WriteFinalizationFailed {
                message: format!("Failed to flush {}: {e}", self.target_path.display()),
            })?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_finalized_file_is_kept() {
        let temp_dir = tempdir().unwrap();
        let target_path = temp_dir.path().join("classes.dex");

        let mut output = Output::create(&target_path, 8).unwrap();
        assert_eq!(output.size(), 8);
        output.write_at(0, b"dex\n041\0").unwrap();
        output.finalize().unwrap();

        assert_eq!(std::fs::read(&target_path).unwrap(), b"dex\n041\0");
    }

    #[test]
    fn test_unfinalized_file_is_removed() {
        let temp_dir = tempdir().unwrap();
        let target_path = temp_dir.path().join("classes2.dex");

        {
            let mut output = Output::create(&target_path, 4).unwrap();
            output.write_at(0, b"dex\n").unwrap();
            assert!(target_path.exists());
        }
        assert!(!target_path.exists());
    }

    #[test]
    fn test_bounds_checking() {
        let temp_dir = tempdir().unwrap();
        let mut output = Output::create(temp_dir.path().join("x.dex"), 10).unwrap();
        assert!(output.write_at(8, b"too long").is_err());
        assert_eq!(output.target_path().file_name().unwrap(), "x.dex");
    }
}
