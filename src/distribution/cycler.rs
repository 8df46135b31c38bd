//! Round-robin iteration over the files open for distribution.
//!
//! The cycler keeps a position in the cyclic order of the distribution files. One *round*
//! visits every file once, starting at the current position. [`VirtualFileCycler::restart`]
//! begins a new round at the current position, [`VirtualFileCycler::reset`] begins one at the
//! first file. New files get the next free id of the partition.

use crate::distribution::virtual_file::VirtualFile;

/// Cycles over a subset of a partition's files, identified by their index in the file list.
#[derive(Debug)]
pub struct VirtualFileCycler {
    for_distribution: Vec<usize>,
    position: usize,
    remaining: usize,
    next_id: usize,
    feature: Option<String>,
}

impl VirtualFileCycler {
    /// Create a cycler over `for_distribution`.
    ///
    /// # Arguments
    /// * `for_distribution` - Indices into the file list of the files that may receive classes
    /// * `next_id` - Id of the next file this cycler creates
    /// * `feature` - Feature split of the files this cycler creates
    #[must_use]
    pub fn new(
        for_distribution: Vec<usize>,
        next_id: usize,
        feature: Option<String>,
    ) -> VirtualFileCycler {
        let mut cycler = VirtualFileCycler {
            for_distribution,
            position: 0,
            remaining: 0,
            next_id,
            feature,
        };
        cycler.reset();
        cycler
    }

    /// Start a round at the first file.
    pub fn reset(&mut self) {
        self.position = 0;
        self.restart();
    }

    /// Start a round at the current file.
    pub fn restart(&mut self) {
        self.remaining = self.for_distribution.len();
    }

    /// Whether the current round has files left.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.remaining > 0
    }

    /// The next file of the current round.
    pub fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.for_distribution[self.position % self.for_distribution.len()];
        self.position += 1;
        self.remaining -= 1;
        Some(index)
    }

    /// Open a new file, add it to the distribution files and start a round at the first file.
    pub fn add_file(&mut self, files: &mut Vec<VirtualFile>) -> usize {
        let index = files.len();
        files.push(VirtualFile::new(self.next_id, self.feature.clone()));
        log::debug!("Opened file {} ({:?})", self.next_id, self.feature);
        self.next_id += 1;
        self.for_distribution.push(index);
        self.reset();
        index
    }

    /// Open a file if none is available for distribution.
    pub fn ensure_file(&mut self, files: &mut Vec<VirtualFile>) {
        if self.for_distribution.is_empty() {
            self.add_file(files);
        }
    }

    /// Stop distributing into any of the current files.
    pub fn clear_files_for_distribution(&mut self) {
        self.for_distribution.clear();
        self.reset();
    }

    /// Number of files open for distribution.
    #[must_use]
    pub fn len(&self) -> usize {
        self.for_distribution.len()
    }

    /// Whether no file is open for distribution.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.for_distribution.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds() {
        let mut files = vec![VirtualFile::new(0, None)];
        let mut cycler = VirtualFileCycler::new(vec![0], 1, None);

        assert_eq!(cycler.next(), Some(0));
        assert!(!cycler.has_next());
        assert_eq!(cycler.next(), None);

        assert_eq!(cycler.add_file(&mut files), 1);
        assert_eq!(files[1].id(), 1);
        assert_eq!(cycler.next(), Some(0));

        // A restart begins at the current position and visits every file once
        cycler.restart();
        assert_eq!(cycler.next(), Some(1));
        assert_eq!(cycler.next(), Some(0));
        assert!(!cycler.has_next());
    }

    #[test]
    fn test_ensure_and_clear() {
        let mut files = vec![VirtualFile::new(0, None)];
        let mut cycler = VirtualFileCycler::new(vec![0], 1, Some("feature".to_string()));
        cycler.clear_files_for_distribution();
        assert!(cycler.is_empty());

        cycler.ensure_file(&mut files);
        assert_eq!(cycler.len(), 1);
        assert_eq!(files[1].feature(), Some("feature"));
        assert_eq!(cycler.next(), Some(1));
    }
}
