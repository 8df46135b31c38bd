//! Package-locality driven filling of files.
//!
//! Classes are sorted by their original dotted name, so classes of one package are adjacent.
//! A run of classes sharing a package prefix is added to the current file as one transaction.
//! When the run does not fit, the populator first narrows the prefix (a longer prefix splits
//! the run into smaller groups), and only when the run is already small compared to the file,
//! or the prefix cannot grow further, moves on to the next file of the cycle, opening a new
//! file once every file has been tried. This leaves some room in each file, so that growth of
//! a package in a later build tends to stay within its file.
//!
//! Startup classes are placed first, as one transaction if possible. Classes without a package
//! and runs that do not fit even an empty file are placed last, one by one, in the first file
//! with room.

use std::{cmp::Ordering, collections::HashSet};

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    distribution::{cycler::VirtualFileCycler, virtual_file::VirtualFile},
    model::{class::ClassRc, naming::NamingLens},
    Error, Options, Result,
};

/// Segments of the first prefix tried, e.g. `com.company.product`.
const MINIMUM_PREFIX_LENGTH: usize = 4;
const MAXIMUM_PREFIX_LENGTH: usize = 7;
/// A rolled back run larger than 1/MIN_FILL_FACTOR of the file narrows the prefix instead of
/// moving on.
const MIN_FILL_FACTOR: usize = 5;

fn original_name(class: &ClassRc) -> String {
    class.ty.java_name()
}

/// Empty package first, then by package, then by full name.
fn compare_by_package(a: &str, b: &str) -> Ordering {
    match (a.rfind('.'), b.rfind('.')) {
        (None, None) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(index_a), Some(index_b)) => a[..index_a]
            .cmp(&b[..index_b])
            .then_with(|| a.cmp(b)),
    }
}

/// Whether `name` belongs to the group described by `prefix`.
///
/// A prefix ending in `.*` covers sub-packages, any other prefix covers exactly one package.
fn covered_by_prefix(name: &str, prefix: Option<&str>) -> bool {
    match prefix {
        None => false,
        Some(prefix) => match prefix.strip_suffix(".*") {
            Some(package) => name.starts_with(package),
            None => name.starts_with(prefix) && name.rfind('.') == Some(prefix.len()),
        },
    }
}

/// The first `prefix_length` segments of the package of `class_name`.
///
/// With `add_star`, a prefix that used all requested segments gets a `.*` suffix.
fn extract_prefix_token(prefix_length: usize, class_name: &str, add_star: bool) -> String {
    let mut index = 0usize;
    let mut last_index = Some(0usize);
    let mut segment_count = 0usize;
    while let Some(last) = last_index {
        segment_count += 1;
        if segment_count > prefix_length {
            break;
        }
        index = last;
        last_index = class_name
            .get(index + 1..)
            .and_then(|rest| rest.find('.'))
            .map(|found| found + index + 1);
    }

    let mut prefix = class_name[..index].to_string();
    if add_star && segment_count >= prefix_length {
        prefix.push_str(".*");
    }
    prefix
}

/// Distributes classes over the files of one partition in package order.
pub struct PackageSplitPopulator<'a> {
    startup_classes: Vec<(String, ClassRc)>,
    non_startup_classes: Vec<(String, ClassRc)>,
    cycler: VirtualFileCycler,
    options: &'a Options,
    lens: &'a dyn NamingLens,
    diagnostics: &'a Diagnostics,
}

impl<'a> PackageSplitPopulator<'a> {
    /// Create a populator.
    ///
    /// # Arguments
    /// * `classes` - Classes to place
    /// * `cycler` - The distribution files of the partition
    /// * `options` - Startup classes, limits and testing knobs
    /// * `lens` - Output naming
    /// * `diagnostics` - Receives the startup overflow warning
    pub fn new(
        classes: impl IntoIterator<Item = ClassRc>,
        cycler: VirtualFileCycler,
        options: &'a Options,
        lens: &'a dyn NamingLens,
        diagnostics: &'a Diagnostics,
    ) -> PackageSplitPopulator<'a> {
        let startup: HashSet<&str> = options.startup_classes.iter().map(String::as_str).collect();
        let (mut startup_classes, mut non_startup_classes): (Vec<_>, Vec<_>) = classes
            .into_iter()
            .map(|class| (original_name(&class), class))
            .partition(|(_, class)| startup.contains(class.descriptor().as_str()));
        startup_classes.sort_by(|a, b| compare_by_package(&a.0, &b.0));
        non_startup_classes.sort_by(|a, b| compare_by_package(&a.0, &b.0));

        PackageSplitPopulator {
            startup_classes,
            non_startup_classes,
            cycler,
            options,
            lens,
            diagnostics,
        }
    }

    /// Place every class into `files`, opening new files as needed.
    ///
    /// # Errors
    /// Returns [`Error::ClassTooLarge`] if a class does not fit into an empty file.
    pub fn run(mut self, files: &mut Vec<VirtualFile>) -> Result<()> {
        self.add_startup_classes(files)?;
        let non_package_classes = self.add_non_startup_classes(files)?;
        self.add_non_package_classes(files, &non_package_classes)
    }

    fn is_full_enough(&self, file: &VirtualFile) -> bool {
        if let Some(limit) = self.options.testing.limit_classes_per_file {
            if file.number_of_classes() > limit {
                return true;
            }
        }
        file.is_full(self.options.max_entries())
    }

    fn next_file(&mut self) -> Result<usize> {
        self.cycler
            .next()
            .ok_or_else(|| Error::Error("No file available for distribution".to_string()))
    }

    fn add_startup_classes(&mut self, files: &mut Vec<VirtualFile>) -> Result<()> {
        if self.startup_classes.is_empty() {
            return Ok(());
        }

        self.cycler.ensure_file(files);
        let mut current = self.next_file()?;
        for (_, class) in &self.startup_classes {
            files[current].add_class(class, self.lens);
        }

        if self.is_full_enough(&files[current]) {
            files[current].abort();
            for (_, class) in &self.startup_classes {
                files[current].add_class(class, self.lens);
                if self.is_full_enough(&files[current]) {
                    files[current].abort();
                    current = self.cycler.add_file(files);
                    files[current].add_class(class, self.lens);
                }
                files[current].commit();
            }
            self.diagnostics.warning(
                DiagnosticCategory::Startup,
                format!(
                    "Startup classes do not fit into one file and span {} files",
                    self.cycler.len()
                ),
            );
        } else {
            files[current].commit();
        }

        log::debug!("Placed {} startup classes", self.startup_classes.len());
        if self.options.minimal_startup_dex {
            self.cycler.clear_files_for_distribution();
        } else {
            self.cycler.restart();
        }
        Ok(())
    }

    fn add_non_startup_classes(&mut self, files: &mut Vec<VirtualFile>) -> Result<Vec<ClassRc>> {
        let classes = std::mem::take(&mut self.non_startup_classes);
        let mut non_package_classes = Vec::new();

        let mut prefix_length = MINIMUM_PREFIX_LENGTH;
        let mut transaction_start = 0usize;
        let mut current_prefix: Option<String> = None;
        self.cycler.ensure_file(files);
        let mut current = self.next_file()?;

        let mut class_index = 0usize;
        while class_index < classes.len() {
            let (name, class) = &classes[class_index];
            if !covered_by_prefix(name, current_prefix.as_deref()) {
                if let Some(prefix) = &current_prefix {
                    files[current].commit();
                    log::debug!("Committed package {} to file {}", prefix, files[current].id());
                    self.cycler.restart();
                    // Only a successful commit lets the prefix shrink again.
                    prefix_length = MINIMUM_PREFIX_LENGTH - 1;
                }

                // Never pick a prefix of the previous prefix, the groups would overlap.
                let new_prefix = loop {
                    prefix_length += 1;
                    let candidate = extract_prefix_token(prefix_length, name, false);
                    match &current_prefix {
                        Some(previous) if !candidate.is_empty() && previous.starts_with(&candidate) => {}
                        _ => break candidate,
                    }
                };
                if !new_prefix.is_empty() {
                    current_prefix = Some(extract_prefix_token(prefix_length, name, true));
                }
                transaction_start = class_index;
            }

            if current_prefix.is_none() {
                non_package_classes.push(class.clone());
                class_index += 1;
                continue;
            }

            files[current].add_class(class, self.lens);
            if !self.is_full_enough(&files[current]) {
                class_index += 1;
                continue;
            }

            let classes_in_transaction = class_index - transaction_start + 1;
            let classes_in_file = files[current].number_of_classes();
            files[current].abort();

            if classes_in_transaction > classes_in_file / MIN_FILL_FACTOR
                && prefix_length < MAXIMUM_PREFIX_LENGTH
            {
                log::debug!(
                    "Narrowing prefix to {} segments at {}",
                    prefix_length + 1,
                    name
                );
                class_index = transaction_start;
                current_prefix = None;
                prefix_length += 1;
                continue;
            }

            if !self.cycler.has_next() {
                if files[current].is_empty() {
                    // The run does not fit an empty file, place it class by class at the end.
                    non_package_classes.extend(
                        classes[transaction_start..=class_index]
                            .iter()
                            .map(|(_, class)| class.clone()),
                    );
                    transaction_start = class_index + 1;
                }
                self.cycler.add_file(files);
            }

            class_index = transaction_start;
            current = self.next_file()?;
            current_prefix = None;
            prefix_length = MINIMUM_PREFIX_LENGTH;
        }

        files[current].commit();
        Ok(non_package_classes)
    }

    fn add_non_package_classes(
        &mut self,
        files: &mut Vec<VirtualFile>,
        classes: &[ClassRc],
    ) -> Result<()> {
        if classes.is_empty() {
            return Ok(());
        }

        let max_entries = self.options.max_entries();
        self.cycler.restart();
        let mut current = self.next_file()?;
        for class in classes {
            if self.is_full_enough(&files[current]) {
                current = self.available_file(files);
            }
            loop {
                let was_empty = files[current].is_empty();
                files[current].add_class(class, self.lens);
                if !self.is_full_enough(&files[current]) {
                    break;
                }
                if was_empty {
                    if files[current].is_full(max_entries) {
                        return Err(Error::ClassTooLarge(class.descriptor()));
                    }
                    break;
                }
                files[current].abort();
                current = self.available_file(files);
            }
            files[current].commit();
        }
        Ok(())
    }

    fn available_file(&mut self, files: &mut Vec<VirtualFile>) -> usize {
        while let Some(candidate) = self.cycler.next() {
            if !self.is_full_enough(&files[candidate]) {
                return candidate;
            }
        }
        self.cycler.add_file(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefix_token() {
        assert_eq!(extract_prefix_token(5, "a.b.c.C0", false), "a.b.c");
        assert_eq!(extract_prefix_token(5, "a.b.c.C0", true), "a.b.c");
        assert_eq!(extract_prefix_token(4, "a.b.d.D0", true), "a.b.d.*");
        assert_eq!(extract_prefix_token(2, "com.example.app.Main", true), "com.*");
        assert_eq!(extract_prefix_token(5, "Main", false), "");
    }

    #[test]
    fn test_covered_by_prefix() {
        assert!(covered_by_prefix("a.b.c.C0", Some("a.b.c")));
        assert!(!covered_by_prefix("a.b.c.d.C0", Some("a.b.c")));
        assert!(covered_by_prefix("a.b.c.d.C0", Some("a.b.*")));
        assert!(!covered_by_prefix("a.b.c.C0", None));
    }

    #[test]
    fn test_package_order() {
        let mut names = vec!["b.A", "Main", "a.b.Z", "a.C", "a.b.A"];
        names.sort_by(|a, b| compare_by_package(a, b));
        assert_eq!(names, vec!["Main", "a.C", "a.b.A", "a.b.Z", "b.A"]);
    }
}
