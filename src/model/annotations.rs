//! Annotations, annotation sets and parameter annotation lists.

use std::sync::Arc;

use strum::Display;

use crate::model::values::EncodedAnnotation;

/// Retention of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[repr(u8)]
pub enum AnnotationVisibility {
    /// Visible at build time only
    Build = 0x00,
    /// Visible at runtime
    Runtime = 0x01,
    /// Visible to the runtime system only
    System = 0x02,
}

impl AnnotationVisibility {
    /// Decode the stored visibility byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<AnnotationVisibility> {
        match value {
            0x00 => Some(AnnotationVisibility::Build),
            0x01 => Some(AnnotationVisibility::Runtime),
            0x02 => Some(AnnotationVisibility::System),
            _ => None,
        }
    }
}

/// An annotation together with its visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexAnnotation {
    /// Retention
    pub visibility: AnnotationVisibility,
    /// Type and elements
    pub annotation: EncodedAnnotation,
}

/// A set of annotations attached to one class, member or parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationSet {
    /// The annotations, sorted by type when written
    pub annotations: Vec<Arc<DexAnnotation>>,
}

impl AnnotationSet {
    /// Create a set.
    #[must_use]
    pub fn new(annotations: Vec<Arc<DexAnnotation>>) -> AnnotationSet {
        AnnotationSet { annotations }
    }

    /// Whether the set holds no annotation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// The annotations sorted by annotation type.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Arc<DexAnnotation>> {
        let mut sorted: Vec<&Arc<DexAnnotation>> = self.annotations.iter().collect();
        sorted.sort_by(|a, b| a.annotation.ty.cmp(&b.annotation.ty));
        sorted
    }
}

/// Per-parameter annotation sets of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterAnnotations {
    /// One set per parameter, possibly empty
    pub sets: Vec<Arc<AnnotationSet>>,
}

impl ParameterAnnotations {
    /// Whether no parameter carries an annotation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|set| set.is_empty())
    }
}
