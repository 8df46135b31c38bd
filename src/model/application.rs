//! A set of program classes ready for distribution and writing.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    model::{class::ClassRc, items::TypeRc, marker::Marker, ItemFactory},
    Error, Result,
};

/// Program classes sorted by type, the factory that interned their items, and the markers
/// found in the inputs.
pub struct Application {
    factory: Arc<ItemFactory>,
    classes: Vec<ClassRc>,
    by_type: HashMap<TypeRc, usize>,
    markers: Vec<Marker>,
}

impl Application {
    /// Create an application. Classes are sorted by type.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateClass`] if two classes define the same type.
    pub fn new(
        factory: Arc<ItemFactory>,
        mut classes: Vec<ClassRc>,
        markers: Vec<Marker>,
    ) -> Result<Application> {
        classes.sort_by(|a, b| a.ty.cmp(&b.ty));
        if let Some(pair) = classes.windows(2).find(|pair| pair[0].ty == pair[1].ty) {
            return Err(Error::DuplicateClass(pair[0].descriptor()));
        }

        let by_type = classes
            .iter()
            .enumerate()
            .map(|(index, class)| (class.ty.clone(), index))
            .collect();
        Ok(Application {
            factory,
            classes,
            by_type,
            markers,
        })
    }

    /// The item factory.
    #[must_use]
    pub fn factory(&self) -> &Arc<ItemFactory> {
        &self.factory
    }

    /// All classes, sorted by type.
    #[must_use]
    pub fn classes(&self) -> &[ClassRc] {
        &self.classes
    }

    /// The class defining `ty`.
    #[must_use]
    pub fn class(&self, ty: &TypeRc) -> Option<&ClassRc> {
        self.by_type.get(ty).map(|index| &self.classes[*index])
    }

    /// The class defining `descriptor`.
    #[must_use]
    pub fn class_by_descriptor(&self, descriptor: &str) -> Option<&ClassRc> {
        self.class(&self.factory.create_type(descriptor))
    }

    /// Tool markers read from the inputs.
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the application has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("classes", &self.classes.len())
            .field("markers", &self.markers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class::{AccessFlags, DexProgramClass};

    #[test]
    fn test_sorted_and_unique() {
        let factory = Arc::new(ItemFactory::new());
        let class = |descriptor: &str| {
            Arc::new(DexProgramClass::new(
                factory.create_type(descriptor),
                AccessFlags::PUBLIC,
                None,
            ))
        };

        let app = Application::new(
            factory.clone(),
            vec![class("Lb;"), class("La;")],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(app.classes()[0].descriptor(), "La;");
        assert!(app.class_by_descriptor("Lb;").is_some());
        assert!(app.class_by_descriptor("Lc;").is_none());

        let duplicate = Application::new(
            factory.clone(),
            vec![class("La;"), class("La;")],
            Vec::new(),
        );
        assert!(matches!(duplicate, Err(Error::DuplicateClass(d)) if d == "La;"));
    }
}
