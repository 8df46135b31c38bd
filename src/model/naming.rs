//! Renaming lookups applied when writing.
//!
//! A [`NamingLens`] maps types, fields and methods to the names they get in the output. The
//! model keeps the original names; only the writer looks through the lens, when it computes the
//! string closure, emits id tables and sorts them.

use std::{collections::HashMap, sync::Arc};

use crate::model::{
    items::{FieldRc, MethodRc, TypeRc},
    string::StringRc,
    ItemFactory,
};

/// Renamed descriptor and member names.
pub trait NamingLens: Send + Sync {
    /// The output descriptor of `ty`.
    fn lookup_descriptor(&self, ty: &TypeRc) -> StringRc;
    /// The output name of `field`.
    fn lookup_field_name(&self, field: &FieldRc) -> StringRc;
    /// The output name of `method`.
    fn lookup_method_name(&self, method: &MethodRc) -> StringRc;

    /// Whether every lookup returns the original name.
    fn is_identity(&self) -> bool {
        false
    }
}

/// The lens that renames nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLens;

impl NamingLens for IdentityLens {
    fn lookup_descriptor(&self, ty: &TypeRc) -> StringRc {
        ty.descriptor.clone()
    }

    fn lookup_field_name(&self, field: &FieldRc) -> StringRc {
        field.name.clone()
    }

    fn lookup_method_name(&self, method: &MethodRc) -> StringRc {
        method.name.clone()
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// A lens backed by explicit rename tables. Unmapped items keep their names.
///
/// Renaming a class also renames the class part of array descriptors over it.
#[derive(Default)]
pub struct MapLens {
    factory: Arc<ItemFactory>,
    types: HashMap<TypeRc, StringRc>,
    fields: HashMap<FieldRc, StringRc>,
    methods: HashMap<MethodRc, StringRc>,
}

impl MapLens {
    /// An empty lens creating renamed strings through `factory`.
    #[must_use]
    pub fn new(factory: Arc<ItemFactory>) -> MapLens {
        MapLens {
            factory,
            ..MapLens::default()
        }
    }

    /// Rename a class type.
    #[must_use]
    pub fn rename_type(mut self, ty: &TypeRc, descriptor: &str) -> MapLens {
        let renamed = self.factory.create_string(descriptor);
        self.types.insert(ty.clone(), renamed);
        self
    }

    /// Rename a field.
    #[must_use]
    pub fn rename_field(mut self, field: &FieldRc, name: &str) -> MapLens {
        let renamed = self.factory.create_string(name);
        self.fields.insert(field.clone(), renamed);
        self
    }

    /// Rename a method.
    #[must_use]
    pub fn rename_method(mut self, method: &MethodRc, name: &str) -> MapLens {
        let renamed = self.factory.create_string(name);
        self.methods.insert(method.clone(), renamed);
        self
    }
}

impl NamingLens for MapLens {
    fn lookup_descriptor(&self, ty: &TypeRc) -> StringRc {
        if let Some(renamed) = self.types.get(ty) {
            return renamed.clone();
        }
        let descriptor = ty.descriptor_str();
        let dimensions = descriptor.bytes().take_while(|b| *b == b'[').count();
        if dimensions > 0 {
            let element = self.factory.create_type(&descriptor[dimensions..]);
            if let Some(renamed) = self.types.get(&element) {
                let renamed = format!("{}{}", "[".repeat(dimensions), renamed);
                return self.factory.create_string(&renamed);
            }
        }
        ty.descriptor.clone()
    }

    fn lookup_field_name(&self, field: &FieldRc) -> StringRc {
        self.fields
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.name.clone())
    }

    fn lookup_method_name(&self, method: &MethodRc) -> StringRc {
        self.methods
            .get(method)
            .cloned()
            .unwrap_or_else(|| method.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lens() {
        let factory = Arc::new(ItemFactory::new());
        let foo = factory.create_type("Lcom/example/Foo;");
        let array = factory.create_type("[[Lcom/example/Foo;");
        let int = factory.create_type("I");
        let field = factory.create_field(&foo, &int, "count");

        let lens = MapLens::new(factory.clone())
            .rename_type(&foo, "La;")
            .rename_field(&field, "b");

        assert_eq!(lens.lookup_descriptor(&foo).to_string_lossy(), "La;");
        assert_eq!(lens.lookup_descriptor(&array).to_string_lossy(), "[[La;");
        assert_eq!(lens.lookup_descriptor(&int).to_string_lossy(), "I");
        assert_eq!(lens.lookup_field_name(&field).to_string_lossy(), "b");
        assert!(!lens.is_identity());
        assert!(IdentityLens.is_identity());
    }
}
