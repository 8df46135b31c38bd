//! Interning of indexable items.
//!
//! [`ItemFactory`] hands out one shared allocation per distinct item value. Creating an item
//! that is equal to an existing one returns the existing allocation, so identity and equality
//! coincide for everything created through the same factory. Items are never removed; pruning
//! happens by leaving items out of an output file's closure.
//!
//! The interning maps are [`DashMap`]s, so parallel readers can share one factory.

use std::{hash::Hash, sync::Arc};

use dashmap::DashMap;

use crate::model::{
    items::{
        CallSiteRc, DexCallSite, DexField, DexMethod, DexMethodHandle, DexProto, DexType,
        FieldRc, MethodHandleKind, MethodHandleMember, MethodHandleRc, MethodRc, ProtoRc, TypeRc,
    },
    string::{DexString, StringRc},
    values::EncodedValue,
};

fn intern<T>(map: &DashMap<T, Arc<T>>, value: T) -> Arc<T>
where
    T: Eq + Hash + Clone,
{
    if let Some(existing) = map.get(&value) {
        return existing.clone();
    }
    map.entry(value.clone())
        .or_insert_with(|| Arc::new(value))
        .clone()
}

/// Deduplicating factory for all indexable items.
#[derive(Default)]
pub struct ItemFactory {
    strings: DashMap<DexString, StringRc>,
    types: DashMap<DexType, TypeRc>,
    protos: DashMap<DexProto, ProtoRc>,
    fields: DashMap<DexField, FieldRc>,
    methods: DashMap<DexMethod, MethodRc>,
    method_handles: DashMap<DexMethodHandle, MethodHandleRc>,
    call_sites: DashMap<DexCallSite, CallSiteRc>,
}

impl ItemFactory {
    /// Create an empty factory.
    #[must_use]
    pub fn new() -> ItemFactory {
        ItemFactory::default()
    }

    /// Intern a string given as Rust text.
    pub fn create_string(&self, value: &str) -> StringRc {
        intern(&self.strings, DexString::new(value))
    }

    /// Intern an already encoded string.
    pub fn intern_string(&self, value: DexString) -> StringRc {
        intern(&self.strings, value)
    }

    /// Intern a type by descriptor.
    pub fn create_type(&self, descriptor: &str) -> TypeRc {
        self.intern_type(self.create_string(descriptor))
    }

    /// Intern a type whose descriptor string already exists.
    pub fn intern_type(&self, descriptor: StringRc) -> TypeRc {
        intern(&self.types, DexType { descriptor })
    }

    /// Intern a prototype. The shorty is derived from the types.
    pub fn create_proto(&self, return_type: &TypeRc, parameters: Vec<TypeRc>) -> ProtoRc {
        let mut shorty = String::with_capacity(parameters.len() + 1);
        shorty.push(return_type.shorty_char());
        for parameter in &parameters {
            shorty.push(parameter.shorty_char());
        }
        let shorty = self.create_string(&shorty);
        intern(
            &self.protos,
            DexProto {
                shorty,
                return_type: return_type.clone(),
                parameters,
            },
        )
    }

    /// Intern a field reference.
    pub fn create_field(&self, holder: &TypeRc, ty: &TypeRc, name: &str) -> FieldRc {
        self.intern_field(holder.clone(), self.create_string(name), ty.clone())
    }

    /// Intern a field reference from existing parts.
    pub fn intern_field(&self, holder: TypeRc, name: StringRc, ty: TypeRc) -> FieldRc {
        intern(&self.fields, DexField { holder, name, ty })
    }

    /// Intern a method reference.
    pub fn create_method(&self, holder: &TypeRc, proto: &ProtoRc, name: &str) -> MethodRc {
        self.intern_method(holder.clone(), self.create_string(name), proto.clone())
    }

    /// Intern a method reference from existing parts.
    pub fn intern_method(&self, holder: TypeRc, name: StringRc, proto: ProtoRc) -> MethodRc {
        intern(
            &self.methods,
            DexMethod {
                holder,
                name,
                proto,
            },
        )
    }

    /// Intern a method handle.
    pub fn create_method_handle(
        &self,
        kind: MethodHandleKind,
        member: MethodHandleMember,
    ) -> MethodHandleRc {
        intern(&self.method_handles, DexMethodHandle { kind, member })
    }

    /// Intern a call site.
    pub fn create_call_site(
        &self,
        bootstrap: MethodHandleRc,
        method_name: StringRc,
        method_proto: ProtoRc,
        extra_args: Vec<EncodedValue>,
    ) -> CallSiteRc {
        intern(
            &self.call_sites,
            DexCallSite {
                bootstrap,
                method_name,
                method_proto,
                extra_args,
            },
        )
    }

    /// `Ljava/lang/Object;`
    pub fn object_type(&self) -> TypeRc {
        self.create_type("Ljava/lang/Object;")
    }

    /// `V`
    pub fn void_type(&self) -> TypeRc {
        self.create_type("V")
    }

    /// Number of distinct strings created so far.
    #[must_use]
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent() {
        let factory = ItemFactory::new();
        let a = factory.create_type("La;");
        let b = factory.create_type("La;");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.descriptor, &factory.create_string("La;")));

        let int = factory.create_type("I");
        let m1 = factory.create_method(&a, &factory.create_proto(&int, vec![int.clone()]), "m");
        let m2 = factory.create_method(&a, &factory.create_proto(&int, vec![int.clone()]), "m");
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(m1.proto.shorty.to_string_lossy(), "II");
    }

    #[test]
    fn test_shorty_of_references() {
        let factory = ItemFactory::new();
        let proto = factory.create_proto(
            &factory.void_type(),
            vec![factory.object_type(), factory.create_type("[J"), factory.create_type("Z")],
        );
        assert_eq!(proto.shorty.to_string_lossy(), "VLLZ");
    }

    #[test]
    fn test_parallel_interning() {
        use rayon::prelude::*;

        let factory = ItemFactory::new();
        let types: Vec<TypeRc> = (0..64)
            .into_par_iter()
            .map(|i| factory.create_type(&format!("Lp{};", i % 8)))
            .collect();
        assert_eq!(types.len(), 64);
        assert!(Arc::ptr_eq(&types[0], &types[8]));
    }
}
