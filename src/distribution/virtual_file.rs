//! Output files under construction.
//!
//! A [`VirtualFile`] is a committed [`IndexedItemSet`] plus an [`IndexedItemTransaction`]
//! holding pending additions. Adding a class only touches the transaction; the file's counts
//! are always base plus pending, so a caller can add, look at the counts and then either
//! [`VirtualFile::commit`] or [`VirtualFile::abort`] without any other state to repair.

use crate::{
    model::{
        class::ClassRc,
        collect::{IndexedItemCollection, IndexedItemSet, ItemCollector},
        items::{CallSiteRc, FieldRc, MethodHandleRc, MethodRc, ProtoRc, TypeRc},
        naming::NamingLens,
        string::StringRc,
    },
    Error, Result,
};

/// Pending additions to a file.
///
/// Items already present in the committed set are not recorded again, so the pending set
/// holds exactly what a commit would add.
#[derive(Debug, Default)]
pub struct IndexedItemTransaction {
    pending: IndexedItemSet,
}

struct TransactionView<'a> {
    base: &'a IndexedItemSet,
    pending: &'a mut IndexedItemSet,
}

macro_rules! maybe_insert {
    ($self:ident, $set:ident, $item:expr) => {
        !$self.base.$set.contains($item) && $self.pending.$set.insert($item.clone())
    };
}

impl IndexedItemCollection for TransactionView<'_> {
    fn add_class(&mut self, class: &ClassRc) -> bool {
        !self.base.class_types.contains(&class.ty) && self.pending.add_class(class)
    }

    fn add_string(&mut self, string: &StringRc) -> bool {
        maybe_insert!(self, strings, string)
    }

    fn add_type(&mut self, ty: &TypeRc) -> bool {
        maybe_insert!(self, types, ty)
    }

    fn add_proto(&mut self, proto: &ProtoRc) -> bool {
        maybe_insert!(self, protos, proto)
    }

    fn add_field(&mut self, field: &FieldRc) -> bool {
        maybe_insert!(self, fields, field)
    }

    fn add_method(&mut self, method: &MethodRc) -> bool {
        maybe_insert!(self, methods, method)
    }

    fn add_call_site(&mut self, call_site: &CallSiteRc) -> bool {
        maybe_insert!(self, call_sites, call_site)
    }

    fn add_method_handle(&mut self, handle: &MethodHandleRc) -> bool {
        maybe_insert!(self, method_handles, handle)
    }
}

impl IndexedItemTransaction {
    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The pending additions.
    #[must_use]
    pub fn pending(&self) -> &IndexedItemSet {
        &self.pending
    }
}

/// One output container being filled.
#[derive(Debug)]
pub struct VirtualFile {
    id: usize,
    feature: Option<String>,
    primary_class: Option<String>,
    items: IndexedItemSet,
    transaction: IndexedItemTransaction,
}

impl VirtualFile {
    /// An empty file.
    ///
    /// # Arguments
    /// * `id` - Position of the file in its partition
    /// * `feature` - Feature split the file belongs to, `None` for the base partition
    #[must_use]
    pub fn new(id: usize, feature: Option<String>) -> VirtualFile {
        VirtualFile {
            id,
            feature,
            primary_class: None,
            items: IndexedItemSet::default(),
            transaction: IndexedItemTransaction::default(),
        }
    }

    /// An empty file dedicated to `class`.
    #[must_use]
    pub fn for_class(id: usize, class: &ClassRc, lens: &dyn NamingLens) -> VirtualFile {
        let mut file = VirtualFile::new(id, None);
        file.primary_class = Some(lens.lookup_descriptor(&class.ty).to_string_lossy());
        file
    }

    /// Position of the file in its partition.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Feature split of the file.
    #[must_use]
    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    /// Output descriptor of the class the file was created for, in file-per-class mode.
    #[must_use]
    pub fn primary_class_descriptor(&self) -> Option<&str> {
        self.primary_class.as_deref()
    }

    /// Add `class` and its closure to the transaction.
    pub fn add_class(&mut self, class: &ClassRc, lens: &dyn NamingLens) {
        let mut view = TransactionView {
            base: &self.items,
            pending: &mut self.transaction.pending,
        };
        ItemCollector::new(&mut view, lens).class(class);
    }

    /// Add a string outside of any class, e.g. a marker, and commit it.
    pub fn inject_string(&mut self, string: &StringRc) {
        let mut view = TransactionView {
            base: &self.items,
            pending: &mut self.transaction.pending,
        };
        view.add_string(string);
        self.commit();
    }

    /// Fold the pending additions into the committed set.
    pub fn commit(&mut self) {
        let pending = std::mem::take(&mut self.transaction.pending);
        self.items.absorb(pending);
    }

    /// Drop the pending additions.
    pub fn abort(&mut self) {
        self.transaction.pending = IndexedItemSet::default();
    }

    /// The pending transaction.
    #[must_use]
    pub fn transaction(&self) -> &IndexedItemTransaction {
        &self.transaction
    }

    /// Referenced methods, committed and pending.
    #[must_use]
    pub fn number_of_methods(&self) -> usize {
        self.items.methods.len() + self.transaction.pending.methods.len()
    }

    /// Referenced fields, committed and pending.
    #[must_use]
    pub fn number_of_fields(&self) -> usize {
        self.items.fields.len() + self.transaction.pending.fields.len()
    }

    /// Defined classes, committed and pending.
    #[must_use]
    pub fn number_of_classes(&self) -> usize {
        self.items.classes.len() + self.transaction.pending.classes.len()
    }

    /// Whether the referenced methods or fields exceed `max_entries`.
    #[must_use]
    pub fn is_full(&self, max_entries: usize) -> bool {
        self.number_of_methods() > max_entries || self.number_of_fields() > max_entries
    }

    /// Fail with the current counts if the file is full.
    ///
    /// # Errors
    /// Returns [`Error::FileOverflow`] if the file references too many methods or fields.
    pub fn throw_if_full(&self, max_entries: usize, main_dex: bool) -> Result<()> {
        if !self.is_full(max_entries) {
            return Ok(());
        }
        Err(Error::FileOverflow {
            methods: self.number_of_methods(),
            fields: self.number_of_fields(),
            main_dex,
            limit: max_entries,
        })
    }

    /// Whether no class was committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.classes.is_empty()
    }

    /// Committed classes, in insertion order.
    #[must_use]
    pub fn classes(&self) -> &[ClassRc] {
        &self.items.classes
    }

    /// The committed item set.
    #[must_use]
    pub fn items(&self) -> &IndexedItemSet {
        &self.items
    }

    /// Descriptors of the committed classes, sorted.
    #[must_use]
    pub fn class_descriptors(&self) -> Vec<String> {
        let mut descriptors: Vec<String> = self.classes().iter().map(|c| c.descriptor()).collect();
        descriptors.sort();
        descriptors
    }

    /// Whether the committed set contains `string`.
    #[must_use]
    pub fn contains_string(&self, string: &StringRc) -> bool {
        self.items.strings.contains(string)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{
        class::{AccessFlags, DexProgramClass, EncodedField},
        naming::IdentityLens,
        ItemFactory,
    };

    fn class_with_fields(factory: &ItemFactory, descriptor: &str, count: usize) -> ClassRc {
        let ty = factory.create_type(descriptor);
        let int = factory.create_type("I");
        let mut class = DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(factory.object_type()));
        for i in 0..count {
            let field = factory.create_field(&ty, &int, &format!("f{i}"));
            class = class.with_field(EncodedField::new(field, AccessFlags::PUBLIC));
        }
        Arc::new(class)
    }

    #[test]
    fn test_commit_and_abort() {
        let factory = ItemFactory::new();
        let mut file = VirtualFile::new(0, None);

        file.add_class(&class_with_fields(&factory, "La;", 3), &IdentityLens);
        assert_eq!(file.number_of_fields(), 3);
        assert_eq!(file.number_of_classes(), 1);
        assert!(file.is_empty());
        file.commit();
        assert!(!file.is_empty());
        assert!(file.transaction().is_empty());

        file.add_class(&class_with_fields(&factory, "Lb;", 2), &IdentityLens);
        assert_eq!(file.number_of_fields(), 5);
        file.abort();
        assert_eq!(file.number_of_fields(), 3);
        assert_eq!(file.number_of_classes(), 1);
    }

    #[test]
    fn test_transaction_skips_committed_items() {
        let factory = ItemFactory::new();
        let mut file = VirtualFile::new(0, None);
        file.add_class(&class_with_fields(&factory, "La;", 1), &IdentityLens);
        file.commit();

        // Re-adding the same class is a no-op
        file.add_class(&class_with_fields(&factory, "La;", 1), &IdentityLens);
        assert!(file.transaction().is_empty());
    }

    #[test]
    fn test_throw_if_full() {
        let factory = ItemFactory::new();
        let mut file = VirtualFile::new(0, None);
        file.add_class(&class_with_fields(&factory, "La;", 5), &IdentityLens);
        file.commit();

        assert!(file.throw_if_full(5, false).is_ok());
        match file.throw_if_full(4, true) {
            Err(Error::FileOverflow {
                methods,
                fields,
                main_dex,
                limit,
            }) => {
                assert_eq!(methods, 0);
                assert_eq!(fields, 5);
                assert!(main_dex);
                assert_eq!(limit, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_inject_string() {
        let factory = ItemFactory::new();
        let mut file = VirtualFile::new(0, None);
        let marker = factory.create_string("~~D8{}");
        file.inject_string(&marker);
        assert!(file.contains_string(&marker));
        assert!(file.is_empty());
    }
}
