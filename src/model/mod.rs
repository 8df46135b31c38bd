//! The index/constant-pool model.
//!
//! All indexable items (strings, types, protos, fields, methods, method handles and call sites)
//! are immutable values shared through [`std::sync::Arc`] and interned by [`ItemFactory`].
//! Classes reference items directly, never by index: indices only exist while a container is
//! read ([`IndexResolver`]) or written ([`IndexLookup`]). This is what allows classes to be
//! renamed, pruned, merged and redistributed freely between reading and writing.
//!
//! # Key Components
//!
//! - [`string`] - MUTF-8 strings with canonical UTF-16 ordering
//! - [`items`] - types, protos, fields, methods, method handles, call sites
//! - [`values`] - encoded values, arrays and annotations
//! - [`code`] - code bodies and the instruction codec
//! - [`debug`] - pc-based and event-based debug info
//! - [`class`] - program classes and their members
//! - [`application`] - a set of program classes plus markers
//! - [`collect`] - closure computation over the items a class references
//! - [`naming`] - renaming lookups applied on write

pub mod annotations;
pub mod application;
pub mod class;
pub mod code;
pub mod collect;
pub mod debug;
pub mod factory;
pub mod items;
pub mod marker;
pub mod naming;
pub mod string;
pub mod values;

pub use application::Application;
pub use class::{AccessFlags, ClassRc, DexProgramClass, EncodedField, EncodedMethod};
pub use factory::ItemFactory;

use crate::{
    model::{
        items::{CallSiteRc, FieldRc, MethodHandleRc, MethodRc, ProtoRc, TypeRc},
        string::StringRc,
    },
    Result,
};

/// Resolves table indices of an input container into model items.
pub trait IndexResolver {
    /// String at `index` of the string id table.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn string(&self, index: u32) -> Result<StringRc>;
    /// Type at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn ty(&self, index: u32) -> Result<TypeRc>;
    /// Proto at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn proto(&self, index: u32) -> Result<ProtoRc>;
    /// Field at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn field(&self, index: u32) -> Result<FieldRc>;
    /// Method at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn method(&self, index: u32) -> Result<MethodRc>;
    /// Call site at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn call_site(&self, index: u32) -> Result<CallSiteRc>;
    /// Method handle at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    fn method_handle(&self, index: u32) -> Result<MethodHandleRc>;
}

/// Maps model items to their table indices in an output container.
pub trait IndexLookup {
    /// Index of a string.
    ///
    /// # Errors
    /// Returns an error if the string is not part of the output.
    fn string_index(&self, string: &StringRc) -> Result<u32>;
    /// Index of a type.
    ///
    /// # Errors
    /// Returns an error if the type is not part of the output.
    fn type_index(&self, ty: &TypeRc) -> Result<u32>;
    /// Index of a proto.
    ///
    /// # Errors
    /// Returns an error if the proto is not part of the output.
    fn proto_index(&self, proto: &ProtoRc) -> Result<u32>;
    /// Index of a field.
    ///
    /// # Errors
    /// Returns an error if the field is not part of the output.
    fn field_index(&self, field: &FieldRc) -> Result<u32>;
    /// Index of a method.
    ///
    /// # Errors
    /// Returns an error if the method is not part of the output.
    fn method_index(&self, method: &MethodRc) -> Result<u32>;
    /// Index of a call site.
    ///
    /// # Errors
    /// Returns an error if the call site is not part of the output.
    fn call_site_index(&self, call_site: &CallSiteRc) -> Result<u32>;
    /// Index of a method handle.
    ///
    /// # Errors
    /// Returns an error if the method handle is not part of the output.
    fn method_handle_index(&self, handle: &MethodHandleRc) -> Result<u32>;
}
