//! # dexscope Prelude
//!
//! The most commonly used types of the library in one glob import: the read and write entry
//! points, the program model and the configuration.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexscope operations
pub use crate::Error;

/// The result type used throughout dexscope
pub use crate::Result;

/// Output configuration
pub use crate::options::{Options, TestingOptions};

/// Warnings and deferred errors
pub use crate::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};

// ================================================================================================
// Entry Points
// ================================================================================================

/// Reading
pub use crate::reader::{ApplicationReader, ProgramResource};

/// Writing
pub use crate::writer::{
    ApplicationWriter, DexOutput, DirectoryConsumer, InMemoryConsumer, ProgramConsumer,
};

/// Low-level file access
pub use crate::{File, Parser};

// ================================================================================================
// Program Model
// ================================================================================================

/// Classes and members
pub use crate::model::{
    AccessFlags, Application, ClassRc, DexProgramClass, EncodedField, EncodedMethod, ItemFactory,
};

/// Items
pub use crate::model::items::{
    DexCallSite, DexField, DexMethod, DexMethodHandle, DexProto, DexType, FieldRc,
    MethodHandleKind, MethodHandleMember, MethodRc, ProtoRc, TypeRc,
};

/// Strings
pub use crate::model::string::{DexString, StringRc};

/// Code
pub use crate::model::code::{instruction::Insn, DexCode};

/// Values and annotations
pub use crate::model::{
    annotations::{AnnotationSet, AnnotationVisibility, DexAnnotation},
    values::{EncodedAnnotation, EncodedArray, EncodedValue},
};

/// Renaming
pub use crate::model::naming::{IdentityLens, MapLens, NamingLens};

/// Tool markers
pub use crate::model::marker::{Marker, MarkerTool};

// ================================================================================================
// Distribution and Rewriting
// ================================================================================================

/// Distribution
pub use crate::distribution::{distribute, DistributionContext, VirtualFile};

/// Jumbo string rewriting
pub use crate::jumbo::JumboStringRewriter;
