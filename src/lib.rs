// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' and 'writer/output.rs' use mmap to map files into memory

//! # dexscope
//!
//! Reader, writer and multi-file distributor for Dalvik executable (DEX) containers.
//!
//! `dexscope` decodes DEX files into an in-memory program model, assigns the classes of a
//! program to as many output files as the 16-bit index limits require, and encodes them back
//! into canonical, checksummed containers.
//!
//! ## Features
//!
//! - **Lazy decoding** - items are decoded on first use and cached by offset
//! - **Canonical output** - every index table is sorted, every data item deduplicated
//! - **Multi-file distribution** - main-dex lists, startup classes, package locality and
//!   feature splits
//! - **Jumbo strings** - code bodies are rewritten when string indices outgrow 16 bits
//! - **Container format** - several sections with one shared string table
//! - **Parallel** - inputs are read and outputs written with rayon
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dexscope::prelude::*;
//! use std::path::Path;
//!
//! let options = Options::default().with_min_api_level(21);
//! let app = ApplicationReader::new(&options)
//!     .with_resource(ProgramResource::from_path(Path::new("classes.dex"))?)
//!     .read()?;
//!
//! let consumer = DirectoryConsumer::new("out");
//! ApplicationWriter::new(&app, &options).write(&consumer)?;
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - input abstraction over memory-mapped or owned bytes
//! - [`model`] - the index and constant-pool model
//! - [`reader`] - decoding containers into an [`model::Application`]
//! - [`distribution`] - assignment of classes to output files
//! - [`jumbo`] - rewriting of string loads for large string tables
//! - [`writer`] - encoding, container packing and output delivery
//! - [`diagnostics`] - warnings and deferred errors
//! - [`options`] - target capabilities and output switches
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Errors that should not stop independent work,
//! like a consumer failing for one output file, are collected in
//! [`diagnostics::Diagnostics`] and reported at the end of a write.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Input abstraction: memory-mapped and in-memory files, a byte cursor and LEB128 helpers.
pub mod file;

/// Target capabilities, distribution and layout switches.
pub mod options;

/// Warnings and deferred errors collected while reading and writing.
pub mod diagnostics;

/// The index and constant-pool model: strings, types, protos, fields, methods, method handles,
/// call sites, encoded values, annotations, code and classes.
pub mod model;

/// Decoding containers.
pub mod reader;

/// Assignment of classes to output files within the index limits.
pub mod distribution;

/// Rewriting of code bodies for string indices beyond 16 bits.
pub mod jumbo;

/// Encoding of output files and containers.
pub mod writer;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dexscope::prelude::*;
///
/// let options = Options::default();
/// let app = ApplicationReader::new(&options).read()?;
/// println!("{} classes", app.len());
/// # Ok::<(), dexscope::Error>(())
/// ```
pub mod prelude;

/// `dexscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dexscope` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use dexscope::{Error, File};
///
/// match File::from_file(std::path::Path::new("classes.dex")) {
///     Ok(file) => println!("{} bytes", file.len()),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Output configuration.
pub use options::Options;

/// Input files and the byte cursor.
pub use file::{parser::Parser, File};
