use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every fallible operation of the reader, the distributor, the jumbo string rewriter and the
/// writer reports through this enum. Variants map onto the failure classes a DEX toolchain has
/// to distinguish: broken input, missing runtime capabilities, exhausted index space and failing
/// I/O.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Malformed`] - Corrupted or invalid container structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Unsupported magic or version
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::OrderViolation`] - An index table is not in canonical order
/// - [`Error::DuplicateClass`] - The same type is defined more than once
///
/// ## Capability Errors
/// - [`Error::Capability`] - A class needs a runtime feature above the configured API level
///
/// ## Capacity Errors
/// - [`Error::FileOverflow`] - A file references more methods or fields than the format allows
/// - [`Error::ClassTooLarge`] - A single class does not fit into an empty file
/// - [`Error::IndexOverflow`] - An item index does not fit its instruction operand
///
/// ## Resource Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Consumer`] - A program consumer rejected an output
/// - [`Error::WriteMmapFailed`] - Memory mapping an output file failed
/// - [`Error::WriteFinalizationFailed`] - Flushing or renaming an output file failed
/// - [`Error::PendingErrors`] - Errors were reported and collected before a checkpoint
///
/// # Examples
///
/// ```rust
/// use dexscope::{Error, File};
///
/// match File::from_mem(vec![0u8; 4]) {
///     Ok(_) => println!("loaded"),
///     Err(Error::NotSupported) => eprintln!("not a DEX container"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // File parsing Errors
    /// The file is damaged and could not be parsed.
    ///
    /// This error indicates that the container structure is corrupted or doesn't
    /// conform to the expected DEX format. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
    /// An out of bound access was attempted while parsing the file.
    ///
    /// This error occurs when trying to read data beyond the end of the file
    /// or section. It's a safety check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,
    /// This file type is not supported.
    ///
    /// Indicates that the input does not start with the DEX magic, or carries
    /// a version this library does not read.
    #[error("This file type is not supported")]
    NotSupported,
    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,
    /// An index table of the input is not in canonical order.
    ///
    /// Raised by the reader when strict checks are enabled and an entry of the type,
    /// field or method id tables does not sort strictly after its predecessor.
    #[error("The {table} table is not sorted at index {index}")]
    OrderViolation {
        /// Name of the offending table
        table: &'static str,
        /// Index of the first out-of-order entry
        index: usize,
    },
    /// The same class descriptor was defined by more than one input.
    #[error("Type {0} is defined multiple times")]
    DuplicateClass(String),

    // Capability Errors
    /// A class uses a feature that is not available at the configured minimum API level.
    ///
    /// Produced by the interface method check that runs before a file is generated.
    #[error("{class}: {message}")]
    Capability {
        /// Descriptor of the offending class
        class: String,
        /// What is not supported
        message: String,
    },

    // Capacity Errors
    /// A file references more methods or fields than a single container can index.
    ///
    /// Carries the aggregate counts of the file at the time the overflow was detected.
    #[error(
        "Cannot fit requested classes in a single dex file (main dex: {main_dex}): \
         # methods: {methods}, # fields: {fields}, limit: {limit}"
    )]
    FileOverflow {
        /// Number of distinct methods referenced
        methods: usize,
        /// Number of distinct fields referenced
        fields: usize,
        /// Whether the overflow happened while filling the main-dex file
        main_dex: bool,
        /// Entry limit per table that was exceeded
        limit: usize,
    },
    /// A single class does not fit into an otherwise empty file.
    #[error("Class {0} does not fit into a single dex file")]
    ClassTooLarge(String),
    /// An item index is too wide for the operand that references it.
    ///
    /// The writer reports this when a string index above `0xFFFF` reaches a non-jumbo
    /// instruction, or any other index exceeds 16 bits.
    #[error("Index {index} of {kind} does not fit into its operand")]
    IndexOverflow {
        /// The kind of item referenced
        kind: &'static str,
        /// The index that overflowed
        index: usize,
    },

    // Resource Errors
    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
    /// A program consumer rejected an output container.
    #[error("Consumer failed: {0}")]
    Consumer(String),
    /// Memory mapping an output file failed.
    #[error("Failed to create output mapping: {message}")]
    WriteMmapFailed {
        /// Description of the failure
        message: String,
    },
    /// Flushing or atomically renaming an output file failed.
    #[error("Failed to finalize output: {message}")]
    WriteFinalizationFailed {
        /// Description of the failure
        message: String,
    },
    /// Errors were reported to the diagnostics collector and a checkpoint was reached.
    #[error("Compilation failed with {0} pending error(s)")]
    PendingErrors(usize),
    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for
    /// wrapping external library errors with additional context.
    #[error("{0}")]
    Error(String),
    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex that is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}
