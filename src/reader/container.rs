//! Reading a whole input: a single container or a multi-section container.
//!
//! Sections of a multi-section container are laid out back to back. Each section header
//! repeats its own offset, and the next section starts where the previous one ends. All
//! sections share the string table stored in the last section, so that section is decoded
//! first and its strings are handed to the others.

use std::sync::Arc;

use crate::{
    file::parse_magic,
    model::{class::DexProgramClass, marker::Marker, ItemFactory},
    reader::{header::DexHeader, parser::DexParser},
    Options, Result,
};

/// What one input contributed.
#[derive(Debug, Default)]
pub struct InputContents {
    /// Decoded classes of all sections
    pub classes: Vec<DexProgramClass>,
    /// Tool markers of all sections
    pub markers: Vec<Marker>,
}

/// Start offsets of all sections in `data`.
///
/// A standard container has one section at offset 0.
///
/// # Errors
/// Returns an error if a section header is malformed, does not repeat its own offset, or has a
/// zero size.
pub fn section_offsets(data: &[u8]) -> Result<Vec<usize>> {
    let version = parse_magic(data)?;
    if !version.is_container() {
        return Ok(vec![0]);
    }

    let mut offsets = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let header = DexHeader::read(data, offset)?;
        if header.file_size == 0 {
            return Err(malformed_error!("Empty container section at 0x{:x}", offset));
        }
        offsets.push(offset);
        offset += header.file_size as usize;
    }
    Ok(offsets)
}

/// Decode every section of `data`.
///
/// Markers live in the shared string table, so they are taken from the last section only.
///
/// # Errors
/// Returns an error if any section fails to decode.
pub fn read_input(
    data: &[u8],
    origin: &str,
    factory: &Arc<ItemFactory>,
    options: &Options,
) -> Result<InputContents> {
    let offsets = section_offsets(data)?;
    let Some((&last, rest)) = offsets.split_last() else {
        return Ok(InputContents::default());
    };

    let mut last_parser = DexParser::new(data, last, origin, factory.clone(), options, None)?;
    last_parser.populate_index_tables()?;
    let strings = last_parser.strings();

    let mut contents = InputContents::default();
    for &offset in rest {
        let mut parser = DexParser::new(
            data,
            offset,
            origin,
            factory.clone(),
            options,
            Some(strings.clone()),
        )?;
        parser.populate_index_tables()?;
        contents.classes.extend(parser.read_classes()?);
    }
    contents.classes.extend(last_parser.read_classes()?);
    contents.markers = last_parser.markers().to_vec();

    log::debug!(
        "{}: {} sections, {} classes",
        origin,
        offsets.len(),
        contents.classes.len()
    );
    Ok(contents)
}
