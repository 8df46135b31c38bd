//! Packing of several files into one container.
//!
//! A container (format version 041) is a sequence of sections that each look like a complete
//! file with its own header, id tables, data section and map. All sections share one sorted
//! string table: every section's mapping is built over the union of strings, and only the last
//! section writes the string ids and string data. Earlier sections point their header and map
//! entry at the string ids of the last section.
//!
//! Every header carries the total container size and its own offset in the container. The
//! signature and checksum of each section are computed once the whole container is laid out.

use crate::{
    reader::header::{CONTAINER_SIZE_OFFSET, STRING_IDS_SIZE_OFFSET},
    writer::{file_writer::FileWriter, integrity::update_signature_and_checksum},
    Result,
};

/// Offset of `string_ids_off` relative to a section header.
const STRING_IDS_OFF_OFFSET: usize = STRING_IDS_SIZE_OFFSET + 4;

/// Write `writers` as the sections of one container, in order.
///
/// Every writer must have been created over a mapping of the shared string table, see
/// [`crate::writer::mapping::ObjectToOffsetMapping::with_strings`].
///
/// # Errors
/// Returns the first error of any section.
pub fn write_container(writers: &[FileWriter<'_>]) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = Vec::new();
    let mut sections = Vec::with_capacity(writers.len());

    for (index, writer) in writers.iter().enumerate() {
        writer.check_interface_methods()?;
        let collection = writer.collect()?;
        let base = u32::try_from(data.len())
            .map_err(|_| malformed_error!("Container exceeds 4 GiB"))?;
        let owns_strings = index + 1 == writers.len();
        let section = writer.generate(&collection, base, owns_strings)?;
        data.extend_from_slice(&section.bytes);
        sections.push(section.layout);
    }

    let container_size = u32::try_from(data.len())
        .map_err(|_| malformed_error!("Container exceeds 4 GiB"))?;
    let shared_string_ids = sections
        .last()
        .filter(|layout| layout.string_ids_size > 0)
        .map(|layout| layout.string_ids_off);

    for layout in &sections {
        let base = layout.base as usize;
        patch_u32(&mut data, base + CONTAINER_SIZE_OFFSET, container_size)?;
        if layout.owns_strings {
            continue;
        }
        if let Some(string_ids_off) = shared_string_ids {
            patch_u32(&mut data, base + STRING_IDS_OFF_OFFSET, string_ids_off)?;
            if let Some(entry) = layout.shared_string_ids_entry {
                patch_u32(&mut data, base + entry, string_ids_off)?;
            }
        }
    }

    for layout in &sections {
        update_signature_and_checksum(&mut data, layout.base as usize, layout.end as usize)?;
    }

    log::debug!(
        "Packed {} sections into a container of {} bytes",
        sections.len(),
        container_size
    );
    Ok(data)
}

fn patch_u32(data: &mut [u8], position: usize, value: u32) -> Result<()> {
    let slot = data
        .get_mut(position..position + 4)
        .ok_or(out_of_bounds_error!())?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_bounds() {
        let mut data = vec![0u8; 8];
        patch_u32(&mut data, 4, 0xdead_beef).unwrap();
        assert_eq!(&data[4..], &0xdead_beefu32.to_le_bytes());
        assert!(patch_u32(&mut data, 6, 1).is_err());
    }
}
