//! Multi-section containers with one shared string table.

use std::sync::Arc;

use dexscope::{
    options::TestingOptions,
    prelude::*,
    reader::{
        container::section_offsets,
        header::{
            CHECKSUM_OFFSET, CONTAINER_OFF_OFFSET, CONTAINER_SIZE_OFFSET, FILE_SIZE_OFFSET,
            MAP_OFF_OFFSET, SIGNATURE_OFFSET, SIGNATURE_SIZE, STRING_IDS_SIZE_OFFSET,
        },
    },
    writer::integrity::{compute_checksum, compute_signature},
};

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn application(count: usize) -> Application {
    let factory = Arc::new(ItemFactory::new());
    let proto = factory.create_proto(&factory.void_type(), vec![]);
    let classes = (0..count)
        .map(|i| {
            let ty = factory.create_type(&format!("Lcom/example/K{i};"));
            Arc::new(
                DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(factory.object_type()))
                    .with_method(EncodedMethod::new(
                        factory.create_method(&ty, &proto, "greet"),
                        AccessFlags::PUBLIC | AccessFlags::STATIC,
                        Some(Arc::new(DexCode::new(
                            1,
                            0,
                            0,
                            vec![
                                Insn::ConstString {
                                    register: 0,
                                    string: factory.create_string(&format!("hello {i}")),
                                },
                                Insn::Simple { units: vec![0x000e] },
                            ],
                        ))),
                    )),
            )
        })
        .collect();
    Application::new(factory, classes, Vec::new()).unwrap()
}

fn container_options() -> Options {
    Options::default()
        .with_min_api_level(36)
        .with_container_dex(true)
        .with_testing(TestingOptions {
            limit_classes_per_file: Some(1),
            ..TestingOptions::default()
        })
}

fn write_container(app: &Application, options: &Options) -> Vec<u8> {
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(app, options).write(&consumer).unwrap();
    let mut outputs = consumer.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].file_name(), "classes.dex");
    outputs.remove(0).data
}

#[test]
fn test_sections_share_one_container() {
    let app = application(3);
    let data = write_container(&app, &container_options());

    assert_eq!(&data[..8], b"dex\n041\0");
    let offsets = section_offsets(&data).unwrap();
    assert!(offsets.len() > 1);
    assert_eq!(offsets[0], 0);

    for &offset in &offsets {
        assert_eq!(read_u32(&data, offset + CONTAINER_SIZE_OFFSET) as usize, data.len());
        assert_eq!(read_u32(&data, offset + CONTAINER_OFF_OFFSET) as usize, offset);
    }
}

#[test]
fn test_each_section_has_valid_integrity() {
    let app = application(3);
    let data = write_container(&app, &container_options());

    for offset in section_offsets(&data).unwrap() {
        let end = offset + read_u32(&data, offset + FILE_SIZE_OFFSET) as usize;
        let section = &data[offset..end];

        let signature = compute_signature(&section[FILE_SIZE_OFFSET..]);
        assert_eq!(&section[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_SIZE], &signature);
        let checksum = compute_checksum(&section[SIGNATURE_OFFSET..]);
        assert_eq!(read_u32(section, CHECKSUM_OFFSET), checksum);
    }
}

#[test]
fn test_section_maps_sorted_by_offset() {
    let app = application(3);
    let data = write_container(&app, &container_options());
    let offsets = section_offsets(&data).unwrap();
    let last = *offsets.last().unwrap();
    let shared_string_ids = read_u32(&data, last + STRING_IDS_SIZE_OFFSET + 4);

    for &offset in &offsets {
        let map_off = read_u32(&data, offset + MAP_OFF_OFFSET) as usize;
        let count = read_u32(&data, map_off) as usize;
        let entries: Vec<(u16, u32)> = (0..count)
            .map(|i| {
                let entry = map_off + 4 + i * 12;
                let kind = u16::from_le_bytes([data[entry], data[entry + 1]]);
                (kind, read_u32(&data, entry + 8))
            })
            .collect();
        assert!(entries.windows(2).all(|pair| pair[0].1 < pair[1].1));

        // string_ids
        let strings = entries.iter().find(|(kind, _)| *kind == 0x0001).unwrap();
        assert_eq!(strings.1, shared_string_ids);
    }
}

#[test]
fn test_container_reads_back() {
    let app = application(3);
    let options = container_options();
    let data = write_container(&app, &options);

    let read_back = ApplicationReader::new(&options)
        .with_resource(ProgramResource::from_bytes(data, "classes.dex").unwrap())
        .read()
        .unwrap();
    assert_eq!(read_back.len(), 3);
    for i in 0..3 {
        let class = read_back
            .class_by_descriptor(&format!("Lcom/example/K{i};"))
            .unwrap();
        let code = class.direct_methods[0].code.clone().unwrap();
        assert!(matches!(
            &code.instructions[0].insn,
            Insn::ConstString { string, .. } if string.to_string() == format!("hello {i}")
        ));
    }
}

#[test]
fn test_low_api_level_writes_plain_files() {
    let app = application(3);
    let options = Options::default().with_container_dex(true).with_testing(TestingOptions {
        limit_classes_per_file: Some(1),
        ..TestingOptions::default()
    });
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let outputs = consumer.outputs();
    assert!(outputs.len() > 1);
    assert!(outputs.iter().all(|output| &output.data[..8] == b"dex\n035\0"));
}
