//! Write an application, read it back and compare.

use std::sync::Arc;

use dexscope::{
    model::{
        code::{TryHandler, TryItem, TypeAddrPair},
        values::AnnotationElement,
    },
    prelude::*,
    reader::header::{
        CHECKSUM_OFFSET, FILE_SIZE_OFFSET, SIGNATURE_OFFSET, SIGNATURE_SIZE,
        STRING_IDS_SIZE_OFFSET,
    },
    writer::integrity::{compute_checksum, compute_signature},
};

fn return_void() -> Insn {
    Insn::Simple { units: vec![0x000e] }
}

fn main_class(factory: &ItemFactory) -> DexProgramClass {
    let ty = factory.create_type("Lcom/example/Main;");
    let int = factory.create_type("I");
    let string = factory.create_type("Ljava/lang/String;");
    let void = factory.void_type();
    let proto = factory.create_proto(&void, vec![]);

    let annotation = Arc::new(DexAnnotation {
        visibility: AnnotationVisibility::Runtime,
        annotation: EncodedAnnotation {
            ty: factory.create_type("Lcom/example/Tag;"),
            elements: vec![AnnotationElement {
                name: factory.create_string("value"),
                value: EncodedValue::Int(3),
            }],
        },
    });

    let mut count = EncodedField::new(
        factory.create_field(&ty, &int, "COUNT"),
        AccessFlags::PUBLIC | AccessFlags::STATIC,
    );
    count.static_value = Some(EncodedValue::Int(7));
    let mut greeting = EncodedField::new(
        factory.create_field(&ty, &string, "GREETING"),
        AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
    );
    greeting.static_value = Some(EncodedValue::String(factory.create_string("hello")));
    let mut name = EncodedField::new(
        factory.create_field(&ty, &string, "name"),
        AccessFlags::PRIVATE,
    );
    name.annotations = Arc::new(AnnotationSet::new(vec![annotation.clone()]));

    let constructor = EncodedMethod::new(
        factory.create_method(&ty, &proto, "<init>"),
        AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
        Some(Arc::new(DexCode::new(1, 1, 0, vec![return_void()]))),
    );

    let mut body = DexCode::new(
        1,
        1,
        0,
        vec![
            Insn::ConstString {
                register: 0,
                string: factory.create_string("running"),
            },
            return_void(),
        ],
    );
    body.tries = vec![TryItem {
        start_addr: 0,
        insn_count: 2,
        handler_index: 0,
    }];
    body.handlers = vec![TryHandler {
        pairs: vec![TypeAddrPair {
            ty: factory.create_type("Ljava/lang/Exception;"),
            addr: 2,
        }],
        catch_all_addr: None,
    }];
    let mut run = EncodedMethod::new(
        factory.create_method(&ty, &proto, "run"),
        AccessFlags::PUBLIC,
        Some(Arc::new(body)),
    );
    run.annotations = Arc::new(AnnotationSet::new(vec![annotation.clone()]));

    let mut class = DexProgramClass::new(ty, AccessFlags::PUBLIC, Some(factory.object_type()))
        .with_interfaces(vec![factory.create_type("Ljava/lang/Runnable;")])
        .with_field(count)
        .with_field(greeting)
        .with_field(name)
        .with_method(constructor)
        .with_method(run);
    class.source_file = Some(factory.create_string("Main.java"));
    class.annotations = Arc::new(AnnotationSet::new(vec![annotation]));
    class
}

fn application() -> Application {
    let factory = Arc::new(ItemFactory::new());
    let main = main_class(&factory);
    let helper = DexProgramClass::new(
        factory.create_type("Lcom/example/Helper;"),
        AccessFlags::FINAL,
        Some(main.ty.clone()),
    );
    Application::new(factory, vec![Arc::new(main), Arc::new(helper)], Vec::new()).unwrap()
}

fn write(app: &Application, options: &Options) -> Vec<u8> {
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(app, options).write(&consumer).unwrap();
    let mut outputs = consumer.outputs();
    assert_eq!(outputs.len(), 1);
    outputs.remove(0).data
}

fn read(data: Vec<u8>, options: &Options) -> Application {
    ApplicationReader::new(options)
        .with_resource(ProgramResource::from_bytes(data, "classes.dex").unwrap())
        .read()
        .unwrap()
}

#[test]
fn test_roundtrip_preserves_classes() {
    let app = application();
    let options = Options::default();
    let read_back = read(write(&app, &options), &options);

    assert_eq!(read_back.len(), 2);
    let original = app.class_by_descriptor("Lcom/example/Main;").unwrap();
    let decoded = read_back.class_by_descriptor("Lcom/example/Main;").unwrap();

    assert_eq!(decoded.access_flags, original.access_flags);
    assert_eq!(decoded.super_type, original.super_type);
    assert_eq!(decoded.interfaces, original.interfaces);
    assert_eq!(decoded.source_file, original.source_file);
    assert_eq!(decoded.annotations, original.annotations);
    assert_eq!(decoded.static_fields, original.static_fields);
    assert_eq!(decoded.instance_fields, original.instance_fields);
    assert_eq!(decoded.direct_methods, original.direct_methods);
    assert_eq!(decoded.virtual_methods, original.virtual_methods);

    let helper = read_back.class_by_descriptor("Lcom/example/Helper;").unwrap();
    assert_eq!(helper.super_type.as_ref().unwrap().descriptor_str(), "Lcom/example/Main;");
    assert!(!helper.has_members());
}

#[test]
fn test_second_encode_is_identical() {
    let app = application();
    let options = Options::default();
    let first = write(&app, &options);
    let second = write(&read(first.clone(), &options), &options);
    assert_eq!(first, second);
}

#[test]
fn test_header_and_integrity() {
    let options = Options::default();
    let data = write(&application(), &options);

    assert_eq!(&data[..8], b"dex\n035\0");
    let file_size = u32::from_le_bytes(data[FILE_SIZE_OFFSET..FILE_SIZE_OFFSET + 4].try_into().unwrap());
    assert_eq!(file_size as usize, data.len());

    let signature = compute_signature(&data[FILE_SIZE_OFFSET..]);
    assert_eq!(&data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_SIZE], &signature);
    let checksum = compute_checksum(&data[SIGNATURE_OFFSET..]);
    assert_eq!(&data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4], &checksum.to_le_bytes());
}

#[test]
fn test_version_follows_api_level() {
    let app = application();
    let data = write(&app, &Options::default().with_min_api_level(26));
    assert_eq!(&data[..8], b"dex\n038\0");
}

#[test]
fn test_canonicalized_code_is_shared() {
    let factory = Arc::new(ItemFactory::new());
    let ty = factory.create_type("La/Twins;");
    let proto = factory.create_proto(&factory.void_type(), vec![]);
    let body = || {
        Some(Arc::new(DexCode::new(
            1,
            0,
            0,
            vec![
                Insn::ConstString {
                    register: 0,
                    string: factory.create_string("same"),
                },
                return_void(),
            ],
        )))
    };
    let class = DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(factory.object_type()))
        .with_method(EncodedMethod::new(
            factory.create_method(&ty, &proto, "a"),
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            body(),
        ))
        .with_method(EncodedMethod::new(
            factory.create_method(&ty, &proto, "b"),
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            body(),
        ));
    let app = Application::new(factory, vec![Arc::new(class)], Vec::new()).unwrap();

    let plain = write(&app, &Options::default());
    let canonical = write(&app, &Options::default().with_canonicalize_code(true));
    assert!(canonical.len() < plain.len());

    let options = Options::default();
    let read_back = read(canonical, &options);
    let class = read_back.class_by_descriptor("La/Twins;").unwrap();
    assert_eq!(class.direct_methods.len(), 2);
    assert_eq!(class.direct_methods[0].code, class.direct_methods[1].code);
}

#[test]
fn test_default_interface_method_needs_api_24() {
    let factory = Arc::new(ItemFactory::new());
    let ty = factory.create_type("La/Api;");
    let proto = factory.create_proto(&factory.void_type(), vec![]);
    let class = DexProgramClass::new(
        ty.clone(),
        AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
        Some(factory.object_type()),
    )
    .with_method(EncodedMethod::new(
        factory.create_method(&ty, &proto, "run"),
        AccessFlags::PUBLIC,
        Some(Arc::new(DexCode::new(1, 1, 0, vec![return_void()]))),
    ));
    let app = Application::new(factory, vec![Arc::new(class)], Vec::new()).unwrap();

    let options = Options::default();
    let writer = ApplicationWriter::new(&app, &options);
    let result = writer.write(&InMemoryConsumer::new());
    assert!(matches!(result, Err(Error::Capability { .. })));
    assert_eq!(
        writer
            .diagnostics()
            .by_category(DiagnosticCategory::Capability)
            .len(),
        1
    );

    let options = Options::default().with_min_api_level(24);
    assert!(ApplicationWriter::new(&app, &options)
        .write(&InMemoryConsumer::new())
        .is_ok());
}

#[test]
fn test_renamed_output() {
    let app = application();
    let main = app.class_by_descriptor("Lcom/example/Main;").unwrap();
    let lens = MapLens::new(app.factory().clone()).rename_type(&main.ty, "La/a;");

    let options = Options::default();
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options)
        .with_lens(&lens)
        .write(&consumer)
        .unwrap();

    let read_back = read(consumer.outputs().remove(0).data, &options);
    assert!(read_back.class_by_descriptor("La/a;").is_some());
    assert!(read_back.class_by_descriptor("Lcom/example/Main;").is_none());
    let helper = read_back.class_by_descriptor("Lcom/example/Helper;").unwrap();
    assert_eq!(helper.super_type.as_ref().unwrap().descriptor_str(), "La/a;");
}

#[test]
fn test_strict_reader_rejects_unsorted_type_ids() {
    let factory = Arc::new(ItemFactory::new());
    let class = DexProgramClass::new(
        factory.create_type("La/A;"),
        AccessFlags::PUBLIC,
        Some(factory.object_type()),
    );
    let app = Application::new(factory, vec![Arc::new(class)], Vec::new()).unwrap();
    let mut data = write(&app, &Options::default());

    // type_ids: "La/A;", "Ljava/lang/Object;"
    let type_ids_off_at = STRING_IDS_SIZE_OFFSET + 12;
    let type_ids_off =
        u32::from_le_bytes(data[type_ids_off_at..type_ids_off_at + 4].try_into().unwrap()) as usize;
    let (first, second) = data[type_ids_off..type_ids_off + 8].split_at_mut(4);
    first.swap_with_slice(second);

    let strict = Options::default();
    let result = ApplicationReader::new(&strict)
        .with_resource(ProgramResource::from_bytes(data.clone(), "classes.dex").unwrap())
        .read();
    assert!(matches!(
        result,
        Err(Error::OrderViolation {
            table: "type_ids",
            index: 1
        })
    ));

    let lenient = Options::default().with_strict_checks(false);
    let read_back = read(data, &lenient);
    assert_eq!(read_back.len(), 1);
}
