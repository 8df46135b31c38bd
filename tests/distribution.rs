//! Distribution of classes into output files, end to end through the writer.

use std::{collections::HashSet, sync::Arc};

use dexscope::{options::TestingOptions, prelude::*};
use tempfile::tempdir;

fn application(descriptors: &[String]) -> Application {
    let factory = Arc::new(ItemFactory::new());
    let object = factory.object_type();
    let proto = factory.create_proto(&factory.void_type(), vec![]);
    let classes = descriptors
        .iter()
        .map(|descriptor| {
            let ty = factory.create_type(descriptor);
            Arc::new(
                DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(object.clone()))
                    .with_method(EncodedMethod::new(
                        factory.create_method(&ty, &proto, "work"),
                        AccessFlags::PUBLIC | AccessFlags::STATIC,
                        Some(Arc::new(DexCode::new(
                            0,
                            0,
                            0,
                            vec![Insn::Simple { units: vec![0x000e] }],
                        ))),
                    )),
            )
        })
        .collect();
    Application::new(factory, classes, Vec::new()).unwrap()
}

fn two_packages() -> Vec<String> {
    (0..10)
        .map(|i| format!("La/b/c/C{i};"))
        .chain((0..5).map(|i| format!("La/b/d/D{i};")))
        .collect()
}

fn limited(limit: usize) -> Options {
    Options::default().with_testing(TestingOptions {
        limit_classes_per_file: Some(limit),
        ..TestingOptions::default()
    })
}

#[test]
fn test_package_split_keeps_every_class_once() {
    let descriptors = two_packages();
    let app = application(&descriptors);
    let options = limited(8);
    let diagnostics = Diagnostics::new();

    let files =
        distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics)).unwrap();
    assert_eq!(files.len(), 2);

    let mut seen = HashSet::new();
    for file in &files {
        for descriptor in file.class_descriptors() {
            assert!(seen.insert(descriptor));
        }
    }
    assert_eq!(seen.len(), descriptors.len());

    let with_first = files
        .iter()
        .find(|file| file.class_descriptors().contains(&"La/b/c/C0;".to_string()))
        .unwrap();
    for i in 1..8 {
        assert!(with_first
            .class_descriptors()
            .contains(&format!("La/b/c/C{i};")));
    }
}

#[test]
fn test_main_dex_list_goes_first() {
    let descriptors = two_packages();
    let app = application(&descriptors);
    let options = limited(8).with_main_dex_list(vec!["La/b/d/D4;".to_string()]);
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let outputs = consumer.outputs();
    assert!(outputs.len() >= 2);
    assert_eq!(outputs[0].id, 0);
    assert!(outputs[0].descriptors.contains(&"La/b/d/D4;".to_string()));
    let ids: Vec<usize> = outputs.iter().map(|output| output.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[test]
fn test_feature_split_gets_own_partition() {
    let descriptors = vec!["La/Base;".to_string(), "La/Camera;".to_string()];
    let app = application(&descriptors);
    let options = Options::default().with_feature_split("La/Camera;", "camera");
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let outputs = consumer.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(consumer.base_outputs()[0].descriptors, ["La/Base;"]);
    let feature = outputs
        .iter()
        .find(|output| output.feature.as_deref() == Some("camera"))
        .unwrap();
    assert_eq!(feature.id, 0);
    assert_eq!(feature.descriptors, ["La/Camera;"]);
    assert_eq!(feature.relative_path(), std::path::Path::new("camera/classes.dex"));
}

#[test]
fn test_marker_in_first_file_of_each_partition() {
    let descriptors = two_packages();
    let app = application(&descriptors);
    let marker = Marker::new(MarkerTool::D8).with("min-api", 21);
    let needle = marker.to_string().into_bytes();
    let options = limited(8).with_marker(marker.clone());
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let outputs = consumer.outputs();
    let contains = |data: &[u8]| data.windows(needle.len()).any(|window| window == needle);
    assert!(contains(&outputs[0].data));
    assert!(outputs[1..].iter().all(|output| !contains(&output.data)));

    let read_back = ApplicationReader::new(&options)
        .with_resource(ProgramResource::from_bytes(outputs[0].data.clone(), "classes.dex").unwrap())
        .read()
        .unwrap();
    assert_eq!(read_back.markers(), [marker]);
}

#[test]
fn test_directory_output_reads_back() {
    let descriptors = two_packages();
    let app = application(&descriptors);
    let options = limited(8);
    let temp_dir = tempdir().unwrap();
    let consumer = DirectoryConsumer::new(temp_dir.path());
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let first = temp_dir.path().join("classes.dex");
    let second = temp_dir.path().join("classes2.dex");
    assert!(first.exists());
    assert!(second.exists());

    let read_back = ApplicationReader::new(&options)
        .with_resource(ProgramResource::from_path(&first).unwrap())
        .with_resource(ProgramResource::from_path(&second).unwrap())
        .read()
        .unwrap();
    assert_eq!(read_back.len(), descriptors.len());
}

#[test]
fn test_file_per_class_output_names() {
    let descriptors = vec!["Lcom/example/A;".to_string(), "Lcom/example/B;".to_string()];
    let app = application(&descriptors);
    let options = Options::default().with_dex_file_per_class(false);
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(&app, &options).write(&consumer).unwrap();

    let paths: Vec<_> = consumer
        .outputs()
        .iter()
        .map(|output| output.relative_path())
        .collect();
    assert_eq!(
        paths,
        [
            std::path::PathBuf::from("com/example/A.dex"),
            std::path::PathBuf::from("com/example/B.dex")
        ]
    );
}

#[test]
fn test_oversized_package_run_is_placed_last() {
    let descriptors: Vec<String> = (0..10)
        .map(|i| format!("La/b/c/C{i};"))
        .chain((0..2).map(|i| format!("La/z/Z{i};")))
        .collect();
    let app = application(&descriptors);
    let options = limited(4);
    let diagnostics = Diagnostics::new();

    let files =
        distribute(DistributionContext::new(&app, &options, &IdentityLens, &diagnostics)).unwrap();

    // The C run fits no empty file, so the Z package is placed before it.
    let first = files[0].class_descriptors();
    assert!(first.contains(&"La/z/Z0;".to_string()));
    assert!(first.contains(&"La/z/Z1;".to_string()));

    let mut seen = HashSet::new();
    for file in &files {
        assert!(file.class_descriptors().len() <= 4);
        for descriptor in file.class_descriptors() {
            assert!(seen.insert(descriptor));
        }
    }
    assert_eq!(seen.len(), descriptors.len());
}
