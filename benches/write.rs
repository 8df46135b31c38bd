//! Benchmarks for encoding and decoding.
//!
//! Uses a synthetic program of a few hundred classes spread over several packages:
//! - Writing a single output file
//! - Distributing over several files
//! - Reading the written bytes back

extern crate dexscope;

use criterion::{criterion_group, criterion_main, Criterion};
use dexscope::{options::TestingOptions, prelude::*};
use std::{hint::black_box, sync::Arc};

fn synthetic_application(classes: usize) -> Application {
    let factory = Arc::new(ItemFactory::new());
    let int = factory.create_type("I");
    let proto = factory.create_proto(&int, vec![int.clone()]);
    let classes = (0..classes)
        .map(|i| {
            let ty = factory.create_type(&format!("Lbench/p{}/C{i};", i % 8));
            let mut field = EncodedField::new(
                factory.create_field(&ty, &int, "VALUE"),
                AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
            );
            field.static_value = Some(EncodedValue::Int(i as i32));
            Arc::new(
                DexProgramClass::new(ty.clone(), AccessFlags::PUBLIC, Some(factory.object_type()))
                    .with_field(field)
                    .with_method(EncodedMethod::new(
                        factory.create_method(&ty, &proto, "compute"),
                        AccessFlags::PUBLIC | AccessFlags::STATIC,
                        Some(Arc::new(DexCode::new(
                            2,
                            1,
                            0,
                            vec![
                                Insn::ConstString {
                                    register: 0,
                                    string: factory.create_string(&format!("label {i}")),
                                },
                                // return v1
                                Insn::Simple { units: vec![0x010f] },
                            ],
                        ))),
                    )),
            )
        })
        .collect();
    Application::new(factory, classes, Vec::new()).unwrap()
}

fn write(app: &Application, options: &Options) -> Vec<DexOutput> {
    let consumer = InMemoryConsumer::new();
    ApplicationWriter::new(app, options).write(&consumer).unwrap();
    consumer.outputs()
}

/// Benchmark writing one output file.
fn bench_write_single(c: &mut Criterion) {
    let app = synthetic_application(500);
    let options = Options::default();

    c.bench_function("write_single_file", |b| {
        b.iter(|| black_box(write(black_box(&app), &options)));
    });
}

/// Benchmark distributing over several output files.
fn bench_write_multidex(c: &mut Criterion) {
    let app = synthetic_application(500);
    let options = Options::default().with_testing(TestingOptions {
        limit_classes_per_file: Some(100),
        ..TestingOptions::default()
    });

    c.bench_function("write_multidex", |b| {
        b.iter(|| black_box(write(black_box(&app), &options)));
    });
}

/// Benchmark reading a written file.
fn bench_read(c: &mut Criterion) {
    let options = Options::default();
    let data = write(&synthetic_application(500), &options).remove(0).data;

    c.bench_function("read_single_file", |b| {
        b.iter(|| {
            let app = ApplicationReader::new(&options)
                .with_resource(ProgramResource::from_bytes(data.clone(), "classes.dex").unwrap())
                .read()
                .unwrap();
            black_box(app)
        });
    });
}

criterion_group!(benches, bench_write_single, bench_write_multidex, bench_read);
criterion_main!(benches);
