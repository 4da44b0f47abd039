use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use hyperadmin::codec::{PropertyCodec, decode_field, encode_field};
use hyperadmin::datatype::Value;
use hyperadmin::memory::MemoryStore;
use hyperadmin::roundtrip::{ExportOptions, ImportOptions, export_class, import_class};
use hyperadmin::schema::{ClassSpec, PropertyKind, Schema};
use hyperadmin::store::Store;

fn tracker() -> Schema {
    Schema::from_classes(vec![
        ClassSpec::new("user")
            .property("username", PropertyKind::String)
            .key("username"),
        ClassSpec::new("issue")
            .property("title", PropertyKind::String)
            .property("assignedto", PropertyKind::Link("user".to_string()))
            .property("nosy", PropertyKind::MultiLink("user".to_string())),
    ])
    .unwrap()
}

fn populated(users: u64, issues: u64) -> MemoryStore {
    let mut store = MemoryStore::new(tracker(), "bench");
    for n in 0..users {
        store
            .create("user", vec![("username".to_string(), Value::String(format!("user{n}")))])
            .unwrap();
    }
    for n in 0..issues {
        let assignee = n % users + 1;
        store
            .create("issue", vec![
                ("title".to_string(), Value::String(format!("issue number {n}: \"quoted\"\nsecond line"))),
                ("assignedto".to_string(), Value::Link(assignee)),
                ("nosy".to_string(), Value::MultiLink((1..=assignee.min(5)).collect())),
            ])
            .unwrap();
    }
    store
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let store = populated(1000, 1000);
    let codec = PropertyCodec::new(store.schema(), &store);
    c.bench_function("decode key reference", |b| {
        b.iter(|| codec.decode("issue", None, "assignedto", black_box("user999")))
    });
    c.bench_function("decode multilink", |b| {
        b.iter(|| codec.decode("issue", None, "nosy", black_box("1,2,user3,user4,5")))
    });

    let nosy = PropertyKind::MultiLink("user".to_string());
    let field = encode_field(Some(&Value::MultiLink((1..=50).collect())));
    c.bench_function("decode export field", |b| {
        b.iter(|| decode_field("nosy", &nosy, black_box(&field)))
    });

    let dir = std::env::temp_dir().join(format!("hyperadmin_bench_{}", std::process::id()));
    let store = populated(100, 10_000);
    c.bench_function("export 10k rows", |b| {
        b.iter(|| export_class(&store, "issue", &dir, &ExportOptions::default()).unwrap())
    });
    c.bench_function("import 10k rows", |b| {
        b.iter(|| {
            let mut target = MemoryStore::new(tracker(), "bench");
            import_class(&mut target, "issue", &dir, &ImportOptions::default()).unwrap()
        })
    });
    let _ = std::fs::remove_dir_all(&dir);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
