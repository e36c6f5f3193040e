use std::fmt::Write;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_bulkload::mapping::MappingTable;
use csv_bulkload::matching::suggest_mappings;
use csv_bulkload::payload::render_payload;
use csv_bulkload::schema::{FieldType, TargetField};
use csv_bulkload::tokenizer::CsvDocument;

fn generate_contacts(rows: usize) -> String {
    let mut text = String::from("First Name,Last Name,Email Address,Phone,City,Notes\n");
    for i in 0..rows {
        let city = match i % 3 {
            0 => "London",
            1 => "\"Portland, OR\"",
            _ => "Arlington",
        };
        writeln!(
            text,
            "Ada{i},Lovelace{i},ADA{i}@EXAMPLE.COM,(555) 123-{:04},{city},\"line one\nline two\"",
            i % 10_000
        )
        .expect("row");
    }
    text
}

fn contact_fields() -> Vec<TargetField> {
    vec![
        TargetField::new("FirstName", "First Name", FieldType::Text),
        TargetField::new("LastName", "Last Name", FieldType::Text).required(),
        TargetField::new("Email", "Email", FieldType::Email),
        TargetField::new("Phone", "Business Phone", FieldType::Phone),
        TargetField::new("MailingCity", "Mailing City", FieldType::Text),
    ]
}

fn bench_pipeline(c: &mut Criterion) {
    let text = generate_contacts(20_000);
    let doc = CsvDocument::parse(&text).expect("parse");
    let mut mapping = MappingTable::new();
    mapping.auto_assign(&suggest_mappings(doc.headers(), &contact_fields()));

    let mut group = c.benchmark_group("pipeline");

    group.bench_function("tokenize", |b| {
        b.iter(|| CsvDocument::parse(&text).expect("parse"));
    });

    group.bench_function("render_payload", |b| {
        b.iter_batched(
            || (),
            |_| render_payload(Some(&doc), &mapping).expect("render"),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
