use criterion::{criterion_group, criterion_main, Criterion};
use search_core::tokenizer::tokenize;
use search_core::{search_directory, Role, SearchableRecord};

const SKILLS: &[&str] = &["python", "rust", "java", "sql", "machine learning", "react", "go", "kubernetes"];

fn directory(n: u32) -> Vec<SearchableRecord> {
    (0..n)
        .map(|i| SearchableRecord {
            id: i,
            username: format!("user_{i} Lastname{}", i % 97),
            role: match i % 3 { 0 => Role::Student, 1 => Role::Alumni, _ => Role::Faculty },
            batch_year: Some(2000 + (i % 25) as i32),
            skills: Some(format!("{}, {}", SKILLS[i as usize % SKILLS.len()], SKILLS[(i as usize / 3) % SKILLS.len()])),
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "Python, Machine Learning; Data-Science & SQL (2023) rust_lang ".repeat(50);
    c.bench_function("tokenize_profile_text", |b| b.iter(|| tokenize(&text)));
}

fn bench_pipeline(c: &mut Criterion) {
    let users = directory(2_000);
    c.bench_function("search_directory_2k", |b| b.iter(|| search_directory("python 2010 alumni", &users)));
}

criterion_group!(benches, bench_tokenize, bench_pipeline);
criterion_main!(benches);
