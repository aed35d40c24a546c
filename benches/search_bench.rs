use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use segdex::{Document, Field, Index, IndexSearcher, IndexWriterConfig, Query, QueryParser};

const WORDS: &[&str] = &[
    "rust", "programming", "language", "segment", "merge", "index", "search", "query", "term",
    "posting", "reader", "writer", "commit", "buffer", "phrase", "fuzzy",
];

struct BenchEnv {
    _tmp: TempDir,
    searcher: IndexSearcher,
}

fn make_doc(id: usize) -> Document {
    let body: Vec<&str> = (0..12).map(|i| WORDS[(id * 7 + i * 3) % WORDS.len()]).collect();
    Document::new()
        .add_field(Field::keyword("id", id.to_string()))
        .add_field(Field::text("body", body.join(" ")))
}

fn build_env(doc_count: usize) -> BenchEnv {
    let tmp = TempDir::new().unwrap();
    let index = Index::open_in_dir(tmp.path()).unwrap();
    let writer = index.writer(IndexWriterConfig::default()).unwrap();
    for id in 0..doc_count {
        writer.add_document(make_doc(id)).unwrap();
    }
    writer.close().unwrap();
    let searcher = index.searcher().unwrap();
    BenchEnv { _tmp: tmp, searcher }
}

fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);
    for &count in &[1_000usize, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let index = Index::in_memory();
                let writer = index.writer(IndexWriterConfig::default()).unwrap();
                for id in 0..count {
                    writer.add_document(make_doc(id)).unwrap();
                }
                writer.commit().unwrap();
                black_box(writer.num_docs());
            });
        });
    }
    group.finish();
}

fn bench_term_search(c: &mut Criterion) {
    let counts = [1_000usize, 5_000, 10_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();

    let query = Query::term("body", "rust");
    let mut group = c.benchmark_group("term_search");
    for (count, env) in envs.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
            b.iter(|| black_box(env.searcher.top(&query, 10).unwrap()));
        });
    }
    group.finish();
}

fn bench_parsed_search(c: &mut Criterion) {
    let env = build_env(10_000);
    let parser = QueryParser::new("body");
    let queries = [
        "rust AND programming",
        "\"segment merge\"~2",
        "ind* -fuzzy",
        "postng~",
    ];

    let mut group = c.benchmark_group("parsed_search");
    for text in queries {
        let query = parser.parse(text).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(text), &query, |b, query| {
            b.iter(|| black_box(env.searcher.top(query, 10).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_indexing, bench_term_search, bench_parsed_search);
criterion_main!(benches);
