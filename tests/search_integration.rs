use std::sync::Arc;

use tempfile::TempDir;

use segdex::search::{
    ConstantScoreQuery, Filter, FilteredQuery, FuzzyQuery, PhraseQuery, PrefixQuery, SpanClause,
    SpanQuery, SortValue, TermRange,
};
use segdex::{
    DefaultOperator, Document, Field, Index, IndexSearcher, IndexWriterConfig, MultiSearcher,
    Query, QueryParser, SearchOptions, Searchable, SegdexError, Sort, SortField,
};

const ARTICLES: &[(&str, &str, &str)] = &[
    ("a1", "Rust ownership", "the borrow checker enforces ownership rules"),
    ("a2", "Async Rust", "futures and executors drive async code"),
    ("a3", "Search engines", "an inverted index maps terms to documents"),
    ("a4", "Segment merging", "small segments merge into larger segments"),
    ("a5", "Quick foxes", "the quick brown fox jumps over the lazy dog"),
];

fn article(id: &str, title: &str, body: &str) -> Document {
    Document::new()
        .add_field(Field::keyword("id", id))
        .add_field(Field::text("title", title))
        .add_field(Field::text("body", body))
}

fn article_index() -> (TempDir, Index) {
    let tmp = TempDir::new().unwrap();
    let index = Index::open_in_dir(tmp.path()).unwrap();
    let writer = index
        .writer(IndexWriterConfig::default().with_max_buffered_docs(2))
        .unwrap();
    for (id, title, body) in ARTICLES {
        writer.add_document(article(id, title, body)).unwrap();
    }
    writer.close().unwrap();
    (tmp, index)
}

fn ids(searcher: &IndexSearcher, query: &Query) -> Vec<String> {
    let hits = searcher.top(query, 100).unwrap();
    hits.docs()
        .into_iter()
        .map(|doc| searcher.doc(doc).unwrap().unwrap().get("id").unwrap().to_string())
        .collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

#[test]
fn parsed_queries_match_expected_documents() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();
    let parser = QueryParser::new("body").with_default_fields(["title", "body"]);

    let q = parser.parse("rust").unwrap();
    assert_eq!(sorted(ids(&searcher, &q)), vec!["a1", "a2"]);

    let q = parser.parse("rust AND ownership").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a1"]);

    let q = parser.parse("rust -async").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a1"]);

    let q = parser.parse("title:segment*").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a4"]);

    let q = parser.parse("body:\"quick brown fox\"").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a5"]);

    let q = parser.parse("body:\"quick fox\"~1").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a5"]);

    let q = parser.parse("body:\"fox quick\"").unwrap();
    assert!(ids(&searcher, &q).is_empty());

    let q = parser.parse("id:[a2 a4]").unwrap();
    assert_eq!(sorted(ids(&searcher, &q)), vec!["a2", "a3", "a4"]);

    let q = parser.parse("id:{a2 a4]").unwrap();
    assert_eq!(sorted(ids(&searcher, &q)), vec!["a3", "a4"]);

    let q = parser.parse("*").unwrap();
    assert_eq!(ids(&searcher, &q).len(), ARTICLES.len());
}

#[test]
fn default_and_operator_requires_every_word() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();

    let or_parser = QueryParser::new("body");
    let and_parser = QueryParser::new("body").with_default_operator(DefaultOperator::And);

    let or_hits = ids(&searcher, &or_parser.parse("borrow futures").unwrap());
    assert_eq!(sorted(or_hits), vec!["a1", "a2"]);
    assert!(ids(&searcher, &and_parser.parse("borrow futures").unwrap()).is_empty());
    assert_eq!(ids(&searcher, &and_parser.parse("borrow checker").unwrap()), vec!["a1"]);
}

#[test]
fn malformed_queries_report_or_fall_back() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();

    let strict = QueryParser::new("body");
    assert!(matches!(
        strict.parse("(inverted index").unwrap_err(),
        SegdexError::QueryParse { .. }
    ));

    let lenient = QueryParser::new("body").handle_parse_errors(true);
    let q = lenient.parse("(inverted index").unwrap();
    assert_eq!(ids(&searcher, &q), vec!["a3"]);
}

#[test]
fn fuzzy_prefix_and_phrase_queries() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();

    let fuzzy: Query = FuzzyQuery::new("body", "segmants").into();
    assert_eq!(ids(&searcher, &fuzzy), vec!["a4"]);

    let prefix: Query = PrefixQuery::new("body", "exec").into();
    assert_eq!(ids(&searcher, &prefix), vec!["a2"]);

    let mut phrase = PhraseQuery::new("body");
    phrase.push_at(vec!["lazy".to_string()], 0);
    phrase.push_at(vec!["dog".to_string(), "cat".to_string()], 1);
    assert_eq!(ids(&searcher, &phrase.into()), vec!["a5"]);
}

#[test]
fn paging_returns_consecutive_slices() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();
    let query = Query::match_all();

    let all = searcher.top(&query, 10).unwrap();
    assert_eq!(all.total_hits, 5);

    let first = searcher
        .search(&query, &SearchOptions::new().with_limit(2))
        .unwrap();
    let second = searcher
        .search(&query, &SearchOptions::new().with_offset(2).with_limit(2))
        .unwrap();
    let beyond = searcher
        .search(&query, &SearchOptions::new().with_offset(10).with_limit(2))
        .unwrap();

    assert_eq!(first.docs(), all.docs()[..2].to_vec());
    assert_eq!(second.docs(), all.docs()[2..4].to_vec());
    assert_eq!(second.total_hits, 5);
    assert!(beyond.is_empty());
}

#[test]
fn filters_restrict_without_changing_scores() {
    let (_tmp, index) = article_index();
    let searcher = index.searcher().unwrap();
    let query = Query::term("title", "rust");

    let unfiltered = searcher.top(&query, 10).unwrap();
    let filtered = searcher
        .search(
            &query,
            &SearchOptions::new().with_limit(10).with_filter(Filter::term("id", "a2")),
        )
        .unwrap();
    assert_eq!(filtered.total_hits, 1);
    let hit = &filtered.score_docs[0];
    let same = unfiltered.score_docs.iter().find(|s| s.doc == hit.doc).unwrap();
    assert_eq!(hit.score, same.score);

    let range = TermRange::new("id", Some("a1".to_string()), Some("a1".to_string()), true, true)
        .unwrap();
    let by_range = searcher
        .search(&query, &SearchOptions::new().with_filter(Filter::Range(range)))
        .unwrap();
    assert_eq!(by_range.docs().len(), 1);

    let by_query = searcher
        .search(
            &Query::match_all(),
            &SearchOptions::new().with_filter(Filter::query(Query::term("body", "segments"))),
        )
        .unwrap();
    assert_eq!(by_query.total_hits, 1);
}

#[test]
fn multi_searcher_spans_indexes() {
    let (_tmp_a, left) = article_index();
    let right = Index::in_memory();
    let writer = right.writer(IndexWriterConfig::default()).unwrap();
    writer
        .add_document(article("b1", "More Rust", "rust macros expand at compile time"))
        .unwrap();
    writer
        .add_document(article("b2", "Gardening", "tomatoes need sun"))
        .unwrap();
    writer.close().unwrap();

    let subs: Vec<Arc<dyn Searchable>> = vec![
        Arc::new(left.searcher().unwrap()),
        Arc::new(right.searcher().unwrap()),
    ];
    let multi = MultiSearcher::new(subs);
    assert_eq!(multi.max_doc(), 7);
    assert_eq!(multi.starts(), &[0, 5]);

    let hits = multi
        .search(&Query::term("title", "rust"), &SearchOptions::new())
        .unwrap();
    assert_eq!(hits.total_hits, 3);
    let mut found: Vec<String> = hits
        .docs()
        .into_iter()
        .map(|doc| multi.document(doc).unwrap().unwrap().get("id").unwrap().to_string())
        .collect();
    found.sort();
    assert_eq!(found, vec!["a1", "a2", "b1"]);

    assert!(matches!(
        multi.document(7),
        Err(SegdexError::DocumentOutOfRange { doc: 7, max_doc: 7 })
    ));
}

fn span_index() -> Index {
    let index = Index::in_memory();
    let writer = index.writer(IndexWriterConfig::default()).unwrap();
    for body in [
        "the quick brown fox",
        "quick fox",
        "fox quick brown",
        "quick red dog",
    ] {
        writer
            .add_document(Document::new().add_field(Field::text("body", body)))
            .unwrap();
    }
    writer.close().unwrap();
    index
}

fn span_docs(searcher: &IndexSearcher, clause: SpanClause) -> Vec<u32> {
    searcher.matching_docs(&SpanQuery::new(clause).into()).unwrap()
}

fn word(text: &str) -> SpanClause {
    SpanClause::term("body", text)
}

#[test]
fn span_queries_match_positions() {
    let index = span_index();
    let searcher = index.searcher().unwrap();
    let quick_fox = || vec![word("quick"), word("fox")];

    assert_eq!(span_docs(&searcher, SpanClause::near(quick_fox(), 0, true)), vec![1]);
    assert_eq!(span_docs(&searcher, SpanClause::near(quick_fox(), 1, true)), vec![0, 1]);
    assert_eq!(span_docs(&searcher, SpanClause::near(quick_fox(), 1, false)), vec![0, 1, 2]);

    // quick as the very first word
    assert_eq!(span_docs(&searcher, SpanClause::first(word("quick"), 1)), vec![1, 3]);

    let adjacent = SpanClause::near(quick_fox(), 0, true);
    assert_eq!(
        span_docs(&searcher, SpanClause::not(word("quick"), adjacent)),
        vec![0, 2, 3]
    );

    let loose = SpanClause::near(quick_fox(), 1, true);
    assert_eq!(span_docs(&searcher, SpanClause::within(loose, word("brown"))), vec![0]);

    let either = SpanClause::Or(vec![word("brown"), word("dog")]);
    assert_eq!(span_docs(&searcher, either), vec![0, 2, 3]);

    // span hits are scored and ranked like any other query
    let hits = searcher
        .top(&SpanQuery::new(SpanClause::near(quick_fox(), 1, false)).into(), 10)
        .unwrap();
    assert_eq!(hits.total_hits, 3);
    assert!(hits.score_docs.iter().all(|hit| hit.score > 0.0));
}

#[test]
fn filtered_and_constant_score_queries() {
    let index = span_index();
    let searcher = index.searcher().unwrap();

    let quick = Query::term("body", "quick");
    let filtered: Query = FilteredQuery::new(quick.clone(), Filter::term("body", "brown")).into();
    assert_eq!(searcher.matching_docs(&filtered).unwrap(), vec![0, 2]);

    // the filter only removes hits
    let plain = searcher.top(&quick, 10).unwrap();
    let narrowed = searcher.top(&filtered, 10).unwrap();
    for hit in &narrowed.score_docs {
        let same = plain.score_docs.iter().find(|s| s.doc == hit.doc).unwrap();
        assert_eq!(hit.score, same.score);
    }

    let constant: Query = ConstantScoreQuery::new(Filter::term("body", "quick")).into();
    let hits = searcher.top(&constant, 10).unwrap();
    assert_eq!(hits.docs(), vec![0, 1, 2, 3]);
    assert!(hits.score_docs.iter().all(|hit| hit.score == hits.max_score));

    let dog = Filter::query(Query::term("body", "dog"));
    let by_query: Query = ConstantScoreQuery::new(dog).into();
    assert_eq!(searcher.matching_docs(&by_query).unwrap(), vec![3]);
}

fn priced(id: &str, name: &str, year: &str, body: &str) -> Document {
    Document::new()
        .add_field(Field::keyword("id", id))
        .add_field(Field::keyword("name", name))
        .add_field(Field::keyword("year", year))
        .add_field(Field::text("body", body))
}

fn catalog_index(rows: &[(&str, &str, &str, &str)]) -> Index {
    let index = Index::in_memory();
    let writer = index
        .writer(IndexWriterConfig::default().with_max_buffered_docs(2))
        .unwrap();
    for (id, name, year, body) in rows {
        writer.add_document(priced(id, name, year, body)).unwrap();
    }
    writer.close().unwrap();
    index
}

const CATALOG: &[(&str, &str, &str, &str)] = &[
    ("c1", "pear", "1999", "fresh fruit"),
    ("c2", "apple", "2005", "fruit fruit fruit"),
    ("c3", "melon", "87", "fruit salad"),
    ("c4", "apple", "2010", "dried fruit"),
    ("c5", "kiwi", "2001", "green vegetable"),
];

fn sorted_ids(searcher: &dyn Searchable, sort: Sort) -> Vec<String> {
    let options = SearchOptions::new().with_sort(sort);
    let hits = segdex::search::search(searcher, &Query::term("body", "fruit"), &options).unwrap();
    hits.docs()
        .into_iter()
        .map(|doc| searcher.document(doc).unwrap().unwrap().get("id").unwrap().to_string())
        .collect()
}

#[test]
fn sorting_by_field_values() {
    let index = catalog_index(CATALOG);
    let searcher = index.searcher().unwrap();

    // equal names fall back to doc order
    assert_eq!(sorted_ids(&searcher, Sort::by_field("name")), vec!["c2", "c4", "c3", "c1"]);
    assert_eq!(
        sorted_ids(&searcher, Sort::new([SortField::string("name").reversed()])),
        vec!["c1", "c3", "c2", "c4"]
    );
    // numeric, not lexicographic: 87 comes first
    assert_eq!(
        sorted_ids(&searcher, Sort::new([SortField::integer("year")])),
        vec!["c3", "c1", "c2", "c4"]
    );
    let name_then_newest = Sort::new([
        SortField::string("name"),
        SortField::integer("year").reversed(),
    ]);
    assert_eq!(sorted_ids(&searcher, name_then_newest), vec!["c4", "c2", "c3", "c1"]);
    assert_eq!(
        sorted_ids(&searcher, Sort::new([SortField::doc().reversed()])),
        vec!["c4", "c3", "c2", "c1"]
    );

    // relevance order and its explicit spelling agree
    let relevance = sorted_ids(&searcher, Sort::relevance());
    assert_eq!(relevance[0], "c2");
    assert_eq!(relevance, ids(&searcher, &Query::term("body", "fruit")));

    let hits = searcher
        .search(
            &Query::term("body", "fruit"),
            &SearchOptions::new()
                .with_sort(Sort::by_field("name"))
                .with_offset(1)
                .with_limit(2),
        )
        .unwrap();
    assert_eq!(hits.total_hits, 4);
    assert_eq!(
        hits.sort_values,
        vec![
            vec![SortValue::Str(Some("apple".to_string()))],
            vec![SortValue::Str(Some("melon".to_string()))],
        ]
    );
}

#[test]
fn sorting_errors_and_missing_values() {
    let index = catalog_index(CATALOG);
    let searcher = index.searcher().unwrap();
    let options = SearchOptions::new().with_sort(Sort::new([SortField::integer("name")]));
    let err = searcher.search(&Query::term("body", "fruit"), &options).unwrap_err();
    assert!(matches!(err, SegdexError::InvalidRequest(_)));

    // a field nobody has sorts every hit as missing, leaving doc order
    assert_eq!(
        sorted_ids(&searcher, Sort::by_field("nothing")),
        vec!["c1", "c2", "c3", "c4"]
    );
}

#[test]
fn multi_searcher_sorts_across_indexes() {
    let left = catalog_index(&CATALOG[..3]);
    let right = catalog_index(&CATALOG[3..]);
    let subs: Vec<Arc<dyn Searchable>> = vec![
        Arc::new(left.searcher().unwrap()),
        Arc::new(right.searcher().unwrap()),
    ];
    let multi = MultiSearcher::new(subs);

    assert_eq!(sorted_ids(&multi, Sort::by_field("name")), vec!["c2", "c4", "c3", "c1"]);
    assert_eq!(
        sorted_ids(&multi, Sort::new([SortField::doc().reversed()])),
        vec!["c4", "c3", "c2", "c1"]
    );
}
