#![allow(missing_docs)]

use std::sync::Arc;

use catgraph::{
    builder::{build_sorted, Edge},
    jobs::{Job, Worker},
    query::{MemorySink, QueryKind, QueryRequest, TagCategory, TagIndex},
    GraphStore,
};

// 1 -> {2, 3}; 2 holds file 100; 3 holds files 100 and 101.
fn sample() -> GraphStore {
    build_sorted([
        Edge::subcat(2, 1),
        Edge::subcat(3, 1),
        Edge::file(100, 2),
        Edge::file(100, 3),
        Edge::file(101, 3),
    ])
    .expect("build sample")
}

fn execute_with(store: GraphStore, tags: TagIndex, request: QueryRequest) -> Vec<String> {
    let query = request.validate(&store).expect("valid query");
    let store = Arc::new(store);
    let mut worker = Worker::new(store, Arc::new(tags), 16, 50);
    let sink = MemorySink::new();
    let job = Job::detached(query, Arc::new(sink.clone()));
    worker.execute(&job).expect("execute");
    sink.rendered()
}

fn execute(store: GraphStore, request: QueryRequest) -> Vec<String> {
    let tags = TagIndex::empty(store.max_node());
    execute_with(store, tags, request)
}

fn two(kind: Option<QueryKind>, c1: i64, c2: i64) -> QueryRequest {
    QueryRequest {
        c2: Some(c2),
        kind,
        ..QueryRequest::new(c1)
    }
}

#[test]
fn list_streams_all_reachable_files() {
    let lines = execute(sample(), QueryRequest::new(1));
    assert_eq!(
        lines,
        vec![
            "COMPUTE_START",
            "RESULT 100,1,0|101,1,0",
            "OUTOF 2",
            "DBAGE 0",
            "DONE"
        ]
    );
}

#[test]
fn and_keeps_files_under_both_categories() {
    let lines = execute(sample(), two(None, 2, 3));
    assert_eq!(lines[1], "RESULT 100,0,0");
    assert_eq!(lines[2], "OUTOF 1");
    assert_eq!(lines.last().map(String::as_str), Some("DONE"));
}

#[test]
fn not_removes_files_of_the_second_category() {
    let lines = execute(sample(), two(Some(QueryKind::Not), 3, 2));
    assert_eq!(&lines[1..3], ["RESULT 101,0,0", "OUTOF 1"]);
}

#[test]
fn and_adds_depth_from_both_sides() {
    let lines = execute(sample(), two(None, 1, 3));
    // 100 and 101 are at depth 1 under 1 and depth 0 under 3
    assert_eq!(lines[1], "RESULT 100,1,0|101,1,0");
}

#[test]
fn cyclic_graph_terminates() {
    let store = build_sorted([Edge::subcat(2, 1), Edge::subcat(1, 2), Edge::file(5, 2)])
        .expect("build cycle");
    let lines = execute(store, QueryRequest::new(1));
    assert_eq!(&lines[1..3], ["RESULT 5,1,0", "OUTOF 1"]);
}

#[test]
fn list_pages_through_files() {
    let store = build_sorted((10..20).map(|file| Edge::file(file, 1))).expect("build");
    let request = QueryRequest {
        offset: 3,
        size: 4,
        ..QueryRequest::new(1)
    };
    let lines = execute(store, request);
    assert_eq!(
        &lines[1..3],
        ["RESULT 13,0,0|14,0,0|15,0,0|16,0,0", "OUTOF 10"]
    );
}

#[test]
fn adjacent_windows_cover_the_full_list() {
    // 1 -> 10..17, each holding five files
    let subcats = (0..7).map(|sub| Edge::subcat(10 + sub, 1));
    let files = (0..7).flat_map(|sub| (0..5).map(move |f| Edge::file(100 + sub * 5 + f, 10 + sub)));
    let store = build_sorted(subcats.chain(files)).expect("build");
    let request = QueryRequest {
        size: 1000,
        ..QueryRequest::new(1)
    };
    let full = execute(store.clone(), request);
    let mut paged = Vec::new();
    for offset in (0..35).step_by(4) {
        let request = QueryRequest {
            offset,
            size: 4,
            ..QueryRequest::new(1)
        };
        let lines = execute(store.clone(), request);
        assert_eq!(lines[2], "OUTOF 35");
        paged.extend(lines[1].trim_start_matches("RESULT ").split('|').map(str::to_string));
    }
    let full: Vec<String> = full[1]
        .trim_start_matches("RESULT ")
        .split('|')
        .map(str::to_string)
        .collect();
    assert_eq!(full.len(), 35);
    assert_eq!(paged, full);
}

#[test]
fn offset_past_end_emits_only_the_total() {
    let request = QueryRequest {
        offset: 50,
        ..QueryRequest::new(1)
    };
    let lines = execute(sample(), request);
    assert_eq!(lines, vec!["COMPUTE_START", "OUTOF 2", "DBAGE 0", "DONE"]);
}

#[test]
fn path_lists_every_hop() {
    let request = two(Some(QueryKind::Path), 1, 101);
    let lines = execute(sample(), request);
    assert_eq!(
        lines,
        vec![
            "COMPUTE_START",
            "RESULT 1,0,0|3,1,0|101,2,0",
            "DBAGE 0",
            "DONE"
        ]
    );
}

#[test]
fn missing_path_reports_nopath() {
    let lines = execute(sample(), two(Some(QueryKind::Path), 2, 3));
    assert_eq!(lines, vec!["COMPUTE_START", "NOPATH", "DBAGE 0", "DONE"]);
}

#[test]
fn fqv_orders_by_tag_and_estimates_truncated_totals() {
    let categories = [
        TagCategory {
            category: 2,
            depth: -1,
            tag: 1,
        },
        TagCategory {
            category: 3,
            depth: -1,
            tag: 2,
        },
    ];
    let store = sample();
    let tags = TagIndex::build(&store, &categories).expect("tag index");
    let request = QueryRequest {
        kind: Some(QueryKind::Fqv),
        ..QueryRequest::new(1)
    };
    let lines = execute_with(store.clone(), tags.clone(), request.clone());
    assert_eq!(&lines[1..3], ["RESULT 100,1,1|101,1,2", "OUTOF 2"]);

    let paged = QueryRequest { size: 1, ..request };
    let lines = execute_with(store, tags, paged);
    assert_eq!(&lines[1..3], ["RESULT 100,1,1", "OUTOF 4"]);
}

#[test]
fn tags_annotate_list_results() {
    let store = sample();
    let tags = TagIndex::build(
        &store,
        &[TagCategory {
            category: 3,
            depth: 0,
            tag: 1,
        }],
    )
    .expect("tag index");
    let lines = execute_with(store, tags, QueryRequest::new(1));
    assert_eq!(lines[1], "RESULT 100,1,1|101,1,1");
}
