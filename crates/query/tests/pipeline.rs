use imock_core::{Collection, Record};
use imock_query::{record_matches_search, run, ListQuery, Page};
use serde_json::{json, Value};

fn rec(v: Value) -> Record { v.as_object().cloned().unwrap_or_default() }

fn people() -> Collection {
    vec![
        rec(json!({"id": "1", "name": "Ana", "role": "admin", "age": 30})),
        rec(json!({"id": "2", "name": "Bob", "role": "user", "age": 25})),
        rec(json!({"id": "3", "name": "carla", "role": "user", "age": 41, "tags": ["Ops", "dev"]})),
        rec(json!({"id": "4", "name": "Dan", "role": "admin", "active": false})),
        rec(json!({"id": "5", "name": "Eve", "role": "user", "address": {"city": "Lima"}})),
    ]
}

fn names(items: &Collection) -> Vec<String> {
    items.iter().map(|r| r["name"].as_str().unwrap_or_default().to_string()).collect()
}

fn query(pairs: &[(&str, &str)]) -> ListQuery { ListQuery::from_pairs(pairs.iter().copied()) }

#[test]
fn no_params_returns_everything_in_insertion_order() {
    let out = run(people(), &ListQuery::default());
    assert_eq!(names(&out.items), vec!["Ana", "Bob", "carla", "Dan", "Eve"]);
    assert!(out.page.is_none());
}

#[test]
fn search_is_case_insensitive_over_any_field() {
    let out = run(people(), &query(&[("q", "AN")]));
    assert_eq!(names(&out.items), vec!["Ana", "Dan"]);

    // nested values match through their JSON text
    let out = run(people(), &query(&[("q", "lima")]));
    assert_eq!(names(&out.items), vec!["Eve"]);
    let out = run(people(), &query(&[("q", "ops")]));
    assert_eq!(names(&out.items), vec!["carla"]);
}

#[test]
fn search_totality_matches_predicate() {
    for term in ["a", "1", "USER", "false", "zzz", "4"] {
        let needle = term.to_lowercase();
        let expected: Vec<String> = people()
            .iter()
            .filter(|r| r.values().any(|v| imock_core::stringify(v).to_lowercase().contains(&needle)))
            .map(|r| r["name"].as_str().unwrap_or_default().to_string())
            .collect();
        let out = run(people(), &query(&[("q", term)]));
        assert_eq!(names(&out.items), expected, "term {term}");
        assert!(out.items.iter().all(|r| record_matches_search(r, &needle)));
    }
}

#[test]
fn filters_are_exact_and_conjunctive() {
    let out = run(people(), &query(&[("role", "user")]));
    assert_eq!(names(&out.items), vec!["Bob", "carla", "Eve"]);

    let out = run(people(), &query(&[("role", "user"), ("age", "25")]));
    assert_eq!(names(&out.items), vec!["Bob"]);

    // numbers and booleans compare through their text
    let out = run(people(), &query(&[("active", "false")]));
    assert_eq!(names(&out.items), vec!["Dan"]);

    // substring is not enough for a filter
    let out = run(people(), &query(&[("role", "adm")]));
    assert!(out.items.is_empty());

    // records lacking the field never match
    let out = run(people(), &query(&[("age", "")]));
    assert!(out.items.is_empty());
}

#[test]
fn search_runs_before_filters() {
    let out = run(people(), &query(&[("q", "a"), ("role", "admin")]));
    assert_eq!(names(&out.items), vec!["Ana", "Dan"]);
    assert_eq!(out.explain.total, 5);
    assert_eq!(out.explain.after_search, 4);
    assert_eq!(out.explain.after_filters, 2);
    assert_eq!(out.explain.returned, 2);
}

#[test]
fn sort_is_lexicographic_on_text() {
    let out = run(people(), &query(&[("_sort", "name")]));
    // uppercase sorts before lowercase
    assert_eq!(names(&out.items), vec!["Ana", "Bob", "Dan", "Eve", "carla"]);

    let out = run(people(), &query(&[("_sort", "name"), ("_order", "desc")]));
    assert_eq!(names(&out.items), vec!["carla", "Eve", "Dan", "Bob", "Ana"]);

    // numeric fields compare as strings; absent fields sort as ""
    let out = run(people(), &query(&[("_sort", "age")]));
    assert_eq!(names(&out.items), vec!["Dan", "Eve", "Bob", "Ana", "carla"]);
}

#[test]
fn unknown_order_value_defaults_to_ascending() {
    let out = run(people(), &query(&[("_sort", "id"), ("_order", "sideways")]));
    assert_eq!(names(&out.items), vec!["Ana", "Bob", "carla", "Dan", "Eve"]);
}

#[test]
fn pagination_slices_after_sort_and_reports_pre_slice_total() {
    let base = run(people(), &query(&[("_sort", "name")])).items;
    for limit in 1..=6i64 {
        for page in 1..=7i64 {
            let (p, l) = (page.to_string(), limit.to_string());
            let out = run(people(), &query(&[("_sort", "name"), ("_page", p.as_str()), ("_limit", l.as_str())]));
            let start = ((page - 1) * limit) as usize;
            let expected: Collection = if start > base.len() {
                Vec::new()
            } else {
                base[start..(start + limit as usize).min(base.len())].to_vec()
            };
            assert_eq!(out.items, expected, "page {page} limit {limit}");
            assert_eq!(out.page, Some(Page { total: 5, page, limit }));
        }
    }
}

#[test]
fn pagination_total_counts_filtered_items() {
    let out = run(people(), &query(&[("role", "user"), ("_page", "2"), ("_limit", "2")]));
    assert_eq!(names(&out.items), vec!["Eve"]);
    assert_eq!(out.page, Some(Page { total: 3, page: 2, limit: 2 }));
}

#[test]
fn limit_without_page_starts_at_first_item() {
    let out = run(people(), &query(&[("_limit", "2")]));
    assert_eq!(names(&out.items), vec!["Ana", "Bob"]);
    assert_eq!(out.page, Some(Page { total: 5, page: 0, limit: 2 }));
}

#[test]
fn page_without_limit_is_ignored() {
    let out = run(people(), &query(&[("_page", "3")]));
    assert_eq!(out.items.len(), 5);
    assert!(out.page.is_none());
}

#[test]
fn empty_collection_yields_empty_result() {
    let out = run(Vec::new(), &query(&[("q", "x"), ("_sort", "name"), ("_limit", "3")]));
    assert!(out.items.is_empty());
    assert_eq!(out.page, Some(Page { total: 0, page: 0, limit: 3 }));
}

#[test]
fn integral_floats_filter_like_integers() {
    let items = vec![
        rec(json!({"id": "a", "name": "Mug", "price": 30.0})),
        rec(json!({"id": "b", "name": "Cap", "price": 30.5})),
    ];
    let out = run(items.clone(), &query(&[("price", "30")]));
    assert_eq!(names(&out.items), vec!["Mug"]);
    let out = run(items, &query(&[("price", "30.5")]));
    assert_eq!(names(&out.items), vec!["Cap"]);
}
