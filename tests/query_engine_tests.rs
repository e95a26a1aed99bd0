//! End-to-end query engine tests: parse → plan → execute against the
//! in-memory store.

use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use tetradb::{Database, Fact, Identity, Keyword, QueryInput, Value};

fn fact(e: &str, a: &str, v: Value) -> Fact {
    let trimmed = a.trim_start_matches(':');
    let (ns, name) = trimmed.split_once('/').unwrap_or(("", trimmed));
    let keyword = if ns.is_empty() {
        Keyword::parse(&format!(":{name}")).expect("keyword")
    } else {
        Keyword::new(ns, name)
    };
    (Identity::from_name(e), keyword, v)
}

fn user_db() -> Database {
    let db = Database::new();
    db.transact(vec![
        fact("alice", ":user/name", Value::from("Alice")),
        fact("bob", ":user/name", Value::from("Bob")),
        fact("alice", ":user/age", Value::Int64(30)),
        fact("bob", ":user/age", Value::Int64(25)),
    ])
    .expect("transact");
    db
}

fn price_db() -> Database {
    let db = Database::new();
    db.transact(vec![
        fact("s_AAPL", ":symbol/ticker", Value::from("AAPL")),
        fact("b1", ":price/symbol", Value::identity("s_AAPL")),
        fact("b1", ":price/high", Value::Float64(150.0)),
        fact("b2", ":price/symbol", Value::identity("s_AAPL")),
        fact("b2", ":price/high", Value::Float64(155.0)),
    ])
    .expect("transact");
    db
}

fn single_column_set(rel: &tetradb::Relation) -> BTreeSet<Value> {
    rel.rows()
        .expect("rows")
        .iter()
        .map(|t| t[0].clone())
        .collect()
}

#[test]
fn test_scenario_find_names() {
    let db = user_db();
    let rel = db
        .q("[:find ?n :where [?e :user/name ?n]]", vec![])
        .expect("query");
    assert_eq!(
        single_column_set(&rel),
        BTreeSet::from([Value::from("Alice"), Value::from("Bob")])
    );
}

#[test]
fn test_scenario_join_with_filter() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a 26)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(single_column_set(&rel), BTreeSet::from([Value::from("Alice")]));
}

#[test]
fn test_scenario_max_aggregate() {
    let db = price_db();
    let rel = db
        .q(
            "[:find (max ?h) :where [?s :symbol/ticker \"AAPL\"] [?p :price/symbol ?s] [?p :price/high ?h]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.rows().expect("rows"), &[vec![Value::Float64(155.0)]]);
}

#[test]
fn test_scenario_min_and_count_aggregates() {
    let db = price_db();
    let rel = db
        .q(
            "[:find (min ?h) :where [?s :symbol/ticker \"AAPL\"] [?p :price/symbol ?s] [?p :price/high ?h]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.rows().expect("rows"), &[vec![Value::Float64(150.0)]]);

    let rel = db
        .q(
            "[:find (count ?p) :where [?s :symbol/ticker \"AAPL\"] [?p :price/symbol ?s] [?p :price/high ?h]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.rows().expect("rows"), &[vec![Value::Int64(2)]]);
}

#[test]
fn test_scenario_day_extraction() {
    let db = Database::new();
    db.transact(vec![
        fact(
            "x",
            ":t",
            Value::Time(Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap()),
        ),
        fact(
            "y",
            ":t",
            Value::Time(Utc.with_ymd_and_hms(2025, 6, 3, 11, 0, 0).unwrap()),
        ),
    ])
    .expect("transact");

    let rel = db
        .q("[:find ?e :where [?e :t ?t] [(= (day ?t) 2)]]", vec![])
        .expect("query");
    assert_eq!(
        single_column_set(&rel),
        BTreeSet::from([Value::identity("x")])
    );
}

#[test]
fn test_scalar_and_collection_inputs() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :in $ ?a :where [?e :user/age ?a] [?e :user/name ?n]]",
            vec![QueryInput::Database, QueryInput::Scalar(Value::Int64(25))],
        )
        .expect("query");
    assert_eq!(single_column_set(&rel), BTreeSet::from([Value::from("Bob")]));

    let rel = db
        .q(
            "[:find ?n :in $ [?a ...] :where [?e :user/age ?a] [?e :user/name ?n]]",
            vec![
                QueryInput::Database,
                QueryInput::Collection(vec![Value::Int64(25), Value::Int64(30)]),
            ],
        )
        .expect("query");
    assert_eq!(
        single_column_set(&rel),
        BTreeSet::from([Value::from("Alice"), Value::from("Bob")])
    );
}

#[test]
fn test_relation_input() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n ?tag :in $ [[?n ?tag] ...] :where [?e :user/name ?n]]",
            vec![
                QueryInput::Database,
                QueryInput::Relation(vec![
                    vec![Value::from("Alice"), Value::from("keep")],
                    vec![Value::from("Zed"), Value::from("drop")],
                ]),
            ],
        )
        .expect("query");
    let rows = rel.rows().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], vec![Value::from("Alice"), Value::from("keep")]);
}

#[test]
fn test_expression_binding() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n ?next :where [?e :user/name ?n] [?e :user/age ?a] [(+ ?a 1) ?next]]",
            vec![],
        )
        .expect("query");
    let rows: BTreeSet<Vec<Value>> = rel.rows().expect("rows").iter().cloned().collect();
    assert!(rows.contains(&vec![Value::from("Alice"), Value::Int64(31)]));
    assert!(rows.contains(&vec![Value::from("Bob"), Value::Int64(26)]));
}

#[test]
fn test_string_function_predicate() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [(str/starts-with? ?n \"Al\")]]",
            vec![],
        )
        .expect("query");
    assert_eq!(single_column_set(&rel), BTreeSet::from([Value::from("Alice")]));
}

#[test]
fn test_order_by_directions() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n ?a :where [?e :user/name ?n] [?e :user/age ?a] :order-by [(desc ?a)]]",
            vec![],
        )
        .expect("query");
    let rows = rel.rows().expect("rows");
    assert_eq!(rows[0][0], Value::from("Alice"));
    assert_eq!(rows[1][0], Value::from("Bob"));
}

#[test]
fn test_subquery_per_ticker_max() {
    let db = price_db();
    db.transact(vec![
        fact("s_MSFT", ":symbol/ticker", Value::from("MSFT")),
        fact("b3", ":price/symbol", Value::identity("s_MSFT")),
        fact("b3", ":price/high", Value::Float64(420.0)),
    ])
    .expect("transact");

    let rel = db
        .q(
            "[:find ?t ?mh :where [?s :symbol/ticker ?t] \
             [(q [:find (max ?h) :in $ ?p :where [?x :price/symbol ?p] [?x :price/high ?h]] $ ?s) [[?mh]]]]",
            vec![],
        )
        .expect("query");
    let rows: BTreeSet<Vec<Value>> = rel.rows().expect("rows").iter().cloned().collect();
    assert!(rows.contains(&vec![Value::from("AAPL"), Value::Float64(155.0)]));
    assert!(rows.contains(&vec![Value::from("MSFT"), Value::Float64(420.0)]));
}

#[test]
fn test_subquery_over_empty_outer_is_empty() {
    let db = Database::new();
    db.transact(vec![fact("only", ":other/attr", Value::Int64(1))])
        .expect("transact");

    let rel = db
        .q(
            "[:find ?t ?mh :where [?s :symbol/ticker ?t] \
             [(q [:find (max ?h) :in $ ?p :where [?x :price/symbol ?p] [?x :price/high ?h]] $ ?s) [[?mh]]]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.size(), Some(0));
}

#[test]
fn test_ground_and_missing() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [(ground ?n)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.size(), Some(2));

    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [(missing ?zzz)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.size(), Some(2));
}

#[test]
fn test_chained_comparison() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(< 20 ?a 28)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(single_column_set(&rel), BTreeSet::from([Value::from("Bob")]));
}

#[test]
fn test_incomparable_comparison_is_false() {
    let db = user_db();
    let rel = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [(> ?n 5)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(rel.size(), Some(0));
}

#[test]
fn test_running_twice_is_deterministic() {
    let db = price_db();
    let src = "[:find ?p ?h :where [?p :price/high ?h]]";
    let a = db.q(src, vec![]).expect("query");
    let b = db.q(src, vec![]).expect("query");
    let mut ra = a.rows().expect("rows").to_vec();
    let mut rb = b.rows().expect("rows").to_vec();
    ra.sort();
    rb.sort();
    assert_eq!(ra, rb);
}

#[test]
fn test_empty_store_yields_empty() {
    let db = Database::new();
    let rel = db
        .q("[:find ?n :where [?e :user/name ?n]]", vec![])
        .expect("query");
    assert_eq!(rel.size(), Some(0));

    // aggregates over empty input are empty, not zero-rows
    let rel = db
        .q("[:find (count ?e) :where [?e :user/name ?n]]", vec![])
        .expect("query");
    assert_eq!(rel.size(), Some(0));
}

#[test]
fn test_identity_round_trip_through_storage() {
    let db = Database::new();
    db.transact(vec![fact("alice", ":user/name", Value::from("Alice"))])
        .expect("transact");

    let rel = db
        .q("[:find ?e :where [?e :user/name \"Alice\"]]", vec![])
        .expect("query");
    let from_storage = &rel.rows().expect("rows")[0][0];
    // decoded identity equals and ptr-interns to the minted one
    assert_eq!(*from_storage, Value::identity("alice"));
    match (from_storage, Value::identity("alice")) {
        (Value::Identity(a), Value::Identity(b)) => {
            assert!(std::sync::Arc::ptr_eq(a, &b));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_cancellation_surfaces() {
    let db = user_db();
    let query = tetradb::parse_query("[:find ?n :where [?e :user/name ?n]]").expect("parse");
    let ctx = tetradb::QueryContext::new();
    ctx.cancel_handle().cancel();
    let err = db.q_with_context(&query, vec![], &ctx).unwrap_err();
    assert!(matches!(
        err.root(),
        tetradb::QueryError::Cancelled { .. }
    ));
}

#[test]
fn test_validation_before_execution() {
    let db = user_db();
    // unknown function
    assert!(db
        .q("[:find ?n :where [?e :user/name ?n] [(frob ?n)]]", vec![])
        .is_err());
    // unbound find variable
    assert!(db.q("[:find ?zzz :where [?e :user/name ?n]]", vec![]).is_err());
    // wrong input count
    assert!(db
        .q("[:find ?n :in $ ?x :where [?e :user/name ?n]]", vec![])
        .is_err());
}

#[test]
fn test_time_range_composition_end_to_end() {
    let db = Database::new();
    db.transact(vec![
        fact(
            "in-range",
            ":event/at",
            Value::Time(Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()),
        ),
        fact(
            "same-day-other-year",
            ":event/at",
            Value::Time(Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap()),
        ),
        fact(
            "other-day",
            ":event/at",
            Value::Time(Utc.with_ymd_and_hms(2025, 6, 5, 8, 0, 0).unwrap()),
        ),
    ])
    .expect("transact");

    let rel = db
        .q(
            "[:find ?e :where [?e :event/at ?t] [(= (year ?t) 2025)] [(= (month ?t) 6)] [(= (day ?t) 2)]]",
            vec![],
        )
        .expect("query");
    assert_eq!(
        single_column_set(&rel),
        BTreeSet::from([Value::identity("in-range")])
    );
}

#[test]
fn test_pushdown_equivalence() {
    // the pushed form and an unpushable equivalent drop the same tuples
    let db = user_db();
    let pushed = db
        .q(
            "[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a 26)]]",
            vec![],
        )
        .expect("query");
    let unpushed = db
        .q(
            "[:find ?n :in $ ?lim :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a ?lim)]]",
            vec![QueryInput::Database, QueryInput::Scalar(Value::Int64(26))],
        )
        .expect("query");
    assert_eq!(
        single_column_set(&pushed),
        single_column_set(&unpushed)
    );
}
