//! Instrumentation assertions: which plan steps actually ran, which index
//! and join kind were chosen, which aggregation mode executed.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tetradb::{
    CollectingSink, Database, EventSink, Fact, Identity, Keyword, PlannerOptions, Value,
};

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

fn observed_db(options: PlannerOptions) -> (Database, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let db = Database::with_options(options).with_sink(Arc::clone(&sink) as Arc<dyn EventSink>);
    (db, sink)
}

fn seed_users(db: &Database) {
    db.transact(vec![
        fact("alice", ":user/name", Value::from("Alice")),
        fact("bob", ":user/name", Value::from("Bob")),
        fact("alice", ":user/age", Value::Int64(30)),
        fact("bob", ":user/age", Value::Int64(25)),
    ])
    .expect("transact");
}

#[test]
fn test_lifecycle_events_in_order() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);

    db.q("[:find ?n :where [?e :user/name ?n]]", vec![])
        .expect("query");

    let names: Vec<&str> = sink.events().iter().map(|e| e.name).collect();
    let plan_idx = names
        .iter()
        .position(|n| *n == "query/plan-created")
        .expect("plan event");
    let complete_idx = names
        .iter()
        .position(|n| *n == "query/complete")
        .expect("complete event");
    assert!(plan_idx < complete_idx);
    assert_eq!(sink.count("phase/begin"), sink.count("phase/complete"));
    assert!(sink.count("pattern/match") >= 1);
}

#[test]
fn test_pattern_match_reports_chosen_index() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);

    db.q("[:find ?n :where [?e :user/name ?n]]", vec![])
        .expect("query");

    let matches = sink.named("pattern/match");
    assert_eq!(matches.len(), 1);
    // constant attribute, free E and V: AEVT with a prefix of 1
    assert_eq!(matches[0].field("index"), Some(&json!("aevt")));
    assert_eq!(matches[0].field("prefix"), Some(&json!(1)));
    assert_eq!(matches[0].field("bound"), Some(&json!("-a--")));
}

#[test]
fn test_prefix_length_equals_maximal_bound_prefix() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);

    // A and V bound: AVET, prefix 2
    db.q("[:find ?e :where [?e :user/age 30]]", vec![])
        .expect("query");
    let matches = sink.named("pattern/match");
    assert_eq!(matches[0].field("index"), Some(&json!("avet")));
    assert_eq!(matches[0].field("prefix"), Some(&json!(2)));
}

#[test]
fn test_pushed_constraint_skips_post_filter() {
    let (db, sink) = observed_db(PlannerOptions::default());
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
    assert_eq!(rel.size(), Some(1));

    // the predicate ran inside the matcher, not as a post-realization filter
    assert_eq!(sink.count("filter/predicate"), 0);
    let matches = sink.named("pattern/match");
    assert_eq!(matches[0].field("constraints"), Some(&json!(1)));
}

#[test]
fn test_unrelated_binding_opens_one_cursor() {
    let (db, sink) = observed_db(PlannerOptions::default());
    db.transact(vec![
        fact("p1", ":price/minute-of-day", Value::Int64(570)),
        fact("p2", ":price/minute-of-day", Value::Int64(580)),
    ])
    .expect("transact");

    let inputs = vec![
        tetradb::QueryInput::Database,
        tetradb::QueryInput::Relation((0..40).map(|i| vec![Value::Int64(i)]).collect()),
    ];
    db.q(
        "[:find ?e ?s :in $ [[?s] ...] :where [?e :price/minute-of-day 570]]",
        inputs,
    )
    .expect("query");

    let matches = sink.named("pattern/match");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].field("cursors"), Some(&json!(1)));
}

#[test]
fn test_join_kind_reported() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);

    db.q(
        "[:find ?n ?a :where [?e :user/name ?n] [?e :user/age ?a]]",
        vec![],
    )
    .expect("query");

    let joins = sink.count("join/hash")
        + sink.count("join/nested-loop")
        + sink.count("join/merge");
    assert!(joins >= 1);
}

#[test]
fn test_aggregation_mode_materialized_below_threshold() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);

    db.q("[:find (count ?e) :where [?e :user/age ?a]]", vec![])
        .expect("query");

    let events = sink.named("aggregation/executed");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("mode"), Some(&json!("materialized")));
}

#[test]
fn test_aggregation_mode_streaming_above_threshold() {
    let options = PlannerOptions {
        streaming_aggregation_threshold: 10,
        ..PlannerOptions::default()
    };
    let (db, sink) = observed_db(options);
    let facts: Vec<Fact> = (0..50)
        .map(|i| fact(&format!("e{i}"), ":m/v", Value::Int64(i)))
        .collect();
    db.transact(facts).expect("transact");

    let rel = db
        .q("[:find (sum ?v) :where [?e :m/v ?v]]", vec![])
        .expect("query");
    assert_eq!(rel.rows().expect("rows"), &[vec![Value::Int64((0..50).sum())]]);

    let events = sink.named("aggregation/executed");
    assert_eq!(events[0].field("mode"), Some(&json!("streaming")));
}

#[test]
fn test_streaming_and_materialized_agree() {
    let run = |threshold: usize| {
        let options = PlannerOptions {
            streaming_aggregation_threshold: threshold,
            ..PlannerOptions::default()
        };
        let db = Database::with_options(options);
        let facts: Vec<Fact> = (0..30)
            .map(|i| {
                fact(
                    &format!("e{i}"),
                    ":m/v",
                    if i % 2 == 0 {
                        Value::Int64(i)
                    } else {
                        Value::Float64(i as f64 / 2.0)
                    },
                )
            })
            .collect();
        db.transact(facts).expect("transact");
        let rel = db
            .q(
                "[:find (sum ?v) (min ?v) (max ?v) (avg ?v) (count ?e) :where [?e :m/v ?v]]",
                vec![],
            )
            .expect("query");
        rel.rows().expect("rows").to_vec()
    };

    // threshold 1 forces streaming; usize::MAX forces materialized
    assert_eq!(run(1), run(usize::MAX));
}

#[test]
fn test_no_subquery_dispatch_for_empty_inputs() {
    let (db, sink) = observed_db(PlannerOptions::default());
    db.transact(vec![fact("only", ":other/attr", Value::Int64(1))])
        .expect("transact");

    db.q(
        "[:find ?t ?mh :where [?s :symbol/ticker ?t] \
         [(q [:find (max ?h) :in $ ?p :where [?x :price/symbol ?p] [?x :price/high ?h]] $ ?s) [[?mh]]]]",
        vec![],
    )
    .expect("query");

    assert_eq!(sink.count("subquery/execute"), 0);
}

#[test]
fn test_subquery_dispatch_reported() {
    let (db, sink) = observed_db(PlannerOptions {
        parallel_decorrelation: false,
        ..PlannerOptions::default()
    });
    db.transact(vec![
        fact("s_AAPL", ":symbol/ticker", Value::from("AAPL")),
        fact("b1", ":price/symbol", Value::identity("s_AAPL")),
        fact("b1", ":price/high", Value::Float64(150.0)),
    ])
    .expect("transact");

    db.q(
        "[:find ?t ?mh :where [?s :symbol/ticker ?t] \
         [(q [:find (max ?h) :in $ ?p :where [?x :price/symbol ?p] [?x :price/high ?h]] $ ?s) [[?mh]]]]",
        vec![],
    )
    .expect("query");

    let events = sink.named("subquery/execute");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("inputs"), Some(&json!(1)));
    assert_eq!(events[0].field("parallel"), Some(&json!(false)));
}

#[test]
fn test_plan_string_rendered() {
    let (db, sink) = observed_db(PlannerOptions::default());
    seed_users(&db);
    db.q(
        "[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a 26)]]",
        vec![],
    )
    .expect("query");

    let plans = sink.named("query/plan-created");
    assert_eq!(plans.len(), 1);
    let rendered = plans[0].field("plan").expect("plan field").to_string();
    assert!(rendered.contains("phase 0"));
    assert!(rendered.contains("push"));
}
