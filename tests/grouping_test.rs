// End-to-end: CSV import → grouping → curator edits → regrouping

use catalog_grouping::{
    editing, get_events_for_entity, insert_entities, load_entities_csv, setup_database,
    AggregationStatus, AppConfig, GroupingEngine,
};
use rusqlite::Connection;
use std::io::Write;
use std::sync::Arc;

const HEADER: &str =
    "external_id,name,category_id,category_name,manufacturer,model,country,image_url,attributes";

fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

fn imported_db(rows: &[&str]) -> Connection {
    let file = write_csv(rows);
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    insert_entities(&conn, &load_entities_csv(file.path()).unwrap()).unwrap();
    conn
}

fn lexical_engine() -> GroupingEngine {
    GroupingEngine::with_scorer(
        &AppConfig::default(),
        Arc::new(catalog_grouping::similarity::jaccard_similarity),
    )
}

#[test]
fn test_pipeline_groups_edits_and_regroups() {
    let conn = imported_db(&[
        r#"P-1,Gel pen,pens,Pens,Acme,,,,"{""color"": ""red"", ""ink"": ""gel""}""#,
        r#"P-2,Gel pen,pens,Pens,Acme,,,,"{""color"": ""red"", ""ink"": ""gel""}""#,
        r#"P-3,Gel pen,pens,Pens,Acme,,,,"{""color"": ""blue"", ""ink"": ""gel""}""#,
        r#"D-1,Cordless drill,,,Bolt,D18,,,"#,
        r#"D-2,Cordless drill,,,Bolt,D18,,,"#,
    ]);
    let engine = lexical_engine();
    let options = engine.options().with_threshold(1.01);

    let first = engine.group(&conn, &options).unwrap();
    assert!(first.is_complete());
    assert_eq!(first.groups.len(), 2);

    let pens = first.groups.iter().find(|g| g.category_id == "pens").unwrap();
    assert_eq!(pens.grouping_key, "color=red;ink=gel");
    assert_eq!(pens.member_ids.len(), 2);

    let drills = first.groups.iter().find(|g| g.category_id == "unknown").unwrap();
    assert_eq!(drills.grouping_key, "manufacturer=Bolt;model=D18");

    // Second run reuses everything
    let second = engine.group(&conn, &options).unwrap();
    assert!(second.groups.iter().all(|g| g.reused));

    // A curator edit makes the aggregation manual; regrouping then creates a new one
    let pen_aggregation = editing::get_aggregation(&conn, pens.aggregation_id).unwrap();
    editing::remove_member(&conn, pen_aggregation.id, pen_aggregation.items[1].id).unwrap();
    assert_eq!(
        editing::get_aggregation(&conn, pens.aggregation_id).unwrap().status,
        AggregationStatus::Manual
    );

    let third = engine.group(&conn, &options).unwrap();
    let regrouped = third.groups.iter().find(|g| g.category_id == "pens").unwrap();
    assert!(!regrouped.reused);
    assert_ne!(regrouped.aggregation_id, pens.aggregation_id);

    let events = get_events_for_entity(&conn, "aggregation", &pens.aggregation_id.to_string()).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(kinds.contains(&"aggregation_created"));
    assert!(kinds.contains(&"aggregation_reused"));
    assert!(kinds.contains(&"member_removed"));
}

#[test]
fn test_similar_names_merge_across_keys() {
    // Different manufacturers, near-identical names
    let conn = imported_db(&[
        "H-1,Claw hammer steel,tools,Tools,Acme,,,,",
        "H-2,Claw hammer steel,tools,Tools,Bolt,,,,",
        "S-1,Hand saw,tools,Tools,Cutter,,,,",
    ]);
    let engine = lexical_engine();

    let merged = engine
        .group(&conn, &engine.options().with_threshold(0.9).with_size_bounds(1, 50))
        .unwrap();
    let unmerged = engine
        .plan(&conn, &engine.options().with_threshold(1.01).with_size_bounds(1, 50))
        .unwrap();

    assert_eq!(merged.groups.len(), 2);
    assert_eq!(merged.groups[0].member_ids.len(), 2);
    assert_eq!(unmerged.len(), 3);
}
