use payload_diagnose::report::{DB_DATA, DB_TIME, N_EVENTS, RESIM_EVENTS, load, parse};
use tempfile::TempDir;

#[test]
fn compulsory_fields_and_error_details() {
    let doc = parse(
        r#"{"reportVersion": "2.0.0", "exitCode": 65, "exitMsg": "Non-zero return code",
            "executor": [{"logfileReport": {"details": {"ERROR": [
                {"message": "first problem"},
                {"level": "ERROR"},
                {"message": "std::bad_alloc in AthenaEventLoopMgr"}
            ]}}}]}"#,
    )
    .unwrap();
    assert_eq!(doc.exit_code(), 65);
    assert_eq!(doc.exit_msg(), "Non-zero return code");
    assert_eq!(
        doc.error_messages(),
        vec!["first problem", "std::bad_alloc in AthenaEventLoopMgr"]
    );
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let doc = parse(r#"{"executor": [{"name": "x"}]}"#).unwrap();
    assert_eq!(doc.exit_code(), 0);
    assert_eq!(doc.exit_msg(), "");
    assert!(doc.error_messages().is_empty());

    let doc = parse(r#"{"exitCode": "bad", "executor": {"logfileReport": 1}}"#).unwrap();
    assert_eq!(doc.exit_code(), 0);
    assert!(doc.error_messages().is_empty());
}

#[test]
fn work_attribute_coercion() {
    let doc = parse(r#"{"n_events": "250", "__db_time": "soon"}"#).unwrap();
    assert_eq!(doc.work_attr_u64(N_EVENTS), Some(250));
    assert_eq!(doc.work_attr_u64(DB_TIME), None);
    assert_eq!(doc.work_attr_u64("absent"), None);
}

#[test]
fn malformed_or_non_object_reports_are_absent() {
    assert!(parse("{\"exitCode\": 1,").is_none());
    assert!(parse("[1, 2, 3]").is_none());

    let tmp = TempDir::new().unwrap();
    let p = tmp.path().join("jobReport.json");
    std::fs::write(&p, "not json").unwrap();
    assert!(load(&p).is_none());
    assert!(load(&tmp.path().join("missing.json")).is_none());
}

#[test]
fn derives_attributes_from_resource_steps() {
    let doc = parse(
        r#"{"exitCode": 0,
            "resource": {"executor": {
                "EVNTtoHITS": {"nevents": 100, "dbTime": 12, "dbData": 2000},
                "HITtoRDO": {"nevents": 80, "dbTime": 3, "dbData": 500, "resimevents": 7}
            }}}"#,
    )
    .unwrap();
    assert_eq!(doc.work_attr_u64(N_EVENTS), Some(100));
    assert_eq!(doc.work_attr_u64(DB_TIME), Some(15));
    assert_eq!(doc.work_attr_u64(DB_DATA), Some(2500));
    assert_eq!(doc.work_attr_u64(RESIM_EVENTS), Some(7));
}

#[test]
fn top_level_attributes_win() {
    let doc = parse(
        r#"{"__db_time": "40",
            "resource": {"executor": {"a": {"dbTime": 12}}}}"#,
    )
    .unwrap();
    assert_eq!(doc.work_attr_u64(DB_TIME), Some(40));
}
