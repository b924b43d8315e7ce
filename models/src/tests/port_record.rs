use crate::PortRecord;

/// **VALUE**: Verifies the on-disk shape of an empty record.
///
/// **WHY THIS MATTERS**: Workers written against the original file format expect
/// `{}` when the host is not running, not `{"port": null}`.
#[test]
fn given_empty_record_when_serialized_then_produces_empty_object() {
    // GIVEN: An empty record
    let record = PortRecord::empty();

    // WHEN: Serializing
    let json = serde_json::to_string(&record).unwrap();

    // THEN: Empty object
    assert_eq!(json, "{}");
}

#[test]
fn given_running_record_when_serialized_then_contains_port() {
    let json = serde_json::to_string(&PortRecord::running(51234)).unwrap();

    assert_eq!(json, r#"{"port":51234}"#);
}

#[test]
fn given_empty_object_when_deserialized_then_port_is_none() {
    let record: PortRecord = serde_json::from_str("{}").unwrap();

    assert_eq!(record, PortRecord::empty());
}
