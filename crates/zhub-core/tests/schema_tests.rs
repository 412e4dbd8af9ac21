//! Cluster database loading and schema-driven decoding tests

use zhub_core::{
    codec, AnyType, ClusterDb, Context, DataType, ErrorKind, ObjectType, Value,
};

const BASIC_DB: &str = r#"
global commands
{
	0x0A "Report attributes"
	{
		repeated "attributes"
		{
			attribute "Attribute identifier"
			variant "data"
		}
	}
}
0x0000 "Basic"
{
	attributes
	{
		0x0000 "ZCLVersion"
		0x0001 "ApplicationVersion"
	}
}
0x0001 "Power Configuration"
0x0002 "Device Temperature Configuration"
"#;

const ON_OFF_DB: &str = r#"
global
{
	commands
	{
		0x0A "Report attributes"
		{
			repeated:object "reports"
			{
				attribId "attribute"
				variant "data"
			}
		}
	}
}
0x0006 "On/Off"
{
	attributes
	{
		0x0000 "OnOff" { type bool }
		0x4003 "StartUpOnOff" { type enum8 }
	}
	commands in
	{
		0x00 "Off"
		0x01 "On"
		0x02 "Toggle"
	}
	commands out
	{
		0x40 "Off with effect"
		{
			enum8 "effect"
			uint8 "variant"
		}
	}
}
"#;

fn load(text: &str) -> ClusterDb {
    ClusterDb::load(text).expect("schema failed to load")
}

#[test]
fn test_cluster_by_name_and_id() {
    let db = load(BASIC_DB);

    let found = db.cluster_by_name("Power Configuration").unwrap();
    assert_eq!(found.id, 0x0001);

    let found = db.cluster_by_id(0x0001).unwrap();
    assert_eq!(found.name, "Power Configuration");

    assert!(db.cluster_by_id(0x0003).is_none());
    assert_eq!(db.clusters().count(), 3);
}

#[test]
fn test_attribute_by_id() {
    let db = load(BASIC_DB);
    let basic = db.cluster_by_id(0x0000).unwrap();
    let attr = basic.attribute_by_id(0x0001).unwrap();
    assert_eq!(attr.name, "ApplicationVersion");
    assert_eq!(attr.datatype, None);
}

#[test]
fn test_report_attributes_arguments() {
    let db = load(BASIC_DB);
    let cmd = db.global_command_by_id(0x0a).unwrap();
    assert_eq!(cmd.payload.len(), 1);

    let AnyType::GreedyRepeated(inner) = &cmd.payload.properties[0].ty else {
        panic!("first argument is not repeated");
    };
    let AnyType::Object(record) = inner.as_ref() else {
        panic!("repeated element is not an object");
    };
    assert_eq!(record.properties.len(), 2);
    assert_eq!(record.properties[0].ty, AnyType::DataType(DataType::AttribId));
    assert_eq!(record.properties[1].ty, AnyType::Variant);
    assert!(db.global_command_by_name("Report attributes").is_some());
}

#[test]
fn test_typed_attributes() {
    let db = load(ON_OFF_DB);
    let on_off = db.cluster_by_name("On/Off").unwrap();
    assert_eq!(on_off.attribute_by_name("OnOff").unwrap().datatype, Some(DataType::Bool));
    assert_eq!(
        on_off.attribute_by_id(0x4003).unwrap().datatype,
        Some(DataType::Enum8)
    );
    assert_eq!(on_off.command_in_by_id(0x02).unwrap().name, "Toggle");
    assert!(on_off.command_in_by_name("Off").unwrap().payload.is_empty());
}

#[test]
fn test_report_decodes_attribute_names() {
    let db = load(ON_OFF_DB);
    let cluster = db.cluster_by_id(0x0006).unwrap();
    let report = db.global_command_by_id(0x0a).unwrap();
    let ctx = Context::with_cluster(cluster);

    let payload = [0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x10, 0x00];
    let decoded = report.decode_payload(&ctx, &payload).unwrap();

    let reports = decoded.get("reports").and_then(Value::as_array).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].get("attribute"), Some(&Value::from("OnOff")));
    assert_eq!(reports[0].get("data"), Some(&Value::variant("bool", true)));
    assert_eq!(reports[1].get("attribute"), Some(&Value::from("OnOff")));
    assert_eq!(reports[1].get("data"), Some(&Value::variant("bool", false)));

    let encoded = report.encode_payload(&ctx, &decoded).unwrap();
    assert_eq!(&encoded[..], &payload);
}

#[test]
fn test_unknown_attribute_id_stays_numeric() {
    let db = load(ON_OFF_DB);
    let cluster = db.cluster_by_id(0x0006).unwrap();
    let ty = AnyType::DataType(DataType::AttribId);
    let value = codec::decode_all(&Context::with_cluster(cluster), &ty, &[0x34, 0x12]).unwrap();
    assert_eq!(value, Value::Int(0x1234));

    let err = codec::encode_to_bytes(&Context::with_cluster(cluster), &ty, &Value::from("Level"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encode);
    assert!(err.to_string().contains("Level"));
}

#[test]
fn test_command_out_prefers_global() {
    let db = load(ON_OFF_DB);

    let (is_global, cmd) = db.command_out_by_name(0x0006, "Report attributes").unwrap();
    assert!(is_global);
    assert_eq!(cmd.id, 0x0a);

    let (is_global, cmd) = db.command_out_by_name(0x0006, "Off with effect").unwrap();
    assert!(!is_global);
    assert_eq!(cmd.id, 0x40);

    // inbound-only commands are not offered for sending
    assert!(db.command_out_by_name(0x0006, "Toggle").is_none());
    assert!(db.command_out_by_name(0x0300, "Off with effect").is_none());
}

#[test]
fn test_encode_cluster_command() {
    let db = load(ON_OFF_DB);
    let (_, cmd) = db.command_out_by_name(0x0006, "Off with effect").unwrap();
    let bytes = cmd
        .encode_payload(&Context::new(), &Value::map([("effect", 0), ("variant", 1)]))
        .unwrap();
    assert_eq!(&bytes[..], &[0x00, 0x01]);
}

const SHIPPED_DB: &str = include_str!("../../../config/clusters.info");

#[test]
fn test_read_attributes_response_with_failed_records() {
    let db = load(SHIPPED_DB);
    let cluster = db.cluster_by_name("On/Off").unwrap();
    let response = db.global_command_by_name("Read attributes response").unwrap();
    let ctx = Context::with_cluster(cluster);

    let payload = [
        0x00, 0x00, 0x00, 0x10, 0x01, // OnOff: success, bool true
        0x03, 0x40, 0x86, // StartUpOnOff: unsupported attribute
        0x01, 0x40, 0x00, 0x21, 0x0a, 0x00, // OnTime: success, uint16 10
    ];
    let decoded = response.decode_payload(&ctx, &payload).unwrap();

    let records = decoded.get("records").and_then(Value::as_array).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("attribute"), Some(&Value::from("OnOff")));
    assert_eq!(
        records[0].get("result"),
        Some(&Value::map([
            ("status", Value::from(0u8)),
            ("value", Value::variant("bool", true)),
        ]))
    );
    assert_eq!(records[1].get("attribute"), Some(&Value::from("StartUpOnOff")));
    assert_eq!(
        records[1].get("result"),
        Some(&Value::map([("status", Value::from(0x86u8))]))
    );
    assert_eq!(
        records[2].get("result").and_then(|r| r.get("value")),
        Some(&Value::variant("uint16", 10))
    );

    let encoded = response.encode_payload(&ctx, &decoded).unwrap();
    assert_eq!(&encoded[..], &payload);
}

#[test]
fn test_error_or_keyword() {
    let db = load(
        r#"
global commands
{
	0x01 "Read attributes response"
	{
		repeated:object "records"
		{
			attribId "attribute"
			error_or:variant "result"
		}
	}
}
"#,
    );
    let cmd = db.global_command_by_id(0x01).unwrap();
    let AnyType::GreedyRepeated(inner) = &cmd.payload.properties[0].ty else {
        panic!("records are not repeated");
    };
    let AnyType::Object(record) = inner.as_ref() else {
        panic!("record is not an object");
    };
    assert_eq!(record.properties[1].ty, AnyType::error_or(AnyType::Variant));

    // a record without a status encodes as success
    let value = Value::map([(
        "records",
        Value::Array(vec![Value::map([
            ("attribute", Value::from(5u16)),
            ("result", Value::map([("value", Value::variant("uint8", 7))])),
        ])]),
    )]);
    let bytes = cmd.encode_payload(&Context::new(), &value).unwrap();
    assert_eq!(&bytes[..], &[0x05, 0x00, 0x00, 0x20, 0x07]);
}

fn schema_error(text: &str) -> String {
    let err = ClusterDb::load(text).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    err.to_string()
}

#[test]
fn test_unknown_type_names_token_and_owner() {
    let msg = schema_error("global commands { 0x01 \"Cmd\" { float \"x\" } }");
    assert!(msg.contains("'float'"), "{}", msg);
    assert!(msg.contains("'Cmd'"), "{}", msg);

    // keywords are case-exact
    let msg = schema_error("global commands { 0x01 \"Cmd\" { Uint8 \"x\" } }");
    assert!(msg.contains("'Uint8'"), "{}", msg);
}

#[test]
fn test_out_of_range_ids() {
    let msg = schema_error("0x10000 \"Too big\"");
    assert!(msg.contains("0x10000"), "{}", msg);
    let msg = schema_error("global commands { 0x100 \"Wide\" }");
    assert!(msg.contains("0x100"), "{}", msg);
    let msg = schema_error("0x0006 \"On/Off\" { attributes { 65536 \"X\" } }");
    assert!(msg.contains("65536"), "{}", msg);
    schema_error("0x06zz \"Garbage\"");
}

#[test]
fn test_duplicates_abort_load() {
    let msg = schema_error("0x0006 \"A\"\n0x0006 \"B\"");
    assert!(msg.contains("duplicate id"), "{}", msg);
    schema_error("0x0006 \"A\"\n0x0007 \"A\"");
    schema_error("0x0006 \"A\" { attributes { 0x0000 \"X\"\n 0x0001 \"X\" } }");
    schema_error("global commands { 0x00 \"X\"\n 0x00 \"Y\" }");
}

#[test]
fn test_section_errors() {
    schema_error("0x0006 \"A\" { commands sideways { } }");
    schema_error("0x0006 \"A\" { bindings { } }");
    schema_error("0x0006 \"A\" { attributes { 0x0000 \"X\" { kind bool } } }");
    schema_error("0x0006 \"A\" { attributes { 0x0000 \"X\" { type boolean } } }");
    schema_error("global other { }");
}

#[test]
fn test_misplaced_repeated_is_rejected() {
    let msg = schema_error(
        "global commands { 0x01 \"Cmd\" { repeated:uint8 \"list\"\n uint8 \"after\" } }",
    );
    assert!(msg.contains("'list'"), "{}", msg);
    schema_error("global commands { 0x01 \"Cmd\" { repeated:repeated:uint8 \"list\" } }");
}

#[test]
fn test_hand_built_type_matches_loaded() {
    let db = load(ON_OFF_DB);
    let expected = ObjectType::new().with(
        "reports",
        AnyType::repeated(
            ObjectType::new()
                .with("attribute", DataType::AttribId)
                .with("data", AnyType::Variant),
        ),
    );
    assert_eq!(db.global_command_by_id(0x0a).unwrap().payload, expected);
}
