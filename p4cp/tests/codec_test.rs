// End-to-end codec checks against the fixture pipeline: canonical round
// trips for every entity kind plus the literal wire scenarios.

use p4cp::p4entity::{decode_entity, insert, P4WeightedAction};
use p4cp::testlib;
use p4cp::{
    P4CounterData, P4DigestEntry, P4Entity, P4IndirectAction, P4MulticastGroupEntry,
    P4RegisterEntry, P4Schema, P4TableAction, P4TableEntry, P4TableMatch, P4Value,
};
use proto::p4runtime as p4r;

fn schema() -> P4Schema {
    testlib::schema()
}

/// encode(decode(encode(e))) == encode(e) for a representative entity set.
#[test]
fn round_trip_is_canonical() {
    let _ = env_logger::builder().is_test(true).try_init();
    let schema = schema();

    let entities: Vec<P4Entity> = vec![
        P4TableEntry::new("l2_exact_table")
            .with_match(P4TableMatch::new().field("dst_addr", "00:00:00:00:00:01"))
            .with_action(P4TableAction::new("set_egress_port").param("port_num", 1u32))
            .into(),
        P4TableEntry::new("routing_v6_table")
            .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
            .with_action(P4IndirectAction::ActionSet(vec![
                P4TableAction::new("set_next_hop")
                    .param("dmac", "00:00:00:00:00:01")
                    .weight(1),
                P4TableAction::new("set_next_hop")
                    .param("dmac", "00:00:00:00:00:02")
                    .weight(2),
            ]))
            .into(),
        P4TableEntry::new("acl_table")
            .with_match(P4TableMatch::new().field("ipv4_src", "10.1.0.0/16"))
            .with_priority(100)
            .with_action(
                P4TableAction::new("acl_mirror")
                    .param("port", 3u32)
                    .param("session_id", 250u32),
            )
            .into(),
        P4MulticastGroupEntry::new(1, [(2u32, 1u32), (2, 2), (2, 3)]).into(),
        P4DigestEntry {
            digest_id: "digest_t".to_string(),
            max_list_size: 1,
            max_timeout_ns: 0,
            ack_timeout_ns: 0,
        }
        .into(),
        P4RegisterEntry {
            register_id: "mode_reg".to_string(),
            index: Some(2),
            data: Some(P4Value::Str("MODE_A".to_string())),
        }
        .into(),
    ];

    for entity in entities {
        let first = entity.encode(&schema).unwrap();
        let decoded = decode_entity(&first, &schema).unwrap();
        let second = decoded.encode(&schema).unwrap();
        assert_eq!(first, second, "not canonical: {}", entity.kind());
    }
}

/// Scenario: INSERT on `l2_exact_table` with the published literal ids.
#[test]
fn l2_insert_wire_literals() {
    let schema = schema();
    let update = insert(
        P4TableEntry::new("l2_exact_table")
            .with_match(P4TableMatch::new().field("dst_addr", "00:00:00:00:00:01"))
            .with_action(P4TableAction::new("set_egress_port").param("port_num", 1u32)),
    )
    .encode(&schema)
    .unwrap();

    assert_eq!(update.r#type, p4r::update::Type::Insert as i32);
    let Some(p4r::entity::Entity::TableEntry(entry)) =
        update.entity.as_ref().and_then(|e| e.entity.as_ref())
    else {
        panic!("expected a table entry");
    };
    assert_eq!(entry.table_id, 34391805);
    assert_eq!(entry.r#match[0].field_id, 1);
    assert_eq!(
        entry.r#match[0].field_match_type,
        Some(p4r::field_match::FieldMatchType::Exact(
            p4r::field_match::Exact { value: vec![0x01] }
        ))
    );
    let Some(p4r::table_action::Type::Action(action)) =
        entry.action.as_ref().and_then(|a| a.r#type.as_ref())
    else {
        panic!("expected a direct action");
    };
    assert_eq!(action.action_id, 24677122);
    assert_eq!(action.params[0].value, vec![0x01]);
}

/// Scenario: one-shot with weights over an LPM v6 route.
#[test]
fn routing_v6_one_shot_wire_literals() {
    let schema = schema();
    let entry = P4TableEntry::new("routing_v6_table")
        .with_match(P4TableMatch::new().field("dst_addr", "2000:1234::/64"))
        .with_action(P4IndirectAction::ActionSet(vec![
            P4WeightedAction::new(
                1,
                P4TableAction::new("set_next_hop").param("dmac", "00:00:00:00:00:01"),
            ),
            P4WeightedAction::new(
                2,
                P4TableAction::new("set_next_hop").param("dmac", "00:00:00:00:00:02"),
            ),
        ]))
        .encode_entry(&schema)
        .unwrap();

    let Some(p4r::field_match::FieldMatchType::Lpm(lpm)) =
        entry.r#match[0].field_match_type.as_ref()
    else {
        panic!("expected an LPM match");
    };
    assert_eq!(lpm.prefix_len, 64);
    assert_eq!(lpm.value.len(), 16);
    assert_eq!(&lpm.value[..4], &[0x20, 0x00, 0x12, 0x34]);
    assert!(lpm.value[4..].iter().all(|&b| b == 0));

    let Some(p4r::table_action::Type::ActionProfileActionSet(set)) =
        entry.action.as_ref().and_then(|a| a.r#type.as_ref())
    else {
        panic!("expected a one-shot action set");
    };
    let weights: Vec<i32> = set.action_profile_actions.iter().map(|a| a.weight).collect();
    assert_eq!(weights, vec![1, 2]);
    let first = set.action_profile_actions[0].action.as_ref().unwrap();
    assert_eq!(first.params[0].value, vec![0x01]);
}

/// Wildcard reads: an empty table id matches every table.
#[test]
fn wildcard_table_read() {
    let schema = schema();
    let entry = P4TableEntry::wildcard().encode_entry(&schema).unwrap();
    assert_eq!(entry.table_id, 0);
    assert!(entry.r#match.is_empty());
    assert!(entry.action.is_none());
}

/// Reading counters along with entries via counter_data markers.
#[test]
fn wildcard_read_with_counter_request() {
    let schema = schema();
    let mut wildcard = P4TableEntry::wildcard();
    wildcard.counter_data = Some(P4CounterData::default());
    wildcard.time_since_last_hit = Some(0);
    let entry = wildcard.encode_entry(&schema).unwrap();
    assert!(entry.counter_data.is_some());
    assert!(entry.time_since_last_hit.is_some());
}

/// The schema loader accepts the same document in text and binary form.
#[test]
fn schema_text_binary_equivalence() -> anyhow::Result<()> {
    use prost::Message;

    let text = testlib::p4info_text();
    let from_text = P4Schema::load(Some(&p4cp::P4InfoSource::Bytes(text.into_bytes())), None)?;

    let binary = testlib::p4info().encode_to_vec();
    let from_binary = P4Schema::load(Some(&p4cp::P4InfoSource::Bytes(binary)), None)?;

    // Both expose the same table under the same ids.
    let a = from_text.tables().require_name("l2_exact_table")?;
    let b = from_binary.tables().require_name("l2_exact_table")?;
    assert_eq!(a.id, b.id);
    assert_eq!(a.match_fields.len(), b.match_fields.len());
    Ok(())
}
