//! Builders for synthetic P4Info documents used by tests.
//!
//! The fixture pipeline mirrors a small L2/L3 switch: an exact L2 table with
//! a direct counter, an LPM v6 routing table backed by an action selector,
//! a ternary ACL table, controller packet metadata, a digest, a register
//! typed by a serializable enum, an indirect counter/meter and a value set.

use proto::p4info as p4i;
use proto::p4types as p4t;

use crate::p4schema::P4Schema;

pub const L2_EXACT_TABLE_ID: u32 = 34391805;
pub const ROUTING_V6_TABLE_ID: u32 = 33554635;
pub const ACL_TABLE_ID: u32 = 33554700;
pub const SET_EGRESS_PORT_ID: u32 = 24677122;
pub const SET_NEXT_HOP_ID: u32 = 16777218;
pub const ACL_MIRROR_ID: u32 = 16777219;
pub const NO_ACTION_ID: u32 = 21257015;
pub const NEXT_HOP_PROFILE_ID: u32 = 285212673;
pub const L2_COUNTER_ID: u32 = 318767105;
pub const PKT_COUNTER_ID: u32 = 301989889;
pub const RATE_METER_ID: u32 = 335544321;
pub const MODE_REG_ID: u32 = 369098753;
pub const DIGEST_T_ID: u32 = 385875969;
pub const PVS_ID: u32 = 50331649;
pub const PACKET_IN_ID: u32 = 67108865;
pub const PACKET_OUT_ID: u32 = 67108866;

/// Build the fixture schema.
pub fn schema() -> P4Schema {
    P4Schema::from_p4info(p4info(), Vec::new()).expect("fixture schema must load")
}

pub fn preamble(id: u32, name: &str) -> Option<p4i::Preamble> {
    Some(p4i::Preamble {
        id,
        name: name.to_string(),
        alias: name.rsplit('.').next().unwrap_or(name).to_string(),
        ..Default::default()
    })
}

pub fn match_field(
    id: u32,
    name: &str,
    bitwidth: i32,
    match_type: p4i::match_field::MatchType,
) -> p4i::MatchField {
    p4i::MatchField {
        id,
        name: name.to_string(),
        bitwidth,
        r#match: Some(p4i::match_field::Match::MatchType(match_type as i32)),
        ..Default::default()
    }
}

pub fn action_param(id: u32, name: &str, bitwidth: i32) -> p4i::action::Param {
    p4i::action::Param {
        id,
        name: name.to_string(),
        bitwidth,
        ..Default::default()
    }
}

pub fn action(id: u32, name: &str, params: Vec<p4i::action::Param>) -> p4i::Action {
    p4i::Action {
        preamble: preamble(id, name),
        params,
    }
}

pub fn action_ref(id: u32) -> p4i::ActionRef {
    p4i::ActionRef {
        id,
        ..Default::default()
    }
}

pub fn bit_type_spec(bitwidth: i32) -> p4t::P4DataTypeSpec {
    p4t::P4DataTypeSpec {
        type_spec: Some(p4t::p4_data_type_spec::TypeSpec::Bitstring(
            p4t::P4BitstringLikeTypeSpec {
                annotations: Vec::new(),
                type_spec: Some(p4t::p4_bitstring_like_type_spec::TypeSpec::Bit(
                    p4t::P4BitTypeSpec { bitwidth },
                )),
            },
        )),
    }
}

pub fn named_type_spec(kind: &str, name: &str) -> p4t::P4DataTypeSpec {
    use p4t::p4_data_type_spec::TypeSpec;
    let named = p4t::P4NamedType {
        name: name.to_string(),
    };
    let type_spec = match kind {
        "struct" => TypeSpec::Struct(named),
        "new_type" => TypeSpec::NewType(named),
        "serializable_enum" => TypeSpec::SerializableEnum(named),
        other => panic!("unsupported named type kind {:?}", other),
    };
    p4t::P4DataTypeSpec {
        type_spec: Some(type_spec),
    }
}

fn type_info() -> p4t::P4TypeInfo {
    let mut info = p4t::P4TypeInfo::default();

    // PortId_t: a translated new_type carried as a 32-bit uint.
    info.new_types.insert(
        "PortId_t".to_string(),
        p4t::P4NewTypeSpec {
            representation: Some(p4t::p4_new_type_spec::Representation::TranslatedType(
                p4t::P4NewTypeTranslation {
                    uri: "p4.org/psa/v1/PortId_t".to_string(),
                    sdn_type: Some(p4t::p4_new_type_translation::SdnType::SdnBitwidth(32)),
                },
            )),
        },
    );

    // PortAlias_t -> PortId_t, exercising transitive resolution.
    info.new_types.insert(
        "PortAlias_t".to_string(),
        p4t::P4NewTypeSpec {
            representation: Some(p4t::p4_new_type_spec::Representation::OriginalType(
                named_type_spec("new_type", "PortId_t"),
            )),
        },
    );

    info.structs.insert(
        "digest_t".to_string(),
        p4t::P4StructTypeSpec {
            members: vec![
                p4t::p4_struct_type_spec::Member {
                    name: "addr".to_string(),
                    type_spec: Some(bit_type_spec(48)),
                },
                p4t::p4_struct_type_spec::Member {
                    name: "port".to_string(),
                    type_spec: Some(named_type_spec("new_type", "PortAlias_t")),
                },
            ],
            annotations: Vec::new(),
        },
    );

    info.serializable_enums.insert(
        "mode_t".to_string(),
        p4t::P4SerializableEnumTypeSpec {
            underlying_type: Some(p4t::P4BitTypeSpec { bitwidth: 8 }),
            members: vec![
                p4t::p4_serializable_enum_type_spec::Member {
                    name: "MODE_A".to_string(),
                    value: vec![0x00],
                },
                p4t::p4_serializable_enum_type_spec::Member {
                    name: "MODE_B".to_string(),
                    value: vec![0x01],
                },
            ],
            annotations: Vec::new(),
        },
    );

    info
}

/// The full fixture P4Info document.
pub fn p4info() -> p4i::P4Info {
    let actions = vec![
        action(NO_ACTION_ID, "NoAction", Vec::new()),
        action(
            SET_EGRESS_PORT_ID,
            "ingress.set_egress_port",
            vec![action_param(1, "port_num", 9)],
        ),
        action(
            SET_NEXT_HOP_ID,
            "ingress.set_next_hop",
            vec![action_param(1, "dmac", 48)],
        ),
        action(
            ACL_MIRROR_ID,
            "ingress.acl_mirror",
            vec![action_param(1, "port", 9), action_param(2, "session_id", 10)],
        ),
    ];

    let tables = vec![
        p4i::Table {
            preamble: preamble(L2_EXACT_TABLE_ID, "ingress.l2_exact_table"),
            match_fields: vec![{
                let mut field = match_field(
                    1,
                    "hdr.ethernet.dst_addr",
                    48,
                    p4i::match_field::MatchType::Exact,
                );
                field.annotations.push("@format(MAC_ADDRESS)".to_string());
                field
            }],
            action_refs: vec![action_ref(SET_EGRESS_PORT_ID), action_ref(NO_ACTION_ID)],
            direct_resource_ids: vec![L2_COUNTER_ID],
            size: 1024,
            idle_timeout_behavior: p4i::table::IdleTimeoutBehavior::NotifyControl as i32,
            ..Default::default()
        },
        p4i::Table {
            preamble: preamble(ROUTING_V6_TABLE_ID, "ingress.routing_v6_table"),
            match_fields: vec![match_field(
                1,
                "hdr.ipv6.dst_addr",
                128,
                p4i::match_field::MatchType::Lpm,
            )],
            action_refs: vec![action_ref(SET_NEXT_HOP_ID), action_ref(NO_ACTION_ID)],
            implementation_id: NEXT_HOP_PROFILE_ID,
            size: 512,
            ..Default::default()
        },
        p4i::Table {
            preamble: preamble(ACL_TABLE_ID, "ingress.acl_table"),
            match_fields: vec![
                match_field(1, "ipv4_src", 32, p4i::match_field::MatchType::Ternary),
                match_field(2, "l4_dport", 16, p4i::match_field::MatchType::Optional),
            ],
            action_refs: vec![action_ref(ACL_MIRROR_ID), action_ref(NO_ACTION_ID)],
            size: 128,
            ..Default::default()
        },
    ];

    p4i::P4Info {
        pkg_info: Some(p4i::PkgInfo {
            name: "ngsdn".to_string(),
            version: "1.0.0".to_string(),
            arch: "v1model".to_string(),
            ..Default::default()
        }),
        tables,
        actions,
        action_profiles: vec![p4i::ActionProfile {
            preamble: preamble(NEXT_HOP_PROFILE_ID, "ingress.next_hop_profile"),
            table_ids: vec![ROUTING_V6_TABLE_ID],
            with_selector: true,
            size: 128,
            max_group_size: 16,
            selector_size_semantics: Some(
                p4i::action_profile::SelectorSizeSemantics::SumOfMembers(
                    p4i::action_profile::SumOfMembers {
                        max_member_weight: 100,
                    },
                ),
            ),
        }],
        counters: vec![p4i::Counter {
            preamble: preamble(PKT_COUNTER_ID, "ingress.pkt_counter"),
            spec: Some(p4i::CounterSpec {
                unit: p4i::counter_spec::Unit::Both as i32,
            }),
            size: 64,
            index_type_name: None,
        }],
        direct_counters: vec![p4i::DirectCounter {
            preamble: preamble(L2_COUNTER_ID, "ingress.l2_counter"),
            spec: Some(p4i::CounterSpec {
                unit: p4i::counter_spec::Unit::Packets as i32,
            }),
            direct_table_id: L2_EXACT_TABLE_ID,
        }],
        meters: vec![p4i::Meter {
            preamble: preamble(RATE_METER_ID, "ingress.rate_meter"),
            spec: Some(p4i::MeterSpec {
                unit: p4i::meter_spec::Unit::Bytes as i32,
            }),
            size: 32,
            index_type_name: None,
        }],
        direct_meters: Vec::new(),
        controller_packet_metadata: vec![
            p4i::ControllerPacketMetadata {
                preamble: preamble(PACKET_IN_ID, "packet_in"),
                metadata: vec![
                    p4i::controller_packet_metadata::Metadata {
                        id: 1,
                        name: "ingress_port".to_string(),
                        bitwidth: 9,
                        ..Default::default()
                    },
                    p4i::controller_packet_metadata::Metadata {
                        id: 2,
                        name: "_pad".to_string(),
                        bitwidth: 7,
                        ..Default::default()
                    },
                ],
            },
            p4i::ControllerPacketMetadata {
                preamble: preamble(PACKET_OUT_ID, "packet_out"),
                metadata: vec![
                    p4i::controller_packet_metadata::Metadata {
                        id: 1,
                        name: "magic_val".to_string(),
                        bitwidth: 16,
                        ..Default::default()
                    },
                    p4i::controller_packet_metadata::Metadata {
                        id: 2,
                        name: "egress_port".to_string(),
                        bitwidth: 9,
                        ..Default::default()
                    },
                ],
            },
        ],
        value_sets: vec![p4i::ValueSet {
            preamble: preamble(PVS_ID, "parser.pvs"),
            r#match: vec![match_field(1, "", 16, p4i::match_field::MatchType::Exact)],
            size: 4,
        }],
        registers: vec![p4i::Register {
            preamble: preamble(MODE_REG_ID, "ingress.mode_reg"),
            type_spec: Some(named_type_spec("serializable_enum", "mode_t")),
            size: 16,
            index_type_name: None,
        }],
        digests: vec![p4i::Digest {
            preamble: preamble(DIGEST_T_ID, "digest_t"),
            type_spec: Some(named_type_spec("struct", "digest_t")),
        }],
        externs: Vec::new(),
        type_info: Some(type_info()),
    }
}

/// A small text-format rendering of the L2 table, for text-loader tests.
pub fn p4info_text() -> String {
    format!(
        r#"
pkg_info {{
  name: "ngsdn"
  version: "1.0.0"
  arch: "v1model"
}}
tables {{
  preamble {{
    id: {table_id}
    name: "ingress.l2_exact_table"
    alias: "l2_exact_table"
  }}
  match_fields {{
    id: 1
    name: "hdr.ethernet.dst_addr"
    bitwidth: 48
    match_type: EXACT
    annotations: "@format(MAC_ADDRESS)"
  }}
  action_refs {{
    id: {action_id}
  }}
  size: 1024
}}
actions {{
  preamble {{
    id: {action_id}
    name: "ingress.set_egress_port"
    alias: "set_egress_port"
  }}
  params {{
    id: 1
    name: "port_num"
    bitwidth: 9
  }}
}}
"#,
        table_id = L2_EXACT_TABLE_ID,
        action_id = SET_EGRESS_PORT_ID
    )
}
