//! Property-based tests for mission documents
//!
//! Generated missions must survive parse → serialize → parse with every
//! modeled field intact.

use engage_core::mission::{MissionConfiguration, MissionDatabase};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_braced_id() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"\{[0-9a-f]{8}-[0-9a-f]{4}\}").unwrap()
}

fn arb_label() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[A-Za-z0-9 ]{0,16}").unwrap()
}

fn arb_address() -> impl Strategy<Value = String> {
    (224u8..=239, any::<u8>(), any::<u8>(), 1u8..=254).prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d))
}

/// One group object with a fixed type ordinal in 1..=3
fn arb_group() -> impl Strategy<Value = Value> {
    (
        arb_braced_id(),
        1i64..=3,
        arb_label(),
        arb_address(),
        1u16..=65_534,
        any::<bool>(),
        0i32..=5,
        any::<bool>(),
    )
        .prop_map(|(id, group_type, name, address, port, encrypted, ept, anonymous)| {
            let mut group = json!({
                "id": id,
                "type": group_type,
                "name": name,
                "rx": {"address": address, "port": port},
                "tx": {"address": address, "port": port},
                "ept": ept,
                "anonymousAlias": anonymous,
                "vendorBlob": {"keep": [1, 2, 3]}
            });
            if encrypted {
                group["cryptoPassword"] = json!("0123456789ABCDEF");
            }
            group
        })
}

fn arb_mission() -> impl Strategy<Value = Value> {
    (
        arb_braced_id(),
        arb_label(),
        arb_label(),
        0i64..=2,
        prop::option::of((prop::string::string_regex(r"[a-z]{0,8}(\.example)?").unwrap(), 0u16..=65_535, prop::option::of(any::<bool>()))),
        prop::collection::vec(arb_group(), 0..6),
    )
        .prop_map(|(id, name, description, policy, rallypoint, groups)| {
            // Group ids must be unique
            let mut seen = std::collections::HashSet::new();
            let groups: Vec<Value> = groups
                .into_iter()
                .filter(|g| seen.insert(g["id"].as_str().unwrap_or_default().to_string()))
                .collect();

            let mut mission = json!({
                "id": id,
                "name": name,
                "description": description,
                "multicastFailoverPolicy": policy,
                "groups": groups,
            });
            if let Some((address, port, usage)) = rallypoint {
                let mut rp = json!({"address": address, "port": port});
                if let Some(usage) = usage {
                    rp["use"] = json!(usage);
                }
                mission["rallypoint"] = rp;
            }
            mission
        })
}

proptest! {
    /// Property: parse(serialize(parse(x))) equals parse(x) on modeled fields
    #[test]
    fn serialize_round_trips(document in arb_mission()) {
        let first = MissionConfiguration::parse(&document.to_string()).expect("generated mission parses");
        let second = MissionConfiguration::parse(&first.serialize()).expect("serialized mission parses");

        prop_assert!(first.same_definition(&second));
        prop_assert_eq!(first.use_rp(), second.use_rp());
        prop_assert_eq!(first.groups().len(), second.groups().len());
    }

    /// Property: relay usage never holds without a usable address and port
    #[test]
    fn relay_requires_usable_host(document in arb_mission()) {
        let mission = MissionConfiguration::parse(&document.to_string()).expect("generated mission parses");
        if mission.use_rp() {
            prop_assert!(!mission.rallypoint.address.is_empty());
            prop_assert!(mission.rallypoint.port > 0);
        }
    }

    /// Property: the database keeps one entry per mission id
    #[test]
    fn database_upserts_by_id(documents in prop::collection::vec(arb_mission(), 1..5)) {
        let mut db = MissionDatabase::new();
        let mut ids = std::collections::HashSet::new();
        for document in &documents {
            let mission = MissionConfiguration::parse(&document.to_string()).expect("generated mission parses");
            ids.insert(mission.id.clone());
            db.upsert(mission);
        }
        prop_assert_eq!(db.len(), ids.len());

        let reloaded = MissionDatabase::from_json(&db.to_json()).expect("database reloads");
        prop_assert_eq!(reloaded.len(), db.len());
    }
}

#[test]
fn unknown_group_type_is_rejected() {
    let document = json!({"id": "{m}", "groups": [{"id": "{g}", "type": 9}]});
    assert!(MissionConfiguration::parse(&document.to_string()).is_err());
}
