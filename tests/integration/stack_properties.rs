//! Stack-balance properties over arbitrary apply sequences.

use kapuchin::{
    apply, get_original, original_depth, resolve, revert, was_created, Host, PatchRecord,
    TargetId, Value,
};
use proptest::prelude::*;

fn tags() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-c]", any::<i64>()), 0..12)
}

#[derive(Debug, Clone, Copy)]
enum Destination {
    Type,
    RootType,
    Instance,
}

fn destinations() -> impl Strategy<Value = Destination> {
    prop_oneof![
        Just(Destination::Type),
        Just(Destination::RootType),
        Just(Destination::Instance),
    ]
}

/// A fresh host and the target the layers go onto.
fn host_with(destination: Destination) -> (Host, TargetId) {
    let mut host = Host::new();
    let fan = host.define_type("Fan", None, &[]).unwrap();
    let target = match destination {
        Destination::Type => fan,
        Destination::RootType => host.object_type(),
        Destination::Instance => host.new_instance(fan).unwrap(),
    };
    (host, target)
}

proptest! {
    #[test]
    fn applies_then_reverts_restore_present_member(
        destination in destinations(),
        initial in any::<i64>(),
        layers in tags(),
    ) {
        let (mut host, fan) = host_with(destination);
        host.set_slot(fan, "speed", Value::Int(initial)).unwrap();

        let records: Vec<PatchRecord> = layers
            .iter()
            .map(|(tag, value)| PatchRecord::new(fan, "speed", *value).tagged(tag.clone()))
            .collect();
        for record in &records {
            apply(&mut host, record).unwrap();
        }
        prop_assert_eq!(original_depth(&host, fan, "speed"), records.len());

        for record in records.iter().rev() {
            revert(&mut host, record).unwrap();
        }
        prop_assert_eq!(host.slot(fan, "speed").unwrap(), Some(&Value::Int(initial)));
        prop_assert_eq!(original_depth(&host, fan, "speed"), 0);
    }

    #[test]
    fn applies_then_reverts_remove_created_member(
        destination in destinations(),
        layers in tags(),
    ) {
        let (mut host, fan) = host_with(destination);

        let records: Vec<PatchRecord> = layers
            .iter()
            .map(|(tag, value)| PatchRecord::new(fan, "kick_start", *value).tagged(tag.clone()))
            .collect();
        for record in &records {
            apply(&mut host, record).unwrap();
        }
        prop_assert_eq!(was_created(&host, fan, "kick_start"), !records.is_empty());

        for record in records.iter().rev() {
            revert(&mut host, record).unwrap();
        }
        prop_assert_eq!(host.slot(fan, "kick_start").unwrap(), None);
        prop_assert!(resolve(&host, fan, "kick_start").unwrap_err().is_not_found());
        prop_assert!(!was_created(&host, fan, "kick_start"));
    }

    #[test]
    fn original_lookup_finds_newest_layer_for_tag(
        destination in destinations(),
        layers in tags(),
    ) {
        let (mut host, fan) = host_with(destination);
        host.set_slot(fan, "speed", Value::Int(-1)).unwrap();

        let mut expected: std::collections::HashMap<String, i64> = Default::default();
        let mut current = -1;
        for (tag, value) in &layers {
            expected.insert(tag.clone(), current);
            apply(&mut host, &PatchRecord::new(fan, "speed", *value).tagged(tag.clone())).unwrap();
            current = *value;
        }

        for tag in ["a", "b", "c"] {
            match expected.get(tag) {
                Some(value) => prop_assert_eq!(
                    get_original(&host, fan, "speed", tag).unwrap(),
                    Value::Int(*value)
                ),
                None => prop_assert!(get_original(&host, fan, "speed", tag).unwrap_err().is_revert()),
            }
        }
    }
}

#[test]
fn test_tagged_layers_scenario() {
    let mut host = Host::new();
    let fan = host.define_type("Fan", None, &[]).unwrap();
    host.set_slot(fan, "speed", Value::Int(1)).unwrap();

    let x = PatchRecord::new(fan, "speed", 2i64).tagged("x");
    let y = PatchRecord::new(fan, "speed", 3i64).tagged("y");
    apply(&mut host, &x).unwrap();
    apply(&mut host, &y).unwrap();

    assert_eq!(get_original(&host, fan, "speed", "x").unwrap(), Value::Int(1));
    assert_eq!(get_original(&host, fan, "speed", "y").unwrap(), Value::Int(2));

    revert(&mut host, &y).unwrap();
    revert(&mut host, &x).unwrap();
    assert_eq!(host.slot(fan, "speed").unwrap(), Some(&Value::Int(1)));
    assert!(revert(&mut host, &x).unwrap_err().is_revert());
}
