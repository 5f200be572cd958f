//! Metadata Digest Tests

use serde_json::json;
use switchbank_devices::{build_digest, normalize, MetadataEntry};

fn options() -> serde_json::Value {
    json!({
        "root": "electrical.switches.bank.",
        "switchbanks": [
            {
                "instance": 12,
                "description": "Engine room",
                "channels": [{"index": 3, "description": "Fuel pump"}, {"index": 1}]
            },
            {"instance": 2, "type": "switch", "channelCount": 4, "channels": [{"index": 4}]}
        ]
    })
}

#[test]
fn test_digest_is_deterministic() {
    let first = build_digest(&normalize(&options()).unwrap().configuration);
    let second = build_digest(&normalize(&options()).unwrap().configuration);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    let paths: Vec<String> = first.to_metas().into_iter().map(|(path, _)| path).collect();
    let mut sorted = paths.clone();
    sorted.sort_unstable();
    assert_eq!(paths, sorted);
}

#[test]
fn test_digest_covers_banks_and_channels() {
    let digest = build_digest(&normalize(&options()).unwrap().configuration);
    assert_eq!(digest.len(), 5);

    match digest.get("electrical.switches.bank.12").unwrap() {
        MetadataEntry::Bank(bank) => {
            assert_eq!(bank.description, "Engine room");
            assert_eq!(bank.channel_count, 3);
        }
        other => panic!("unexpected entry {:?}", other),
    }
    match digest.get("electrical.switches.bank.2.4.state").unwrap() {
        MetadataEntry::Channel(channel) => {
            assert_eq!(channel.description, "Binary switch state (0 = OFF, 1 = ON)");
            assert_eq!(channel.short_name, "[2,4]");
        }
        other => panic!("unexpected entry {:?}", other),
    }
}

#[test]
fn test_digest_round_trips_through_tree_values() {
    let digest = build_digest(&normalize(&options()).unwrap().configuration);
    let metas = digest.to_metas();
    assert_eq!(metas.len(), digest.len());

    let json = digest.to_json().unwrap();
    let (path, value) = &metas[0];
    assert_eq!(&json[path], value);
}
