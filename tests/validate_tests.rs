//! Message validation tests

#[cfg(test)]
mod tests {
    use entity_sync::{
        compute_delta,
        event::{EventPacket, HitPayload},
        types::QUAT_IDENTITY,
        validate::{self, MessageKind, Reason},
        Ack, BaseIntent, ComponentMap, ComponentName, Delta, DeltaEntityUpdate, EntityMap,
        Health, IntentKind, Snapshot, Transform,
    };
    use entity_sync::protocol::IntentInteract;
    use serde_json::json;

    fn intent_json() -> serde_json::Value {
        json!({ "seq": 3, "clientTimeMs": 1200, "type": "move", "payload": { "dx": 1.0, "dy": 0.0, "dz": 0.0 } })
    }

    // -----------------------------------------------------------------------
    // Intents & acks
    // -----------------------------------------------------------------------

    #[test]
    fn valid_intent_parses() {
        let intent = validate::intent(&intent_json()).unwrap();
        assert_eq!(intent.seq, 3);
        assert_eq!(intent.client_time_ms, 1200);
        assert_eq!(intent.kind, IntentKind::Move);
    }

    #[test]
    fn intent_with_extra_field_is_rejected() {
        let mut raw = intent_json();
        raw["priority"] = json!("high");
        let err = validate::intent(&raw).unwrap_err();
        assert_eq!(err.kind, MessageKind::Intent);
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "priority");
        assert_eq!(err.issues[0].reason, Reason::UnknownField);
    }

    #[test]
    fn intent_payload_is_unconstrained() {
        let raw = json!({ "seq": 0, "clientTimeMs": 0, "type": "teleport", "payload": [1, "two", null] });
        assert!(validate::intent(&raw).is_ok());

        let missing = json!({ "seq": 0, "clientTimeMs": 0, "type": "teleport" });
        assert_eq!(validate::intent(&missing).unwrap().payload, serde_json::Value::Null);
    }

    #[test]
    fn intent_rejects_unknown_kind_and_negative_seq() {
        let raw = json!({ "seq": -4, "clientTimeMs": 10, "type": "fly", "payload": {} });
        let err = validate::intent(&raw).unwrap_err();
        assert!(err.has_issue_at("seq"));
        assert!(err
            .issues
            .iter()
            .any(|i| i.path == "type" && i.reason == Reason::UnknownVariant("fly".into())));
    }

    #[test]
    fn ack_requires_integers() {
        assert_eq!(
            validate::ack(&json!({ "seq": 9, "serverTimeMs": 77 })).unwrap(),
            Ack {
                seq: 9,
                server_time_ms: 77
            }
        );
        let err = validate::ack(&json!({ "seq": 9.5, "serverTimeMs": 77 })).unwrap_err();
        assert_eq!(err.issues[0].reason, Reason::NotNonNegativeInteger);
    }

    #[test]
    fn integers_beyond_double_precision_are_rejected() {
        let raw = json!({ "seq": 1u64 << 60, "serverTimeMs": 9_007_199_254_740_993u64 });
        let err = validate::ack(&raw).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err
            .issues
            .iter()
            .all(|i| i.reason == Reason::NotNonNegativeInteger));

        let edge = json!({ "seq": 9_007_199_254_740_991u64, "serverTimeMs": 0 });
        assert_eq!(validate::ack(&edge).unwrap().seq, 9_007_199_254_740_991);
    }

    #[test]
    fn malformed_bytes_report_root_issue() {
        let err = validate::from_slice::<BaseIntent>(b"{ not json").unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "");
        assert!(matches!(err.issues[0].reason, Reason::MalformedJson(_)));
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    #[test]
    fn hit_without_amount_is_rejected() {
        let raw = json!({
            "type": "combat.hit",
            "tServerMs": 100,
            "payload": { "attacker": "p1", "target": "p2" }
        });
        let err = validate::event_packet(&raw).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "payload.amount");
        assert_eq!(err.issues[0].reason, Reason::Missing);
    }

    #[test]
    fn unknown_event_type_is_rejected_regardless_of_payload() {
        let raw = json!({
            "type": "combat.block",
            "tServerMs": 100,
            "payload": { "attacker": "p1", "target": "p2", "amount": 5 }
        });
        let err = validate::event_packet(&raw).unwrap_err();
        assert!(err.has_issue_at("type"));
    }

    #[test]
    fn payload_shape_follows_tag() {
        // A valid join payload under the transfer tag.
        let raw = json!({
            "type": "economy.transfer",
            "tServerMs": 5,
            "payload": { "playerId": "p1", "worldId": "w1" }
        });
        let err = validate::event_packet(&raw).unwrap_err();
        assert!(err.has_issue_at("payload.playerId"));
        assert!(err.has_issue_at("payload.from"));
        assert!(err.has_issue_at("payload.amount"));
    }

    #[test]
    fn every_event_kind_parses() {
        let packets = json!([
            { "type": "system.join", "tServerMs": 1, "payload": { "playerId": "p", "worldId": "w" } },
            { "type": "system.leave", "tServerMs": 2, "payload": { "playerId": "p", "reason": "quit" } },
            { "type": "combat.hit", "tServerMs": 3, "payload": { "attacker": "a", "target": "t", "amount": 4.5, "damageType": "fire" } },
            { "type": "economy.transfer", "tServerMs": 4, "payload": { "from": "a", "to": "b", "currency": "gold", "amount": 10, "ref": "r1" } }
        ]);
        for raw in packets.as_array().unwrap() {
            let packet = validate::event_packet(raw).unwrap();
            assert_eq!(raw["type"], packet.event_type().as_str());
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots & deltas
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_accepts_partial_component_maps() {
        let raw = json!({
            "tick": 12,
            "serverTimeMs": 5000,
            "entities": {
                "e1": { "health": { "current": 5, "max": 10 } },
                "e2": {},
                "e3": { "transform": { "position": [0, 1, 2], "rotation": [0, 0, 0, 1], "velocity": [1, 0, 0] } }
            }
        });
        let snap = validate::snapshot(&raw).unwrap();
        assert_eq!(snap.entities.len(), 3);
        assert_eq!(snap.entities["e1"].health, Some(Health::new(5.0, 10.0)));
        assert!(snap.entities["e2"].is_empty());
        assert!(snap.events.is_none());
    }

    #[test]
    fn snapshot_rejects_extra_component_fields_with_paths() {
        let raw = json!({
            "tick": 12,
            "serverTimeMs": 5000,
            "entities": {
                "e1": {
                    "transform": { "position": [0, 1], "rotation": [0, 0, 0, 1], "spin": 3 },
                    "physics": {}
                }
            }
        });
        let err = validate::snapshot(&raw).unwrap_err();
        assert!(err.has_issue_at("entities.e1.transform.spin"));
        assert!(err.has_issue_at("entities.e1.physics"));
        assert!(err.issues.iter().any(|i| i.path == "entities.e1.transform.position"
            && i.reason == Reason::WrongLength { expected: 3, found: 2 }));
    }

    #[test]
    fn null_optional_field_is_a_type_error() {
        let raw = json!({ "tick": 1, "serverTimeMs": 1, "entities": {}, "events": null });
        let err = validate::snapshot(&raw).unwrap_err();
        assert_eq!(err.issues[0].reason, Reason::ExpectedType("array"));
    }

    #[test]
    fn delta_rejects_unknown_removed_component() {
        let raw = json!({
            "tick": 5,
            "baseTick": 4,
            "updated": [ { "entityId": "e1", "removedComponents": ["health", "aura"] } ]
        });
        let err = validate::delta(&raw).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, "updated[0].removedComponents[1]");
    }

    #[test]
    fn delta_entity_update_validates_alone() {
        let update: DeltaEntityUpdate = validate::parse(&json!({
            "entityId": "e1",
            "removedComponents": ["visual"]
        }))
        .unwrap();
        assert_eq!(update.removed_components, Some(vec![ComponentName::Visual]));
    }

    // -----------------------------------------------------------------------
    // serde decoding
    // -----------------------------------------------------------------------

    #[test]
    fn serde_decoding_rejects_what_the_validator_rejects() {
        let mut raw = intent_json();
        raw["extra"] = json!(true);
        assert!(validate::intent(&raw).is_err());
        assert!(serde_json::from_value::<BaseIntent>(raw.clone()).is_err());
        assert!(serde_json::from_slice::<BaseIntent>(&serde_json::to_vec(&raw).unwrap()).is_err());

        let snap = json!({
            "tick": 1,
            "serverTimeMs": 1,
            "entities": {
                "e1": { "transform": { "position": [0, 0, 0], "rotation": [0, 0, 0, 1], "spin": 3 } }
            }
        });
        assert!(serde_json::from_value::<Snapshot>(snap).is_err());

        let null_events = json!({ "tick": 1, "serverTimeMs": 1, "entities": {}, "events": null });
        assert!(serde_json::from_value::<Snapshot>(null_events).is_err());

        let extra_payload = json!({
            "type": "system.join",
            "tServerMs": 1,
            "payload": { "playerId": "p", "worldId": "w", "admin": true }
        });
        assert!(serde_json::from_value::<EventPacket>(extra_payload).is_err());
    }

    #[test]
    fn serde_decoding_reports_validation_paths() {
        let raw = json!({ "tick": 2, "baseTick": 1, "removed": [7] });
        let err = serde_json::from_value::<Delta>(raw).unwrap_err();
        assert!(err.to_string().contains("removed[0]"), "{err}");

        let ok: Ack = serde_json::from_str(r#"{"seq":3,"serverTimeMs":4}"#).unwrap();
        assert_eq!(ok.seq, 3);
    }

    #[test]
    fn intent_payload_structs_deny_unknown_fields() {
        let intent = BaseIntent::new(1, 1, IntentKind::Interact, json!({ "targetId": "door", "force": 9 }));
        assert!(intent.decode_payload::<IntentInteract>().is_err());

        let intent = BaseIntent::new(1, 1, IntentKind::Interact, json!({ "targetId": "door" }));
        assert_eq!(intent.decode_payload::<IntentInteract>().unwrap().target_id, "door");
    }

    // -----------------------------------------------------------------------
    // Outbound round trip
    // -----------------------------------------------------------------------

    #[test]
    fn produced_messages_pass_their_own_validators() {
        let mut prev = EntityMap::new();
        prev.insert(
            "e1".into(),
            ComponentMap::new().with_health(Health::new(3.0, 3.0)),
        );
        let mut next = EntityMap::new();
        next.insert(
            "e2".into(),
            ComponentMap::new().with_transform(Transform::new([1.0, 2.0, 3.0], QUAT_IDENTITY)),
        );

        let delta: Delta = compute_delta(&prev, &next, 1, 2).with_events(vec![EventPacket::Hit {
            t_server_ms: 12.5,
            payload: HitPayload {
                attacker: "e2".into(),
                target: "e1".into(),
                amount: 3.0,
                damage_type: None,
            },
        }]);
        validate::check_outbound(&delta).unwrap();
        validate::check_outbound(&Snapshot::new(2, 99, next)).unwrap();
        validate::check_outbound(&BaseIntent::new(1, 2, IntentKind::Move, json!({}))).unwrap();

        let wire = serde_json::to_vec(&delta).unwrap();
        assert_eq!(validate::from_slice::<Delta>(&wire).unwrap(), delta);
    }
}
