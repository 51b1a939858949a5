mod common;

use chrono::Duration;

use bpgate_core::{AggregateRoot, PageRequest};
use bpgate_infra::{OutputRelationUpsert, RelationError, RelationStore, SharingErrorReport};
use bpgate_relations::{
    InputRelationFilter, OutputRelationFilter, RelationSharingStateType, RelationType, SharingStateFilter, StageType,
};

use common::{Harness, bpnl, ext, new_relation, start, tenant, upsert};

fn output(tenant_id: &str, external_id: &str, source: &str, target: &str) -> OutputRelationUpsert {
    OutputRelationUpsert {
        tenant: tenant(tenant_id),
        external_id: ext(external_id),
        relation_type: RelationType::IsManagedBy,
        source_bpnl: bpnl(source),
        target_bpnl: bpnl(target),
    }
}

#[tokio::test]
async fn created_relation_is_found_with_submitted_stage() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsOwnedBy, "P1", "P2")])
        .await
        .unwrap();

    let relation = h.service.find_relation(&t1, &ext("R1")).await.unwrap().unwrap();
    let stage = relation.input().unwrap();
    assert_eq!(stage.relation_type, RelationType::IsOwnedBy);
    assert_eq!(stage.created_at, start());

    let page = h
        .service
        .find_input_relations(&t1, &InputRelationFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].source_external_id, ext("P1"));
    assert_eq!(page.content[0].target_external_id, ext("P2"));
}

#[tokio::test]
async fn relation_is_promoted_to_output_once_bpnls_are_known() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    let created = h
        .service
        .create_input_relations(&t1, vec![new_relation(None, RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    let relation = &created[0];
    assert!(!relation.external_id().as_str().is_empty());
    assert_eq!(
        relation.sharing_state().unwrap().state_type(),
        RelationSharingStateType::Initial
    );

    h.tick();
    let external_id = relation.external_id().as_str().to_string();
    let promoted = h
        .service
        .upsert_output_relations(vec![output("T1", &external_id, "BPNL001", "BPNL002")])
        .await
        .unwrap();

    let promoted = &promoted[0];
    assert_eq!(
        promoted.sharing_state().unwrap().state_type(),
        RelationSharingStateType::Success
    );
    let snapshot = promoted.output().unwrap();
    assert_eq!(snapshot.relation_type, RelationType::IsManagedBy);
    assert_eq!(snapshot.source_bpnl, bpnl("BPNL001"));
    assert_eq!(snapshot.target_bpnl, bpnl("BPNL002"));
    assert_eq!(snapshot.updated_at, start() + Duration::seconds(1));

    let outputs = h
        .service
        .find_output_relations(&t1, &OutputRelationFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(outputs.total_elements, 1);
    assert_eq!(outputs.content[0].external_id, ext(&external_id));
}

#[tokio::test]
async fn output_upsert_overwrites_previous_output() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();

    h.service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL002")])
        .await
        .unwrap();
    h.service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL003")])
        .await
        .unwrap();

    let relation = h.service.find_relation(&t1, &ext("R1")).await.unwrap().unwrap();
    assert_eq!(relation.output().unwrap().target_bpnl, bpnl("BPNL003"));
}

#[tokio::test]
async fn output_with_equal_bpnls_is_invalid() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();

    let err = h
        .service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL001")])
        .await
        .unwrap_err();
    match err {
        RelationError::InvalidRelation(_) => {}
        other => panic!("Expected InvalidRelation, got {other:?}"),
    }
}

#[tokio::test]
async fn output_for_unknown_relation_is_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .upsert_output_relations(vec![output("T1", "missing", "BPNL001", "BPNL002")])
        .await
        .unwrap_err();
    match err {
        RelationError::NotFound { external_id } => assert_eq!(external_id, ext("missing")),
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn self_relation_is_rejected_for_every_type() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["X"]);

    for relation_type in RelationType::ALL {
        let err = h
            .service
            .create_input_relations(&t1, vec![new_relation(None, relation_type, "X", "X")])
            .await
            .unwrap_err();
        match err {
            RelationError::InvalidRelation(message) => assert!(message.contains("must differ")),
            other => panic!("Expected InvalidRelation, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn duplicate_external_id_is_rejected() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    let request = new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2");

    h.service.create_input_relations(&t1, vec![request.clone()]).await.unwrap();
    let err = h.service.create_input_relations(&t1, vec![request]).await.unwrap_err();

    match err {
        RelationError::AlreadyExists { external_id } => assert_eq!(external_id, ext("R1")),
        other => panic!("Expected AlreadyExists, got {other:?}"),
    }
}

#[tokio::test]
async fn same_external_id_in_other_tenant_is_independent() {
    let h = Harness::new();
    let (t1, t2) = (tenant("T1"), tenant("T2"));
    h.partners(&t1, &["P1", "P2"]);
    h.partners(&t2, &["P1", "P2"]);
    let request = new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2");

    h.service.create_input_relations(&t1, vec![request.clone()]).await.unwrap();
    h.service.create_input_relations(&t2, vec![request]).await.unwrap();

    assert!(h.service.find_relation(&t1, &ext("R1")).await.unwrap().is_some());
    assert!(h.service.find_relation(&t2, &ext("R1")).await.unwrap().is_some());
}

#[tokio::test]
async fn missing_source_and_missing_target_are_distinguished() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1"]);

    let err = h
        .service
        .create_input_relations(&t1, vec![new_relation(None, RelationType::IsManagedBy, "ghost", "P1")])
        .await
        .unwrap_err();
    match err {
        RelationError::SourceNotFound { external_id } => assert_eq!(external_id, ext("ghost")),
        other => panic!("Expected SourceNotFound, got {other:?}"),
    }

    let err = h
        .service
        .create_input_relations(&t1, vec![new_relation(None, RelationType::IsManagedBy, "P1", "ghost")])
        .await
        .unwrap_err();
    match err {
        RelationError::TargetNotFound { external_id } => assert_eq!(external_id, ext("ghost")),
        other => panic!("Expected TargetNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn partners_of_other_tenants_do_not_resolve() {
    let h = Harness::new();
    h.partners(&tenant("T2"), &["P1", "P2"]);

    let err = h
        .service
        .create_input_relations(&tenant("T1"), vec![new_relation(None, RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::SourceNotFound { .. }));
}

#[tokio::test]
async fn ambiguous_ledger_entry_is_not_reported_as_missing() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P1", "P2"]);

    let err = h
        .service
        .create_input_relations(&t1, vec![new_relation(None, RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap_err();
    match err {
        RelationError::AmbiguousReference { external_id, count } => {
            assert_eq!(external_id, ext("P1"));
            assert_eq!(count, 2);
        }
        other => panic!("Expected AmbiguousReference, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_identical_update_changes_updated_at_once() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2", "P3"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();

    h.tick();
    let change = upsert("R1", RelationType::IsManagedBy, "P1", "P3");
    let first = h.service.update_input_relations(&t1, vec![change.clone()]).await.unwrap();
    let first_updated_at = first[0].input().unwrap().updated_at;
    assert_eq!(first_updated_at, start() + Duration::seconds(1));

    h.tick();
    let _ = h.events.drain();
    let second = h.service.update_input_relations(&t1, vec![change]).await.unwrap();
    assert_eq!(second[0].input().unwrap().updated_at, first_updated_at);
    assert_eq!(second[0].version(), first[0].version());
    assert!(h.event_types().is_empty());
}

#[tokio::test]
async fn unchanged_update_leaves_success_untouched() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL002")])
        .await
        .unwrap();

    let updated = h
        .service
        .update_input_relations(&t1, vec![upsert("R1", RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    assert_eq!(
        updated[0].sharing_state().unwrap().state_type(),
        RelationSharingStateType::Success
    );
}

#[tokio::test]
async fn changed_update_resets_success_to_initial() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL002")])
        .await
        .unwrap();

    let updated = h
        .service
        .update_input_relations(&t1, vec![upsert("R1", RelationType::IsOwnedBy, "P1", "P2")])
        .await
        .unwrap();
    assert_eq!(
        updated[0].sharing_state().unwrap().state_type(),
        RelationSharingStateType::Initial
    );
    // The published output stays until the next promotion.
    assert!(updated[0].output().is_some());
}

#[tokio::test]
async fn update_of_unknown_relation_is_not_found() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    let err = h
        .service
        .update_input_relations(&t1, vec![upsert("R1", RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::NotFound { .. }));
}

#[tokio::test]
async fn errored_relation_recovers_on_unchanged_update() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service
        .report_sharing_errors(vec![SharingErrorReport {
            tenant: t1.clone(),
            external_id: ext("R1"),
            message: "pool rejected relation".to_string(),
        }])
        .await
        .unwrap();

    let relation = h.service.find_relation(&t1, &ext("R1")).await.unwrap().unwrap();
    assert!(relation.is_in_error_state());
    assert_eq!(
        relation.sharing_state().unwrap().error_message(),
        Some("pool rejected relation")
    );

    let updated = h
        .service
        .update_input_relations(&t1, vec![upsert("R1", RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    let state = updated[0].sharing_state().unwrap();
    assert_eq!(state.state_type(), RelationSharingStateType::Initial);
    assert_eq!(state.error_message(), None);
}

#[tokio::test]
async fn delete_removes_relation_and_stage() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    let created = h
        .service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    let relation_id = created[0].relation_id();

    h.service.delete_relation(&t1, &ext("R1")).await.unwrap();

    assert!(h.service.find_relation(&t1, &ext("R1")).await.unwrap().is_none());
    assert!(h.store.find_stage(relation_id, StageType::Input).await.unwrap().is_none());

    let err = h.service.delete_relation(&t1, &ext("R1")).await.unwrap_err();
    assert!(matches!(err, RelationError::NotFound { .. }));
}

#[tokio::test]
async fn deleted_external_id_can_be_reused() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    let request = new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2");

    h.service.create_input_relations(&t1, vec![request.clone()]).await.unwrap();
    h.service.delete_relation(&t1, &ext("R1")).await.unwrap();
    h.service.create_input_relations(&t1, vec![request]).await.unwrap();

    assert!(h.service.find_relation(&t1, &ext("R1")).await.unwrap().is_some());
}

#[tokio::test]
async fn one_invalid_entry_aborts_the_whole_batch() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    let err = h
        .service
        .create_input_relations(
            &t1,
            vec![
                new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2"),
                new_relation(Some("R2"), RelationType::IsManagedBy, "P1", "ghost"),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::TargetNotFound { .. }));

    assert!(h.service.find_relation(&t1, &ext("R1")).await.unwrap().is_none());
    assert!(h.event_types().is_empty());
}

#[tokio::test]
async fn batch_entries_observe_earlier_entries() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    let err = h
        .service
        .create_input_relations(
            &t1,
            vec![
                new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2"),
                new_relation(Some("R1"), RelationType::IsOwnedBy, "P1", "P2"),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::AlreadyExists { .. }));

    let upserted = h
        .service
        .upsert_input_relations(
            &t1,
            vec![
                upsert("R1", RelationType::IsManagedBy, "P1", "P2"),
                upsert("R1", RelationType::IsOwnedBy, "P2", "P1"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(upserted.len(), 2);

    let page = h
        .service
        .find_input_relations(&t1, &InputRelationFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].relation_type, RelationType::IsOwnedBy);
    assert_eq!(page.content[0].source_external_id, ext("P2"));
}

#[tokio::test]
async fn upsert_creates_then_updates() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    let created = h
        .service
        .upsert_input_relations(&t1, vec![upsert("R1", RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.tick();
    let updated = h
        .service
        .upsert_input_relations(&t1, vec![upsert("R1", RelationType::IsOwnedBy, "P1", "P2")])
        .await
        .unwrap();

    assert_eq!(created[0].relation_id(), updated[0].relation_id());
    let stage = updated[0].input().unwrap();
    assert_eq!(stage.created_at, start());
    assert_eq!(stage.updated_at, start() + Duration::seconds(1));
}

#[tokio::test]
async fn events_follow_committed_changes() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);

    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service
        .update_input_relations(&t1, vec![upsert("R1", RelationType::IsOwnedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service
        .upsert_output_relations(vec![output("T1", "R1", "BPNL001", "BPNL002")])
        .await
        .unwrap();
    h.service.delete_relation(&t1, &ext("R1")).await.unwrap();

    let envelopes = h.events.drain();
    let types: Vec<&str> = envelopes
        .iter()
        .map(|e| bpgate_events::Event::event_type(e.payload()))
        .collect();
    assert_eq!(
        types,
        vec![
            "relations.input.created",
            "relations.input.updated",
            "relations.sharing.reset",
            "relations.output.published",
            "relations.relation.deleted",
        ]
    );
    let sequence: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4, 5]);
    assert!(envelopes.iter().all(|e| e.tenant() == &t1));
}

#[tokio::test]
async fn claimed_relations_carry_partner_bpnls() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partner_with_bpnl(&t1, "P1", "BPNL001");
    h.partners(&t1, &["P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();

    let tasks = h.service.claim_relations_for_sharing(10).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.external_id, ext("R1"));
    assert_eq!(task.source.bpnl, Some(bpnl("BPNL001")));
    assert_eq!(task.target.external_id, ext("P2"));
    assert_eq!(task.target.bpnl, None);
    assert!(!task.is_resolvable());

    let relation = h.service.find_relation(&t1, &ext("R1")).await.unwrap().unwrap();
    assert_eq!(
        relation.sharing_state().unwrap().state_type(),
        RelationSharingStateType::Pending
    );

    // Nothing is left to claim.
    assert!(h.service.claim_relations_for_sharing(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn claim_takes_oldest_relations_first_up_to_limit() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    for external_id in ["R1", "R2", "R3"] {
        h.service
            .create_input_relations(
                &t1,
                vec![new_relation(Some(external_id), RelationType::IsManagedBy, "P1", "P2")],
            )
            .await
            .unwrap();
        h.tick();
    }

    let first: Vec<_> = h
        .service
        .claim_relations_for_sharing(2)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.external_id)
        .collect();
    assert_eq!(first, vec![ext("R1"), ext("R2")]);

    let second: Vec<_> = h
        .service
        .claim_relations_for_sharing(2)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.external_id)
        .collect();
    assert_eq!(second, vec![ext("R3")]);

    assert!(h.service.claim_relations_for_sharing(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn sharing_errors_are_only_accepted_while_in_flight() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();
    h.service.claim_relations_for_sharing(1).await.unwrap();

    let report = SharingErrorReport {
        tenant: t1.clone(),
        external_id: ext("R1"),
        message: "target unknown to pool".to_string(),
    };
    let failed = h.service.report_sharing_errors(vec![report.clone()]).await.unwrap();
    assert!(failed[0].is_in_error_state());

    let err = h.service.report_sharing_errors(vec![report]).await.unwrap_err();
    match err {
        RelationError::InvalidTransition(_) => {}
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_error_message_is_invalid() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2")])
        .await
        .unwrap();

    let err = h
        .service
        .report_sharing_errors(vec![SharingErrorReport {
            tenant: t1.clone(),
            external_id: ext("R1"),
            message: "   ".to_string(),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::InvalidRelation(_)));
}

#[tokio::test]
async fn sharing_states_are_searchable_by_state() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    for external_id in ["R1", "R2"] {
        h.service
            .create_input_relations(
                &t1,
                vec![new_relation(Some(external_id), RelationType::IsManagedBy, "P1", "P2")],
            )
            .await
            .unwrap();
        h.tick();
    }
    h.service
        .upsert_output_relations(vec![output("T1", "R2", "BPNL001", "BPNL002")])
        .await
        .unwrap();

    let filter = SharingStateFilter {
        state_types: vec![RelationSharingStateType::Success],
        ..SharingStateFilter::default()
    };
    let page = h
        .service
        .find_sharing_states(&t1, &filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].external_id, ext("R2"));
    assert_eq!(page.content[0].sharing_state_type, RelationSharingStateType::Success);
}

#[tokio::test]
async fn input_search_pages_in_creation_order() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    let ids = ["R1", "R2", "R3", "R4", "R5"];
    for external_id in ids {
        h.service
            .create_input_relations(
                &t1,
                vec![new_relation(Some(external_id), RelationType::IsManagedBy, "P1", "P2")],
            )
            .await
            .unwrap();
        h.tick();
    }

    let mut seen = Vec::new();
    for page in 0..3 {
        let result = h
            .service
            .find_input_relations(&t1, &InputRelationFilter::default(), PageRequest::new(page, 2))
            .await
            .unwrap();
        assert_eq!(result.total_elements, 5);
        assert_eq!(result.total_pages, 3);
        seen.extend(result.content.into_iter().map(|r| r.external_id));
    }
    assert_eq!(seen, ids.map(ext).to_vec());
}

#[tokio::test]
async fn input_search_applies_filters() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2", "P3"]);
    h.service
        .create_input_relations(
            &t1,
            vec![
                new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2"),
                new_relation(Some("R2"), RelationType::IsOwnedBy, "P1", "P3"),
            ],
        )
        .await
        .unwrap();
    h.tick();
    h.service
        .create_input_relations(&t1, vec![new_relation(Some("R3"), RelationType::IsOwnedBy, "P2", "P3")])
        .await
        .unwrap();

    let by_type = InputRelationFilter {
        relation_types: vec![RelationType::IsOwnedBy],
        ..InputRelationFilter::default()
    };
    let page = h.service.find_input_relations(&t1, &by_type, PageRequest::default()).await.unwrap();
    assert_eq!(page.total_elements, 2);

    let by_source = InputRelationFilter {
        source_external_ids: vec![ext("P1")],
        target_external_ids: vec![ext("P3")],
        ..InputRelationFilter::default()
    };
    let page = h.service.find_input_relations(&t1, &by_source, PageRequest::default()).await.unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].external_id, ext("R2"));

    let recent = InputRelationFilter {
        updated_after: Some(start() + Duration::seconds(1)),
        ..InputRelationFilter::default()
    };
    let page = h.service.find_input_relations(&t1, &recent, PageRequest::default()).await.unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].external_id, ext("R3"));
}

#[tokio::test]
async fn output_search_only_lists_promoted_relations() {
    let h = Harness::new();
    let t1 = tenant("T1");
    h.partners(&t1, &["P1", "P2"]);
    h.service
        .create_input_relations(
            &t1,
            vec![
                new_relation(Some("R1"), RelationType::IsManagedBy, "P1", "P2"),
                new_relation(Some("R2"), RelationType::IsManagedBy, "P2", "P1"),
            ],
        )
        .await
        .unwrap();
    h.service
        .upsert_output_relations(vec![output("T1", "R2", "BPNL002", "BPNL001")])
        .await
        .unwrap();

    let filter = OutputRelationFilter {
        source_bpnls: vec![bpnl("BPNL002")],
        ..OutputRelationFilter::default()
    };
    let page = h.service.find_output_relations(&t1, &filter, PageRequest::default()).await.unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].external_id, ext("R2"));

    let all = h
        .service
        .find_output_relations(&t1, &OutputRelationFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.total_elements, 1);
}

#[tokio::test]
async fn oversized_pages_are_capped() {
    let h = Harness::new();
    let page = h
        .service
        .find_input_relations(&tenant("T1"), &InputRelationFilter::default(), PageRequest::new(0, 1_000_000))
        .await
        .unwrap();
    assert_eq!(page.total_elements, 0);
    assert_eq!(page.total_pages, 0);
    assert_eq!(h.service.page_request(None, Some(1_000_000)).size, 1000);
}
