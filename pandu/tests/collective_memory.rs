//! Collective memory promotion lifecycle: contribution, confirmation,
//! promotion at the threshold, refutation and removal.


use pandu::memory::{
    CollectiveMemoryService, ContributionOutcome, RefutationOutcome,
};
use serde_json::json;

const FACT: &str = "KITAS extension requires a sponsor letter";

#[tokio::test]
async fn promotion_lifecycle_across_distinct_users() {
    let dir = tempfile::tempdir().unwrap();
    let svc = CollectiveMemoryService::new(dir.path().join("collective.db"), 3, 0.2).unwrap();

    // Two contributions: not yet collective.
    let ContributionOutcome::Created { memory_id } = svc
        .add_contribution("alice@x.com", FACT, "process", json!({}))
        .await
        .unwrap()
    else {
        panic!("expected created");
    };
    svc.add_contribution("bob@x.com", FACT, "process", json!({}))
        .await
        .unwrap();
    let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
    assert_eq!(fact.source_count, 2);
    assert!(!fact.is_promoted);
    assert!(svc.get_collective_context(None, 10).await.unwrap().is_empty());

    // Third distinct user crosses the threshold.
    svc.add_contribution("carol@x.com", FACT, "process", json!({}))
        .await
        .unwrap();
    let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
    assert_eq!(fact.source_count, 3);
    assert!(fact.is_promoted);

    // A fourth distinct user keeps counting up.
    svc.add_contribution("dave@x.com", FACT, "process", json!({}))
        .await
        .unwrap();
    let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
    assert_eq!(fact.source_count, 4);

    // A repeat contributor changes nothing.
    let repeat = svc
        .add_contribution("alice@x.com", FACT, "process", json!({}))
        .await
        .unwrap();
    assert!(matches!(repeat, ContributionOutcome::AlreadyContributed { .. }));
    let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
    assert_eq!(fact.source_count, 4);

    // Promoted facts are served to everyone, best first.
    let context = svc.get_collective_context(None, 10).await.unwrap();
    assert_eq!(context, vec![FACT.to_string()]);

    // Refutations erode confidence until the fact is deleted.
    let mut removed = false;
    for refuter in ["r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11",
        "r12", "r13", "r14", "r15", "r16", "r17"]
    {
        match svc.refute_fact(refuter, memory_id).await.unwrap() {
            RefutationOutcome::Removed => {
                removed = true;
                break;
            }
            RefutationOutcome::Refuted { confidence, .. } => {
                assert!(confidence >= 0.2);
            }
            RefutationOutcome::NotFound => panic!("fact vanished unexpectedly"),
        }
    }
    assert!(removed, "fact should be removed once confidence drops below 0.2");
    assert!(svc.get_fact(memory_id).await.unwrap().is_none());
}
