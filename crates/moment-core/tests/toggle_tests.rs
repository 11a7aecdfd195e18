use moment_core::remote::memory::RemoteCall;
use moment_core::{
    MutationAction, MutationError, Relation, RemoteError, Submission, Table, ToggleController,
    ToggleState, UserId,
};
use moment_test_utils::{controller, identity, signed_in_remote, GatedRemote};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_failed_like_reverts_and_reports() {
    let remote = signed_in_remote();
    let toggles = ToggleController::new(remote.clone());
    let like = Relation::photo_like("p1");
    toggles.seed(like.clone(), false, 3);

    remote.fail_table(Table::Likes, RemoteError::new("network request failed"));
    let outcome = toggles.toggle(&like).unwrap();
    assert_eq!(outcome.state(), ToggleState::new(true, 4));
    assert_eq!(toggles.state(&like), ToggleState::new(true, 4));

    let err = outcome.into_pending().unwrap().settle().await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(toggles.state(&like), ToggleState::new(false, 3));
    assert_eq!(
        toggles.last_error(&like).as_deref(),
        Some("network request failed")
    );
    assert!(!toggles.is_busy(&like));
}

#[tokio::test]
async fn test_second_toggle_in_flight_is_ignored() {
    let remote = signed_in_remote();
    let gated = GatedRemote::new(remote.clone());
    let toggles = ToggleController::new(gated.clone());
    let like = Relation::photo_like("p1");
    toggles.seed(like.clone(), false, 3);

    let first = toggles.toggle(&like).unwrap().into_pending().unwrap();
    gated.wait_for_held(1).await;
    assert!(toggles.is_busy(&like));

    let second = toggles.toggle(&like).unwrap();
    assert!(second.is_ignored());
    assert_eq!(second.state(), ToggleState::new(true, 4));

    gated.release(1);
    assert_eq!(first.settle().await.unwrap(), ToggleState::new(true, 4));
    assert_eq!(toggles.state(&like), ToggleState::new(true, 4));
    assert_eq!(remote.call_count(), 1);
    assert!(remote.has_relation(&like, &identity().id));
}

#[tokio::test]
async fn test_like_then_unlike_returns_to_start() {
    let remote = signed_in_remote();
    let toggles = ToggleController::new(remote.clone());
    let like = Relation::photo_like("p1");
    toggles.seed(like.clone(), false, 3);

    for _ in 0..2 {
        let pending = toggles.toggle(&like).unwrap().into_pending().unwrap();
        pending.settle().await.unwrap();
    }

    assert_eq!(toggles.state(&like), ToggleState::new(false, 3));
    assert!(!remote.has_relation(&like, &identity().id));
    assert_eq!(
        remote.calls(),
        vec![RemoteCall::Insert(Table::Likes), RemoteCall::Delete(Table::Likes)]
    );
}

#[tokio::test]
async fn test_relations_are_independent() {
    let remote = signed_in_remote();
    let gated = GatedRemote::new(remote.clone());
    let toggles = ToggleController::new(gated.clone());
    let like = Relation::post_like("cp1");
    let follow = Relation::follow("u2");

    let a = toggles.toggle(&like).unwrap();
    let b = toggles.toggle(&follow).unwrap();
    assert!(!a.is_ignored());
    assert!(!b.is_ignored());
    gated.wait_for_held(2).await;

    gated.open();
    a.into_pending().unwrap().settle().await.unwrap();
    b.into_pending().unwrap().settle().await.unwrap();

    let me = identity().id;
    assert!(remote.has_relation(&like, &me));
    assert!(remote.has_relation(&follow, &me));
    assert_eq!(toggles.state(&follow), ToggleState::new(true, 1));
}

#[tokio::test]
async fn test_membership_count_matches_store() {
    let remote = signed_in_remote();
    let toggles = ToggleController::new(remote.clone());
    let join = Relation::membership("c1");
    remote.seed_relation(&join, &UserId::new("u2"));
    remote.seed_relation(&join, &UserId::new("u3"));
    toggles.seed(join.clone(), false, remote.relation_count(&join));

    let pending = toggles.toggle(&join).unwrap().into_pending().unwrap();
    assert_eq!(pending.previous(), ToggleState::new(false, 2));
    pending.settle().await.unwrap();

    assert_eq!(toggles.state(&join).count, remote.relation_count(&join));
    assert_eq!(remote.relation_count(&join), 3);
}

#[tokio::test]
async fn test_stale_like_hits_unique_constraint() {
    let remote = signed_in_remote();
    let toggles = ToggleController::new(remote.clone());
    let like = Relation::photo_like("p1");
    remote.seed_relation(&like, &identity().id);
    // Local view is stale: it believes the photo is not liked
    toggles.seed(like.clone(), false, 0);

    let err = toggles
        .toggle(&like)
        .unwrap()
        .into_pending()
        .unwrap()
        .settle()
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::RemoteRejected(ref e) if e.is_unique_violation()));
    assert_eq!(toggles.state(&like), ToggleState::new(false, 0));
}

#[tokio::test]
async fn test_controller_routes_toggles() {
    let remote = signed_in_remote();
    let controller = controller(&remote);
    let follow = Relation::follow("u2");
    controller.toggles().seed(follow.clone(), true, 10);

    let Submission::Toggle(outcome) = controller
        .submit(MutationAction::toggle(follow.clone()))
        .unwrap()
    else {
        panic!("expected toggle submission");
    };
    assert_eq!(outcome.state(), ToggleState::new(false, 9));
    outcome.into_pending().unwrap().settle().await.unwrap();

    remote.session().sign_out();
    assert_eq!(
        controller
            .submit(MutationAction::toggle(follow.clone()))
            .unwrap_err(),
        MutationError::Unauthenticated
    );
    assert_eq!(controller.toggles().state(&follow), ToggleState::new(false, 9));
}
