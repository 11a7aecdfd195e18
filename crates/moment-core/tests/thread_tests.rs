use moment_core::remote::memory::RemoteCall;
use moment_core::{
    CommentThread, EntityId, EntityStatus, InMemoryRemote, MutationAction, MutationError,
    RemoteError, Session, Submission, Table, ThreadRef,
};
use moment_test_utils::{controller, identity, seeded_thread, signed_in_remote, GatedRemote};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_hello_is_pending_then_confirmed() {
    let remote = Arc::new(InMemoryRemote::new(Session::signed_in(identity())).with_next_id(42));
    let thread = CommentThread::new(remote.clone(), ThreadRef::photo("p1"));
    assert!(thread.entries().is_empty());

    let pending = thread.submit("hello").unwrap();
    let entries = thread.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(&entries[0].id, pending.temp_id());
    assert!(entries[0].id.is_temporary());
    assert_eq!(entries[0].payload.body, "hello");
    assert_eq!(entries[0].status, EntityStatus::Pending);

    let id = pending.settle().await.unwrap();
    assert_eq!(id, EntityId::canonical("c-42"));

    let entries = thread.entries();
    assert_eq!(thread.ids(), vec![EntityId::canonical("c-42")]);
    assert_eq!(entries[0].payload.body, "hello");
    assert_eq!(entries[0].status, EntityStatus::Confirmed);
    assert_eq!(thread.comment_count(), 1);
}

#[tokio::test]
async fn test_confirmed_entry_carries_stored_author() {
    let remote = signed_in_remote();
    let thread = CommentThread::new(remote.clone(), ThreadRef::photo("p1"));

    thread.submit("  nice shot  ").unwrap().settle().await.unwrap();

    let entries = thread.entries();
    assert_eq!(entries[0].payload.body, "nice shot");
    assert_eq!(entries[0].payload.author.display_name(), "ana");
    assert_eq!(remote.comments(&ThreadRef::photo("p1"))[0].body, "nice shot");
}

#[tokio::test]
async fn test_success_never_duplicates() {
    let remote = signed_in_remote();
    let photo = ThreadRef::photo("p1");
    let rows = seeded_thread(&remote, &photo, &["first", "second"]);
    let thread = CommentThread::with_rows(remote.clone(), photo.clone(), rows);

    let id = thread.submit("third").unwrap().settle().await.unwrap();

    let ids = thread.ids();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.iter().filter(|i| **i == id).count(), 1);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
    assert_eq!(thread.pending_count(), 0);
    assert_eq!(thread.comment_count(), 3);
}

#[tokio::test]
async fn test_failure_restores_exact_list() {
    let remote = signed_in_remote();
    let photo = ThreadRef::photo("p1");
    let rows = seeded_thread(&remote, &photo, &["first", "second"]);
    let thread = CommentThread::with_rows(remote.clone(), photo.clone(), rows);
    let before = thread.entries();

    remote.fail_next(
        RemoteError::new("new row violates row-level security policy").with_code("42501"),
    );
    let pending = thread.submit("third").unwrap();
    assert_eq!(thread.entries().len(), 3);

    let err = pending.settle().await.unwrap_err();
    assert!(matches!(err, MutationError::RemoteRejected(ref e) if e.code.as_deref() == Some("42501")));
    assert_eq!(thread.entries(), before);
    assert_eq!(thread.comment_count(), 2);
    assert_eq!(
        thread.last_error().as_deref(),
        Some("new row violates row-level security policy")
    );

    // The next submit clears the displayed error
    thread.submit("fourth").unwrap().settle().await.unwrap();
    assert_eq!(thread.last_error(), None);
}

#[tokio::test]
async fn test_concurrent_inserts_keep_submission_order() {
    let remote = signed_in_remote();
    let gated = GatedRemote::new(remote.clone());
    let photo = ThreadRef::photo("p1");
    let thread = CommentThread::new(gated.clone(), photo.clone());

    let a = thread.submit("a").unwrap();
    let b = thread.submit("b").unwrap();
    let c = thread.submit("c").unwrap();
    gated.wait_for_held(3).await;
    assert_eq!(thread.pending_count(), 3);

    remote.fail_next(RemoteError::new("timeout"));
    gated.release(1);
    assert!(a.settle().await.is_err());
    assert_eq!(thread.entries().len(), 2);

    gated.open();
    b.settle().await.unwrap();
    c.settle().await.unwrap();

    let bodies: Vec<_> = thread
        .entries()
        .into_iter()
        .map(|e| e.payload.body)
        .collect();
    assert_eq!(bodies, vec!["b".to_string(), "c".to_string()]);
    assert!(thread.ids().iter().all(|id| !id.is_temporary()));
    assert_eq!(remote.comments(&photo).len(), 2);
}

#[tokio::test]
async fn test_post_thread_uses_post_comments_table() {
    let remote = signed_in_remote();
    let thread = CommentThread::new(remote.clone(), ThreadRef::community_post("cp1"));

    thread.submit("welcome").unwrap().settle().await.unwrap();

    assert_eq!(remote.calls(), vec![RemoteCall::Insert(Table::CommunityPostComments)]);
    assert_eq!(remote.comments(&ThreadRef::community_post("cp1")).len(), 1);
    assert!(remote.comments(&ThreadRef::photo("cp1")).is_empty());
}

#[tokio::test]
async fn test_unmounted_thread_ignores_late_result() {
    let remote = signed_in_remote();
    let controller = controller(&remote);
    let photo = ThreadRef::photo("p1");
    controller.mount(photo.clone(), Vec::new());

    let Submission::Insert { pending, .. } = controller
        .submit(MutationAction::comment(photo.clone(), "hello"))
        .unwrap()
    else {
        panic!("expected insert submission");
    };
    assert!(controller.unmount(&photo));

    // The store still accepts the write; nothing local is updated
    let id = pending.settle().await.unwrap();
    assert!(!id.is_temporary());
    assert!(controller.thread(&photo).entries().is_empty());

    let remounted = controller.mount(photo.clone(), remote.comments(&photo));
    assert_eq!(remounted.ids(), vec![id]);
}

#[tokio::test]
async fn test_signed_out_submit_is_refused() {
    let remote = signed_in_remote();
    let thread = CommentThread::new(remote.clone(), ThreadRef::photo("p1"));
    remote.session().sign_out();

    assert_eq!(thread.submit("hello").unwrap_err(), MutationError::Unauthenticated);
    assert!(thread.entries().is_empty());
    assert_eq!(remote.call_count(), 0);
}
