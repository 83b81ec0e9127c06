#![allow(clippy::unwrap_used, clippy::expect_used)]
// Integration tests for the commit protocol and subscriber dispatch

mod common;

use async_trait::async_trait;
use common::{builder, open, AccountDelta};
use deltalog_core::logging_facility::{TestCapture, TestCaptureLayer};
use deltalog_core::{
    AgentSignature, CommitError, Diff, Query, Repository, SessionOptions, Step, Tag, Transaction,
    VersionNumber,
};
use deltalog_core_types::{EntityId, TransactionId};
use deltalog_engine::{Subscribers, TransactionRepository, TransactionSubscriber};
use deltalog_store::MemoryRepository;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn captured(repo: MemoryRepository) -> (TransactionRepository<MemoryRepository>, TestCapture) {
    let (dispatch, capture) = TestCaptureLayer::dispatch();
    let tx_repo = TransactionRepository::new(repo, SessionOptions::new().logger(dispatch));
    (tx_repo, capture)
}

fn error_codes(capture: &TestCapture) -> Vec<String> {
    capture
        .events()
        .iter()
        .filter(|e| e.event.as_deref() == Some("end_error"))
        .filter_map(|e| e.field("err.code").map(str::to_string))
        .collect()
}

fn new_account_transaction(email: &str) -> Transaction {
    let mut b = builder();
    b.create(EntityId::new(), open(email)).unwrap();
    b.build(TransactionId::new(), None)
}

#[derive(Default)]
struct Counting {
    seen: AtomicUsize,
}

#[async_trait]
impl TransactionSubscriber for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    async fn notify(&self, _transaction: Arc<Transaction>) -> Result<(), CommitError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl TransactionSubscriber for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _transaction: Arc<Transaction>) -> Result<(), CommitError> {
        Err(CommitError::Backend {
            message: "projection store down".to_string(),
        })
    }
}

struct Panicking;

#[async_trait]
impl TransactionSubscriber for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn notify(&self, _transaction: Arc<Transaction>) -> Result<(), CommitError> {
        panic!("subscriber bug")
    }
}

#[tokio::test]
async fn test_same_transaction_id_commits_once() {
    // GIVEN a committed transaction
    let (repo, capture) = captured(MemoryRepository::default());
    let tx = new_account_transaction("a@example.com");

    // WHEN it is submitted twice
    let first = repo.put_transaction(tx.clone()).await;
    let second = repo.put_transaction(tx).await;

    // THEN only the first succeeds and the second is logged
    assert!(first);
    assert!(!second);
    assert_eq!(error_codes(&capture), vec!["ERR_DUPLICATE_TRANSACTION"]);
}

#[tokio::test]
async fn test_competing_version_one_is_logged_as_optimistic_concurrency() {
    let (repo, capture) = captured(MemoryRepository::default());
    let id = EntityId::new();
    let mut first = builder();
    first.create(id, open("a@example.com")).unwrap();
    let mut second = builder();
    second.create(id, open("b@example.com")).unwrap();

    assert!(repo.put_transaction(first.build(TransactionId::new(), None)).await);
    assert!(!repo.put_transaction(second.build(TransactionId::new(), None)).await);

    assert_eq!(error_codes(&capture), vec!["ERR_OPTIMISTIC_CONCURRENCY"]);
}

#[tokio::test]
async fn test_version_zero_step_is_rejected_before_the_backend() {
    let backend = MemoryRepository::default();
    let (repo, capture) = captured(backend.clone());
    let entity_id = EntityId::new();
    let tx = Transaction {
        id: TransactionId::new(),
        timestamp: chrono::Utc::now(),
        agent: AgentSignature::unknown(),
        steps: vec![Step {
            entity_id,
            previous_version: VersionNumber::ZERO,
            next_version: VersionNumber::ZERO,
            delta: None,
            leases: Diff::default(),
            tags: Diff::default(),
            state: None,
        }],
    };

    assert!(!repo.put_transaction(tx.clone()).await);

    assert_eq!(error_codes(&capture), vec!["ERR_VERSION_ZERO_RESERVED"]);
    capture.assert_event_exists("commit_transaction", "end_error");
    assert!(backend
        .enumerate_transaction_ids(&Query::transaction_id(tx.id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_lease_in_batch_fails_but_duplicate_tag_commits() {
    let (repo, capture) = captured(MemoryRepository::default());

    let mut leases = builder();
    leases.create(EntityId::new(), open("same@example.com")).unwrap();
    leases.create(EntityId::new(), open("same@example.com")).unwrap();
    assert!(!repo.put_transaction(leases.build(TransactionId::new(), None)).await);

    let mut tags = builder();
    let id = EntityId::new();
    tags.create(id, open("c@example.com")).unwrap();
    tags.add_tag(id, Tag::new("tier", "gold")).unwrap();
    tags.add_tag(id, Tag::new("tier", "gold")).unwrap();
    assert!(repo.put_transaction(tags.build(TransactionId::new(), None)).await);

    assert_eq!(error_codes(&capture), vec!["ERR_UNIQUENESS_CONFLICT"]);
}

#[tokio::test]
async fn test_read_only_session_never_reaches_backend() {
    // GIVEN a read-only transaction repository over a shared store
    let backend = MemoryRepository::default();
    let (dispatch, capture) = TestCaptureLayer::dispatch();
    let counting = Arc::new(Counting::default());
    let repo = TransactionRepository::new(
        backend.clone(),
        SessionOptions::new().read_only(true).logger(dispatch),
    )
    .with_subscriber(counting.clone())
    .blocking(true);
    let tx = new_account_transaction("a@example.com");

    // WHEN a commit is attempted
    let committed = repo.put_transaction(tx.clone()).await;

    // THEN it fails, is logged, stores nothing and notifies nobody
    assert!(!committed);
    assert_eq!(error_codes(&capture), vec!["ERR_READ_ONLY"]);
    assert!(backend
        .enumerate_transaction_ids(&Query::transaction_id(tx.id))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(counting.seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_subscribers_do_not_block_others_or_the_commit() {
    // GIVEN failing and panicking subscribers registered before a healthy one
    let (dispatch, capture) = TestCaptureLayer::dispatch();
    let counting = Arc::new(Counting::default());
    let repo = TransactionRepository::new(
        MemoryRepository::default(),
        SessionOptions::new().logger(dispatch),
    )
    .with_subscriber(Arc::new(Failing))
    .with_subscriber(Arc::new(Panicking))
    .with_subscriber(counting.clone())
    .blocking(true);

    // WHEN a transaction commits
    let committed = repo.put_transaction(new_account_transaction("a@example.com")).await;

    // THEN the commit stands, the healthy subscriber ran and both failures were logged
    assert!(committed);
    assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
    let failures = capture.count_events(|e| {
        e.op.as_deref() == Some("notify_subscriber") && e.event.as_deref() == Some("end_error")
    });
    assert_eq!(failures, 2);
    capture.assert_event_exists("commit_transaction", "end");
}

#[tokio::test]
async fn test_panicking_subscriber_is_logged_without_awaiting_dispatch() {
    // GIVEN a fire-and-forget repository with a panicking subscriber
    let (dispatch, capture) = TestCaptureLayer::dispatch();
    let repo = TransactionRepository::new(
        MemoryRepository::default(),
        SessionOptions::new().logger(dispatch),
    )
    .with_subscriber(Arc::new(Panicking));

    // WHEN a transaction commits and nobody waits for the subscriber
    assert!(repo.put_transaction(new_account_transaction("a@example.com")).await);

    // THEN the panic is still reported as an internal error in the commit's scope
    let scope = repo.scope_id().to_string();
    let is_panic_report = |e: &deltalog_core::logging_facility::CapturedEvent| {
        e.op.as_deref() == Some("notify_subscriber")
            && e.scope_id() == Some(scope.as_str())
            && e.field("err.code") == Some("ERR_INTERNAL")
    };
    for _ in 0..100 {
        if capture.count_events(is_panic_report) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(capture.count_events(is_panic_report), 1);
    let report = capture.events().into_iter().find(|e| is_panic_report(e)).unwrap();
    assert!(report.field("err.message").unwrap().contains("subscriber bug"));
}

#[tokio::test]
async fn test_every_subscriber_receives_each_commit() {
    let first = Arc::new(Counting::default());
    let second = Arc::new(Counting::default());
    let repo = TransactionRepository::new(MemoryRepository::default(), SessionOptions::default())
        .with_subscriber(first.clone())
        .with_subscriber(second.clone())
        .blocking(true);

    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        assert!(repo.put_transaction(new_account_transaction(email)).await);
    }

    assert_eq!(first.seen.load(Ordering::SeqCst), 3);
    assert_eq!(second.seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dispatch_handle_can_be_awaited_later() {
    let counting = Arc::new(Counting::default());
    let mut subscribers = Subscribers::new();
    subscribers.register(counting.clone());
    subscribers.register(Arc::new(Failing));

    let handle = subscribers.dispatch(
        Arc::new(new_account_transaction("a@example.com")),
        deltalog_core_types::ScopeId::new(),
        &SessionOptions::default(),
    );
    assert_eq!(handle.len(), 2);
    let summary = handle.wait().await;

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_committed_deltas_are_readable_through_the_same_repository() {
    let repo = TransactionRepository::new(MemoryRepository::default(), SessionOptions::default());
    let mut b = builder();
    let id = EntityId::new();
    b.create(id, open("a@example.com")).unwrap();
    b.append(id, AccountDelta::Deposit { amount: 9 }).unwrap();

    assert!(repo.put_transaction(b.build(TransactionId::new(), None)).await);

    let deltas = repo.repository().enumerate_deltas(&Query::entity_id(id)).await;
    assert_eq!(
        deltas[1].decode::<AccountDelta>().unwrap(),
        AccountDelta::Deposit { amount: 9 }
    );
}
