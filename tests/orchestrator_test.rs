//! End-to-end runs of the moderation session over in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use prometheus::Registry;

use comment_shield::domain::{
    CrawlReport, JobOutcome, JobState, ModerationJobRequest, RawComment, Scope,
};
use comment_shield::error::{ModerationError, RejectionReason};
use comment_shield::moderation::ModerationSession;
use comment_shield::moderation::session::{Collaborators, SelectionChange};
use comment_shield::observability::Metrics;
use comment_shield::store::CommentStore;
use comment_shield::store::memory::{
    MemoryBlacklistStore, MemoryBlockedWordStore, MemoryCommentStore, MemoryCrawlAnalyzer,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
}

fn report(url: &str, count: usize) -> CrawlReport {
    let records = (0..count)
        .map(|i| RawComment {
            external_id: Some(format!("{url}-{i}")),
            author_name: Some(format!("viewer-{}", i % 7)),
            text: Some(format!("comment number {i}")),
            is_malicious: i % 4 == 0,
            toxicity_score: Some(if i % 4 == 0 { 0.8 } else { 0.1 }),
            publish_date: Some(format!("2024-03-{:02}T09:00:00Z", 1 + i % 4)),
            ..RawComment::default()
        })
        .collect();
    CrawlReport {
        total_crawled: u32::try_from(count).expect("small count"),
        analyzed_count: u32::try_from(count).expect("small count"),
        records,
    }
}

struct Fixture {
    session: ModerationSession,
    analyzer: Arc<MemoryCrawlAnalyzer>,
    comments: Arc<MemoryCommentStore>,
}

fn fixture() -> Fixture {
    let comments = Arc::new(MemoryCommentStore::new());
    let analyzer = Arc::new(MemoryCrawlAnalyzer::persisting_to(Arc::clone(&comments)));
    analyzer.insert("v1", report("v1", 40));
    analyzer.insert("v2", report("v2", 10));
    let collaborators = Collaborators {
        analyzer: analyzer.clone(),
        comments: comments.clone(),
        blacklist: Arc::new(MemoryBlacklistStore::new()),
        blocked_words: Arc::new(MemoryBlockedWordStore::new()),
    };
    let metrics = Arc::new(Metrics::new(&Registry::new()).expect("metrics register"));
    Fixture {
        session: ModerationSession::new(collaborators, metrics, Duration::from_secs(5)),
        analyzer,
        comments,
    }
}

async fn run(session: &ModerationSession, request: ModerationJobRequest) -> JobOutcome {
    let job = session.submit(request).expect("job accepted");
    let settled = session.wait_settled(job.id).await.expect("job settles");
    match settled.state {
        JobState::Settled(outcome) => outcome,
        other => panic!("job did not settle: {other:?}"),
    }
}

#[tokio::test]
async fn nine_day_range_rejected_four_day_range_loads_forty_records() {
    let fx = fixture();

    let rejected = fx
        .session
        .submit(ModerationJobRequest::new("v1", date(1), date(10)))
        .expect_err("nine-day range must be rejected");
    assert!(matches!(
        rejected,
        ModerationError::Validation(RejectionReason::RangeTooLong)
    ));
    assert_eq!(fx.analyzer.calls(), 0);
    assert!(fx.session.current_job().is_none());

    let outcome = run(&fx.session, ModerationJobRequest::new("v1", date(1), date(4))).await;
    assert_eq!(outcome, JobOutcome::Success);

    let job = fx.session.current_job().expect("job recorded");
    let summary = job.summary.expect("summary present");
    assert_eq!(summary.total_crawled, 40);
    assert_eq!(summary.analyzed_count, 40);

    let page = fx.session.page();
    assert_eq!(page.records.len(), 40);
    assert_eq!(page.scope.url.as_deref(), Some("v1"));
    assert!(page.records.iter().all(|r| r.source_url == "v1"));
    assert!(!page.stats.loading);
}

#[tokio::test]
async fn deleting_a_scope_leaves_other_urls_alone() {
    let fx = fixture();
    run(&fx.session, ModerationJobRequest::new("v1", date(1), date(4))).await;
    run(&fx.session, ModerationJobRequest::new("v2", date(1), date(4))).await;

    fx.session.filter(Scope::for_url("v2"));
    let outcome = fx
        .session
        .delete_all_in_scope()
        .await
        .expect("scope delete succeeds");
    assert_eq!(outcome.deleted.len(), 10);

    let remaining = fx.session.filter(Scope::all());
    assert_eq!(remaining.records.len(), 40);
    assert!(remaining.records.iter().all(|r| r.source_url == "v1"));
}

#[tokio::test]
async fn narrowing_the_filter_keeps_selection_within_visible_records() {
    let fx = fixture();
    run(&fx.session, ModerationJobRequest::new("v1", date(1), date(4))).await;

    let selected = fx.session.change_selection(SelectionChange::SelectAll);
    assert_eq!(selected.len(), 40);

    let narrowed = fx
        .session
        .filter(Scope::for_url("v1").with_verdict(comment_shield::domain::VerdictFilter::Malicious));
    let visible: Vec<_> = narrowed.records.iter().map(|r| r.comment_id.clone()).collect();
    assert!(narrowed.selected.iter().all(|id| visible.contains(id)));
}

#[tokio::test]
async fn stored_history_reloads_and_discards() {
    let fx = fixture();
    run(&fx.session, ModerationJobRequest::new("v1", date(1), date(4))).await;
    assert_eq!(fx.comments.len(), 40);
    fx.session.filter(Scope::for_url("v2"));

    let loaded = fx
        .session
        .load_history(Scope::for_url("v1"))
        .await
        .expect("history loads");
    assert_eq!(loaded, 40);
    assert_eq!(fx.session.page().records.len(), 40);

    let removed = fx
        .session
        .discard_history(" v1 ")
        .await
        .expect("history discarded");
    assert_eq!(removed, 40);
    assert!(fx.comments.list(&Scope::all()).await.expect("list").is_empty());
    assert!(fx.session.filter(Scope::all()).records.is_empty());
}

#[tokio::test]
async fn undated_and_relative_comments_stay_visible_after_a_past_window() {
    let fx = fixture();
    let records = (0..40)
        .map(|i| RawComment {
            external_id: Some(format!("w-{i}")),
            author_name: Some("viewer".to_string()),
            text: Some(format!("comment {i}")),
            publish_date: (i % 2 == 0).then(|| "3일 전".to_string()),
            ..RawComment::default()
        })
        .collect();
    fx.analyzer.insert(
        "w1",
        CrawlReport {
            total_crawled: 40,
            analyzed_count: 40,
            records,
        },
    );

    let outcome = run(&fx.session, ModerationJobRequest::new("w1", date(1), date(5))).await;
    assert_eq!(outcome, JobOutcome::Success);

    let page = fx.session.page();
    assert_eq!(page.stats.cached, 40);
    assert_eq!(page.records.len(), 40);
}
