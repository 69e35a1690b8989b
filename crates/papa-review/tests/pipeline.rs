use std::sync::Arc;

use papa_core::{
    AnalysisError, CollaboratorError, PapaError, PullRequestTarget, ReviewConfig, ReviewStep,
    ScmError,
};
use papa_review::dispatch::{dispatch, EventOutcome};
use papa_review::event::parse_event;
use papa_review::format::{FOOTER, HEADER, SIGNATURE, TOO_LARGE_ADVISORY};
use papa_review::pipeline::{ReviewOutcome, ReviewPipeline};
use papa_review::testing::{RecordingAnalyzer, RecordingSourceControl, ScmCall};

const SMALL_DIFF: &str = "diff --git a/x b/x\n+1 line";

fn target() -> PullRequestTarget {
    PullRequestTarget::new("octocat", "hello", 7)
}

fn pipeline(scm: &Arc<RecordingSourceControl>, analyzer: &Arc<RecordingAnalyzer>) -> ReviewPipeline {
    ReviewPipeline::new(scm.clone(), analyzer.clone(), ReviewConfig::default())
}

fn event_payload(action: &str) -> Vec<u8> {
    serde_json::json!({
        "action": action,
        "number": 7,
        "repository": { "name": "hello", "owner": { "login": "octocat" } }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn synchronize_event_is_analyzed_and_posted_once() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding("Looks fine overall."));
    let event = parse_event(&event_payload("synchronize")).unwrap();

    let outcome = dispatch(&event, |_| {
        let pipeline = pipeline(&scm, &analyzer);
        async move { Ok(pipeline) }
    })
    .await
    .unwrap();

    assert_eq!(
        outcome,
        EventOutcome::Reviewed {
            outcome: ReviewOutcome::Posted
        }
    );
    assert_eq!(analyzer.calls(), vec![SMALL_DIFF.to_string()]);

    let posted = scm.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].starts_with(HEADER));
    assert!(posted[0].ends_with(FOOTER));
    assert_eq!(posted[0].matches(SIGNATURE).count(), 1);
}

#[tokio::test]
async fn closed_event_makes_no_collaborator_calls() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));
    let mut connected = false;

    for action in ["closed", "labeled", "assigned"] {
        let event = parse_event(&event_payload(action)).unwrap();
        let outcome = dispatch(&event, |_| {
            connected = true;
            let pipeline = pipeline(&scm, &analyzer);
            async move { Ok(pipeline) }
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Ineligible {
                action: action.to_string()
            }
        );
    }

    assert!(!connected, "ineligible events must not authenticate");
    assert!(scm.calls().is_empty());
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn authentication_failure_stops_before_any_call() {
    let event = parse_event(&event_payload("opened")).unwrap();
    let err = dispatch(&event, |_| async {
        Err::<ReviewPipeline, _>(PapaError::Authentication("bad key".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, PapaError::Authentication(_)));
}

#[tokio::test]
async fn existing_signed_comment_skips_everything() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .with_comments(["LGTM", "Reviewed by Code Review Papa already"])
            .with_diff(SMALL_DIFF),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    assert_eq!(outcome, ReviewOutcome::AlreadyReviewed);
    assert_eq!(scm.calls(), vec![ScmCall::ListComments(target())]);
    assert_eq!(scm.diff_fetches(), 0);
    assert!(scm.posted().is_empty());
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn signature_match_is_case_sensitive() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .with_comments(["code review papa was here"])
            .with_diff(SMALL_DIFF),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("ok"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();
    assert_eq!(outcome, ReviewOutcome::Posted);
}

#[tokio::test]
async fn unsigned_comments_do_not_block_review() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .with_comments(["LGTM", "", "please add tests"])
            .with_diff(SMALL_DIFF),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("ok"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();
    assert_eq!(outcome, ReviewOutcome::Posted);
    assert_eq!(scm.posted().len(), 1);
}

#[tokio::test]
async fn empty_diff_posts_nothing() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(""));
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    assert_eq!(outcome, ReviewOutcome::EmptyDiff);
    assert!(scm.posted().is_empty());
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn oversized_diff_posts_advisory_without_analysis() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff("a".repeat(150_000)));
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    assert_eq!(outcome, ReviewOutcome::TooLarge { bytes: 150_000 });
    assert!(analyzer.calls().is_empty());
    assert_eq!(scm.posted(), vec![TOO_LARGE_ADVISORY.to_string()]);
}

#[tokio::test]
async fn diff_at_the_limit_is_still_analyzed() {
    let diff = "b".repeat(100_000);
    let scm = Arc::new(RecordingSourceControl::new().with_diff(diff.clone()));
    let analyzer = Arc::new(RecordingAnalyzer::responding("fine"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    assert_eq!(outcome, ReviewOutcome::Posted);
    assert_eq!(analyzer.calls(), vec![diff]);
}

#[tokio::test]
async fn size_limit_counts_bytes_not_chars() {
    // 50_001 two-byte characters: 100_002 bytes.
    let diff = "é".repeat(50_001);
    let scm = Arc::new(RecordingSourceControl::new().with_diff(diff));
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let outcome = pipeline(&scm, &analyzer).review(&target()).await.unwrap();
    assert_eq!(outcome, ReviewOutcome::TooLarge { bytes: 100_002 });
}

#[tokio::test]
async fn configured_limit_is_honored() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));
    let pipeline = ReviewPipeline::new(
        scm.clone(),
        analyzer.clone(),
        ReviewConfig { max_diff_bytes: 10 },
    );

    let outcome = pipeline.review(&target()).await.unwrap();
    assert!(matches!(outcome, ReviewOutcome::TooLarge { .. }));
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn analysis_with_own_header_is_not_double_headed() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding(
        "## Code Review\n\nNo issues found.",
    ));

    pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    let posted = scm.posted();
    assert!(posted[0].starts_with("## Code Review"));
    assert!(!posted[0].contains(HEADER.trim()));
    assert_eq!(posted[0].matches(SIGNATURE).count(), 1);
}

#[tokio::test]
async fn second_run_after_post_is_a_no_op() {
    let first = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding("Code Review Papa thinks: ok"));
    pipeline(&first, &analyzer).review(&target()).await.unwrap();
    let posted = first.posted();

    let second = Arc::new(
        RecordingSourceControl::new()
            .with_comments(posted)
            .with_diff(SMALL_DIFF),
    );
    let outcome = pipeline(&second, &analyzer).review(&target()).await.unwrap();

    assert_eq!(outcome, ReviewOutcome::AlreadyReviewed);
    assert!(second.posted().is_empty());
    assert_eq!(analyzer.calls().len(), 1);
}

#[tokio::test]
async fn analysis_failure_posts_nothing() {
    for err in [
        AnalysisError::Provider("rate limited".into()),
        AnalysisError::Transport("timeout".into()),
        AnalysisError::EmptyResponse,
    ] {
        let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
        let analyzer = Arc::new(RecordingAnalyzer::failing(err.clone()));

        let failure = pipeline(&scm, &analyzer)
            .review(&target())
            .await
            .unwrap_err();

        assert_eq!(failure.step, ReviewStep::Analyze);
        assert_eq!(failure.target, target());
        assert_eq!(failure.source, CollaboratorError::Analysis(err));
        assert!(scm.posted().is_empty());
        assert_eq!(analyzer.calls().len(), 1);
    }
}

#[tokio::test]
async fn list_failure_is_reported_at_list_step() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .failing_list(ScmError::Unauthorized("Bad credentials".into()))
            .with_diff(SMALL_DIFF),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let failure = pipeline(&scm, &analyzer)
        .review(&target())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ReviewStep::ListComments);
    assert_eq!(scm.diff_fetches(), 0);
    assert!(analyzer.calls().is_empty());
    assert!(failure.to_string().contains("octocat/hello#7"));
}

#[tokio::test]
async fn diff_failure_is_reported_at_fetch_step() {
    let scm = Arc::new(
        RecordingSourceControl::new().failing_diff(ScmError::Transport("reset".into())),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let failure = pipeline(&scm, &analyzer)
        .review(&target())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ReviewStep::FetchDiff);
    assert!(analyzer.calls().is_empty());
    assert!(scm.posted().is_empty());
}

#[tokio::test]
async fn post_failure_is_reported_at_post_step() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .with_diff(SMALL_DIFF)
            .failing_post(ScmError::Api {
                status: 422,
                body: "Validation Failed".into(),
            }),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("ok"));

    let failure = pipeline(&scm, &analyzer)
        .review(&target())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ReviewStep::PostComment);
    assert_eq!(scm.posted().len(), 1, "exactly one attempt, no retry");
}

#[tokio::test]
async fn advisory_post_failure_is_reported_at_advisory_step() {
    let scm = Arc::new(
        RecordingSourceControl::new()
            .with_diff("x".repeat(100_001))
            .failing_post(ScmError::Transport("reset".into())),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));

    let failure = pipeline(&scm, &analyzer)
        .review(&target())
        .await
        .unwrap_err();

    assert_eq!(failure.step, ReviewStep::PostAdvisory);
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn steps_run_in_order() {
    let scm = Arc::new(RecordingSourceControl::new().with_diff(SMALL_DIFF));
    let analyzer = Arc::new(RecordingAnalyzer::responding("ok"));

    pipeline(&scm, &analyzer).review(&target()).await.unwrap();

    let calls = scm.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], ScmCall::ListComments(target()));
    assert_eq!(calls[1], ScmCall::FetchDiff(target()));
    assert!(matches!(&calls[2], ScmCall::PostComment(t, _) if *t == target()));
}

#[tokio::test]
async fn pipeline_failure_surfaces_through_dispatch() {
    let scm = Arc::new(
        RecordingSourceControl::new().failing_diff(ScmError::Transport("down".into())),
    );
    let analyzer = Arc::new(RecordingAnalyzer::responding("unused"));
    let event = parse_event(&event_payload("reopened")).unwrap();

    let err = dispatch(&event, |_| {
        let pipeline = pipeline(&scm, &analyzer);
        async move { Ok(pipeline) }
    })
    .await
    .unwrap_err();

    match err {
        PapaError::Review(review) => assert_eq!(review.step, ReviewStep::FetchDiff),
        other => panic!("expected review error, got {other:?}"),
    }
}
