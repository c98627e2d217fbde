//! End-to-end scenarios through the workflow facade.

use anyhow::Result;
use deliberation::{
    BallotDraft, Decision, EntityStore, OutcomeType, RevealOutcome, ReviewPhase, ReviewWorkflow,
    SchemeType, TriggerType, WorkflowConfig, WorkflowError,
};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn in_memory_workflow() -> ReviewWorkflow {
    init_tracing();
    ReviewWorkflow::with_store(EntityStore::in_memory().shared())
}

#[tokio::test]
async fn blind_review_flow_reveals_at_threshold() -> Result<()> {
    let workflow = in_memory_workflow();
    let phase = workflow.phase()?;
    let ballots = workflow.ballots()?;

    phase.initialize("A", 2).await?;

    ballots
        .submit("A", BallotDraft::new(Decision::Approve, 4, "handles every error path"))
        .await?;
    assert!(!phase.can_reveal("A").await?);

    ballots
        .submit("A", BallotDraft::new(Decision::Reject, 3, "migration lacks a rollback"))
        .await?;
    assert!(phase.can_reveal("A").await?);

    let outcome = phase.reveal("A").await?;
    assert_eq!(outcome, RevealOutcome::Revealed { ballots_revealed: 2 });

    let revealed = ballots.ballots_for("A").await?;
    assert_eq!(revealed.len(), 2);
    assert!(revealed.iter().all(|b| b.revealed));

    // Phase is terminal: no more ballots, second reveal is deduplicated
    let err = ballots
        .submit("A", BallotDraft::new(Decision::Neutral, 1, "arrives after the reveal"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SubmissionClosed { .. }));
    assert_eq!(phase.reveal("A").await?, RevealOutcome::AlreadyRevealed);
    assert!(!phase.can_submit("A").await?);

    Ok(())
}

#[tokio::test]
async fn short_rationale_names_minimum_length() -> Result<()> {
    let workflow = in_memory_workflow();
    let err = workflow
        .ballots()?
        .submit("A", BallotDraft::new(Decision::Approve, 4, "too short"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("10"));
    Ok(())
}

#[tokio::test]
async fn initialization_is_idempotent() -> Result<()> {
    let workflow = in_memory_workflow();
    let phase = workflow.phase()?;

    phase.initialize("A", 5).await?;
    phase.initialize("A", 5).await?;

    let item = phase.initialize("A", 5).await?;
    assert_eq!(item.ballot_threshold, 5);
    assert_eq!(item.phase, ReviewPhase::Blinded);

    // First ballot on an unknown reference auto-initializes with default 3
    workflow
        .ballots()?
        .submit("B", BallotDraft::new(Decision::Approve, 2, "auto-created on first ballot"))
        .await?;
    assert!(phase.can_submit("B").await?);
    assert!(!phase.can_reveal("B").await?);

    Ok(())
}

#[tokio::test]
async fn auto_outcome_enters_calibration_only_after_confirmation() -> Result<()> {
    let workflow = in_memory_workflow();

    workflow
        .ballots()?
        .submit("A", BallotDraft::new(Decision::Approve, 5, "confident this merges clean"))
        .await?;

    let tracker = workflow.outcomes()?;
    let recorded = tracker.record("A", OutcomeType::BugFound, true, None).await?;
    assert!(!recorded.user_confirmed);

    // Unconfirmed auto-detection: no calibration data yet
    let engine = workflow.calibration()?;
    assert!(engine.data_points().await?.is_empty());

    tracker.confirm(&recorded.id, true, None).await?;

    let points = engine.data_points().await?;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].outcome_type, OutcomeType::BugFound);
    // Approve against a confirmed bug: the reviewer was wrong
    assert!(!points[0].outcome_success);

    let report = engine.report().await?;
    assert_eq!(report.points, 1);
    // confidence 5 -> 1.0 stated, outcome 0.0: Brier 1.0, fully overconfident
    assert!((report.brier_score.unwrap() - 1.0).abs() < f64::EPSILON);
    assert!((report.overconfidence_rate.unwrap() - 1.0).abs() < f64::EPSILON);

    Ok(())
}

#[tokio::test]
async fn neutral_ballots_never_reach_calibration() -> Result<()> {
    let workflow = in_memory_workflow();

    workflow
        .ballots()?
        .submit("A", BallotDraft::new(Decision::Neutral, 5, "cannot evaluate this area"))
        .await?;
    workflow
        .outcomes()?
        .record("A", OutcomeType::MergedClean, false, None)
        .await?;

    assert!(workflow.calibration()?.data_points().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn scheme_and_retrospective_analytics() -> Result<()> {
    let workflow = in_memory_workflow();

    let schemes = workflow.schemes()?;
    schemes
        .record("A", SchemeType::Majority, "three of five approved", None)
        .await?;
    schemes
        .record("B", SchemeType::Majority, "clear majority again", None)
        .await?;
    schemes
        .record(
            "C",
            SchemeType::Custom,
            "domain expert decides",
            Some("expert-owner".to_string()),
        )
        .await?;

    let retros = workflow.retrospectives()?;
    retros
        .record(
            "B",
            TriggerType::AutoRevert,
            "reverted within a day of merging",
            "stage migrations behind a flag",
            &[
                deliberation::BiasPattern::Overconfidence,
                deliberation::BiasPattern::Groupthink,
            ],
        )
        .await?;

    let analytics = retros.analytics().await?;
    assert_eq!(analytics.total_retrospectives, 1);
    assert_eq!(analytics.scheme_distribution[&SchemeType::Majority], 2);
    assert_eq!(analytics.scheme_distribution[&SchemeType::Custom], 1);
    assert_eq!(
        analytics.bias_frequency[&deliberation::BiasPattern::Overconfidence],
        1
    );

    assert_eq!(
        schemes.latest("C").await?.unwrap().custom_name.as_deref(),
        Some("expert-owner")
    );

    Ok(())
}

#[tokio::test]
async fn posted_marker_prevents_duplicate_publication() -> Result<()> {
    let workflow = in_memory_workflow();
    let phase = workflow.phase()?;

    assert!(!phase.is_posted("A").await?);
    assert!(phase.mark_posted("A", "comment-77").await?);
    assert!(phase.is_posted("A").await?);
    assert!(!phase.mark_posted("A", "comment-78").await?);

    Ok(())
}

#[tokio::test]
async fn revealed_phase_survives_reopen() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let config = WorkflowConfig {
        state_path: dir.path().join("state.json"),
    };

    {
        let workflow = ReviewWorkflow::new(config.clone());
        workflow.init().await?;
        let ballots = workflow.ballots()?;
        workflow.phase()?.initialize("A", 1).await?;
        ballots
            .submit("A", BallotDraft::new(Decision::Approve, 4, "single-reviewer fast path"))
            .await?;
        workflow.phase()?.reveal("A").await?;
    }

    let workflow = ReviewWorkflow::new(config);
    workflow.init().await?;
    let phase = workflow.phase()?;

    // Monotonic across restarts: still revealed, still closed
    assert!(!phase.can_submit("A").await?);
    assert_eq!(phase.reveal("A").await?, RevealOutcome::AlreadyRevealed);
    assert!(workflow.ballots()?.ballots_for("A").await?[0].revealed);

    Ok(())
}

#[tokio::test]
async fn corrupt_snapshot_recovers_to_empty_store() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, "definitely not json")?;

    let workflow = ReviewWorkflow::new(WorkflowConfig {
        state_path: state_path.clone(),
    });
    workflow.init().await?;

    // Store is usable and empty; the bad bytes were moved aside
    assert!(workflow.ballots()?.ballots_for("A").await?.is_empty());
    let backed_up = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains("corrupt-"));
    assert!(backed_up);

    Ok(())
}
