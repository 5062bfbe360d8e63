// End-to-end scenarios for the timeline engine: whole blocks fed as log
// events, checked against the rendered report lines.

use bleep_timeline::classifier::*;
use bleep_timeline::{
    BlockReport, LogEvent, Milestone, PolicyVersion, ResolveError, TimelineConfig, TimelineEngine, TimelineError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap()
}

fn ts(secs: i64) -> String {
    (base() + Duration::seconds(secs)).to_rfc3339()
}

fn event(message: &str, secs: i64) -> LogEvent {
    LogEvent::new(message, ts(secs))
}

/// Every baseline milestone for `height`, one second apart, in canonical order.
fn canonical_block(height: u64, start: i64) -> Vec<LogEvent> {
    vec![
        event(PROPOSING_MESSAGE, start).with_field("blockNum", height),
        event(RECEIVED_COMMIT_SIGS_MESSAGE, start + 1),
        event("[ProposeNewBlock] Proposed 2 pending crosslinks", start + 2),
        event(COMMIT_SIGS_READY_MESSAGE, start + 3),
        event(NEW_BLOCK_PROPOSED_MESSAGE, start + 4).with_field("blockNum", height),
        event(STARTING_CONSENSUS_MESSAGE, start + 5).with_field("myBlock", height),
        event(SENT_ANNOUNCE_MESSAGE, start + 6).with_field("myBlock", height),
        event(QUORUM_DETAILS_MESSAGE, start + 7).with_field("phase", "Prepare"),
        event(ENOUGH_PREPARED_MESSAGE, start + 8),
        event(SENT_PREPARED_MESSAGE, start + 9).with_field("blockNum", height),
        event(QUORUM_DETAILS_MESSAGE, start + 10).with_field("phase", "Commit"),
        event(TWO_THIRDS_COMMITTED_MESSAGE, start + 11).with_field("MsgBlockNum", height),
        event(GRACE_PERIOD_END_MESSAGE, start + 12).with_field("MsgBlockNum", height),
        event(CONSENSUS_REACHED_MESSAGE, start + 13).with_field("blockNum", height),
    ]
}

fn run(engine: &mut TimelineEngine, events: &[LogEvent]) -> Vec<BlockReport> {
    events
        .iter()
        .filter_map(|e| engine.process(e).ok().flatten())
        .collect()
}

fn averaging_engine() -> TimelineEngine {
    TimelineEngine::new(TimelineConfig {
        averages: true,
        ..TimelineConfig::default()
    })
    .unwrap()
}

#[test]
fn test_two_full_blocks_one_second_apart() {
    init_logger();
    let mut engine = averaging_engine();
    let mut events = canonical_block(200, 0);
    events.extend(canonical_block(201, 14));

    let reports = run(&mut engine, &events);
    assert_eq!(reports.len(), 2);

    for (index, report) in reports.iter().enumerate() {
        let lines = report.lines();
        assert_eq!(lines.len(), 13, "{:#?}", lines);
        for line in &lines {
            assert!(line.starts_with("Time between "), "{}", line);
            assert!(line.ends_with(&format!("for block {} was 1s", index + 1)), "{}", line);
        }
    }
    assert_eq!(
        reports[0].lines()[0],
        "Time between proposing and received-commit-sig for block 1 was 1s"
    );
    assert_eq!(reports[1].height, Some(201));

    let averages: Vec<String> = engine.average_reports().iter().map(ToString::to_string).collect();
    assert_eq!(averages.len(), 13);
    assert!(averages.iter().all(|line| line.ends_with(" was 1s")));
    assert_eq!(
        averages.last().unwrap(),
        "Average Time between grace-period-end and consensus-reached was 1s"
    );
    assert!(engine.pending_blocks().is_empty());
}

#[test]
fn test_missing_sent_announce_is_reported_not_bridged() {
    init_logger();
    let mut engine = TimelineEngine::default();
    let events: Vec<LogEvent> = canonical_block(10, 0)
        .into_iter()
        .filter(|e| e.message() != SENT_ANNOUNCE_MESSAGE)
        .collect();

    let reports = run(&mut engine, &events);
    assert_eq!(reports.len(), 1);
    let lines = reports[0].lines();

    assert!(lines.contains(&"There is no metric sent-announce for block 1".to_string()));
    assert!(!lines.iter().any(|l| l.contains("and sent-announce") || l.contains("sent-announce and")));
    assert!(!lines.iter().any(|l| l.contains("starting-consensus and first-prepare")));
    assert_eq!(lines.len(), 12);
}

#[test]
fn test_block_offset_resolution() {
    init_logger();
    let mut engine = TimelineEngine::default();
    for (i, height) in (1000..=1005).enumerate() {
        engine
            .process(&event(PROPOSING_MESSAGE, i as i64).with_field("blockNum", height))
            .unwrap();
    }
    engine
        .process(&event(SENT_ANNOUNCE_MESSAGE, 10).with_field("myBlock", 1005))
        .unwrap();

    assert_eq!(engine.block_offset(), Some(1000));
    assert!(engine.ledger().get(5).unwrap().contains(Milestone::SentAnnounce));
    for position in 0..5 {
        assert!(!engine.ledger().get(position).unwrap().contains(Milestone::SentAnnounce));
    }
}

#[test]
fn test_unresolvable_height_skipped_and_run_continues() {
    init_logger();
    let mut engine = TimelineEngine::default();
    let mut events = canonical_block(30, 0);
    events.insert(3, event(SENT_PREPARED_MESSAGE, 2).with_field("blockNum", 45));

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for e in &events {
        match engine.process(e) {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(err) => failures.push(err),
        }
    }

    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        TimelineError::Unresolved {
            source: ResolveError::OutOfRange { position: 15, open: 1 },
            ..
        }
    ));
    assert_eq!(reports.len(), 1);
    assert!(reports[0].lines().iter().all(|l| l.ends_with("was 1s")));
}

#[test]
fn test_pipelined_blocks_resolve_independently() {
    init_logger();
    let mut engine = TimelineEngine::default();
    let events = vec![
        event(PROPOSING_MESSAGE, 0).with_field("blockNum", 50),
        event(SENT_ANNOUNCE_MESSAGE, 1).with_field("myBlock", 50),
        // Leader starts the next block before the previous one is committed.
        event(PROPOSING_MESSAGE, 2).with_field("blockNum", 51),
        event(COMMIT_SIGS_READY_MESSAGE, 3),
        event(GRACE_PERIOD_END_MESSAGE, 4).with_field("MsgBlockNum", 50),
        event(CONSENSUS_REACHED_MESSAGE, 5).with_field("blockNum", 50),
        event(COMMIT_SIGS_READY_MESSAGE, 6),
        event(SENT_ANNOUNCE_MESSAGE, 7).with_field("myBlock", 51),
        event(CONSENSUS_REACHED_MESSAGE, 9).with_field("blockNum", 51),
        event(GRACE_PERIOD_END_MESSAGE, 8).with_field("MsgBlockNum", 51),
    ];

    let reports = run(&mut engine, &events);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].block, 1);
    assert_eq!(reports[1].block, 2);

    let first = engine.ledger().get(0).unwrap();
    let second = engine.ledger().get(1).unwrap();
    assert_eq!(first.get(Milestone::CommitSigReady), events[3].timestamp().ok());
    assert_eq!(second.get(Milestone::CommitSigReady), events[6].timestamp().ok());
    assert_eq!(second.get(Milestone::SentAnnounce), events[7].timestamp().ok());
}

#[test]
fn test_duplicate_events_keep_first_timestamp() {
    init_logger();
    let mut engine = TimelineEngine::default();
    engine
        .process(&event(PROPOSING_MESSAGE, 0).with_field("blockNum", 1))
        .unwrap();
    engine
        .process(&event(STARTING_CONSENSUS_MESSAGE, 1).with_field("myBlock", 1))
        .unwrap();
    engine
        .process(&event(STARTING_CONSENSUS_MESSAGE, 4).with_field("myBlock", 1))
        .unwrap();

    let record = engine.ledger().get(0).unwrap();
    assert_eq!(record.get(Milestone::StartingConsensus), Some(base() + Duration::seconds(1)));
    assert_eq!(engine.stats().duplicates, 1);
}

#[test]
fn test_extended_policy_reports_commit_thresholds() {
    init_logger();
    let mut engine = TimelineEngine::new(TimelineConfig {
        policy: PolicyVersion::Extended,
        ..TimelineConfig::default()
    })
    .unwrap();

    let events = vec![
        event(PROPOSING_MESSAGE, 0).with_field("blockNum", 3),
        event(SENT_PREPARED_MESSAGE, 1).with_field("blockNum", 3),
        event(VOTE_ADDED_MESSAGE, 2).with_field("phase", "Commit"),
        event(VOTE_ADDED_MESSAGE, 3)
            .with_field("phase", "Commit")
            .with_field("total-power-of-signers", "0.97"),
        event(ALL_COMMITTED_MESSAGE, 4).with_field("MsgBlockNum", 3),
        event(GRACE_PERIOD_END_MESSAGE, 5).with_field("MsgBlockNum", 3),
        event(CONSENSUS_REACHED_MESSAGE, 6).with_field("blockNum", 3),
    ];
    let reports = run(&mut engine, &events);
    assert_eq!(reports.len(), 1);

    let record = engine.ledger().get(0).unwrap();
    assert_eq!(record.get(Milestone::FirstCommit), Some(base() + Duration::seconds(2)));
    assert_eq!(
        record.get(Milestone::NinetyFivePercentCommitted),
        Some(base() + Duration::seconds(3))
    );
    let lines = reports[0].lines();
    assert!(lines.contains(&"Time between 100%-committed and grace-period-end for block 1 was 1s".to_string()));
    assert!(lines.contains(&"There is no metric vrf-generated for block 1".to_string()));
}

proptest! {
    #[test]
    fn prop_height_maps_to_position(offset in 0u64..1_000_000, blocks in 1usize..40, pick in 0usize..40) {
        let pick = pick % blocks;
        let mut engine = TimelineEngine::default();
        for i in 0..blocks {
            engine.process(&event(PROPOSING_MESSAGE, i as i64).with_field("blockNum", offset + i as u64)).unwrap();
        }
        engine
            .process(&event(STARTING_CONSENSUS_MESSAGE, 100).with_field("myBlock", offset + pick as u64))
            .unwrap();
        for position in 0..blocks {
            let has = engine.ledger().get(position).unwrap().contains(Milestone::StartingConsensus);
            prop_assert_eq!(has, position == pick);
        }
    }

    #[test]
    fn prop_completion_fires_once(terminal_order in proptest::collection::vec(any::<bool>(), 2..8)) {
        let mut engine = TimelineEngine::default();
        engine.process(&event(PROPOSING_MESSAGE, 0).with_field("blockNum", 9)).unwrap();

        let mut fired = 0;
        let mut seen_grace = false;
        let mut seen_consensus = false;
        for (i, grace) in terminal_order.iter().enumerate() {
            let e = if *grace {
                seen_grace = true;
                event(GRACE_PERIOD_END_MESSAGE, i as i64 + 1).with_field("MsgBlockNum", 9)
            } else {
                seen_consensus = true;
                event(CONSENSUS_REACHED_MESSAGE, i as i64 + 1).with_field("blockNum", 9)
            };
            if engine.process(&e).unwrap().is_some() {
                fired += 1;
                prop_assert!(seen_grace && seen_consensus);
            }
        }
        prop_assert_eq!(fired, usize::from(seen_grace && seen_consensus));
    }
}
