//! Tests for the Elasticsearch partition processor
//!
//! Submission counts follow the three-phase contract: one unbounded
//! transport-retried submit, a bounded retry of rejected documents, and a
//! bounded quarantine submit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use siphon_protocol::RawEvent;
use siphon_sinks::elasticsearch::{BulkError, SubmitOutcome};

use crate::checkpoint::RecordingCheckpointer;
use crate::error::PipelineError;
use crate::host::{CloseReason, PartitionContext, PartitionProcessor};
use crate::indexer::{IndexerOptions, IndexerProcessor};
use crate::test_support::{
    action_ids, action_indexes, success_with_failures, transport_failed, ScriptedTransport,
};

struct Fixture {
    processor: IndexerProcessor,
    transport: Arc<ScriptedTransport>,
    checkpointer: Arc<RecordingCheckpointer>,
    cancel: CancellationToken,
}

fn fixture(options: IndexerOptions) -> Fixture {
    let transport = Arc::new(ScriptedTransport::new());
    let checkpointer = Arc::new(RecordingCheckpointer::new());
    let cancel = CancellationToken::new();
    let ctx = PartitionContext::new("5", checkpointer.clone(), cancel.clone());
    let processor = IndexerProcessor::new(ctx, transport.clone(), options);

    Fixture {
        processor,
        transport,
        checkpointer,
        cancel,
    }
}

fn no_stats() -> IndexerOptions {
    IndexerOptions {
        stats_enabled: false,
        ..IndexerOptions::default()
    }
}

fn serilog(message_id: &str, body: &str) -> RawEvent {
    RawEvent::new(body.as_bytes().to_vec(), Utc::now())
        .with_property("Type", "SerilogEvent")
        .with_property("MessageId", message_id)
}

// =============================================================================
// Clean batches
// =============================================================================

#[tokio::test]
async fn test_empty_batch_skips_submission() {
    let mut f = fixture(no_stats());

    f.processor.process(Vec::new()).await.unwrap();

    assert_eq!(f.transport.submit_count(), 0);
    assert_eq!(f.checkpointer.count(), 0);
    assert_eq!(f.processor.last_batch_failed_docs(), 0);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 0);
}

#[tokio::test]
async fn test_single_valid_event_submits_once() {
    let mut f = fixture(no_stats());

    f.processor
        .process(vec![serilog("a", r#"{"message":"hi"}"#)])
        .await
        .unwrap();

    assert_eq!(f.transport.submit_count(), 1);
    assert_eq!(f.processor.last_batch_failed_docs(), 0);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 0);

    let body = &f.transport.bodies()[0];
    assert_eq!(action_ids(body), vec!["a"]);
}

#[tokio::test]
async fn test_heterogeneous_batch_with_stats_indexes_six_items() {
    let mut f = fixture(IndexerOptions::default());

    let batch = vec![
        serilog("s1", r#"{"message":"log"}"#),
        RawEvent::new(&b"{}"[..], Utc::now())
            .with_property("Type", "RoboCustosInteraction")
            .with_property("MessageId", "i1"),
        RawEvent::new(&b"{}"[..], Utc::now())
            .with_property("Type", "ExternalTelemetry")
            .with_property("MessageId", "t1"),
        RawEvent::new(&b"{}"[..], Utc::now())
            .with_property("Type", "azure-resources")
            .with_property("MessageId", "r1"),
    ];
    f.processor.process(batch).await.unwrap();

    assert_eq!(f.transport.submit_count(), 1);

    let body = &f.transport.bodies()[0];
    let indexes = action_indexes(body);
    assert_eq!(indexes.len(), 6);
    assert!(indexes[0].starts_with("logstash-"));
    assert!(indexes[1].starts_with("robointeractions-"));
    assert!(indexes[2].starts_with("externaltelemetry-"));
    assert_eq!(indexes[3], "azure-resources");
    assert!(indexes[4].starts_with("ingestionstats-"));
    assert!(indexes[5].starts_with("ingestionstats-"));
}

// =============================================================================
// Transport retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transport_failures_retry_until_success() {
    let mut f = fixture(no_stats());
    f.transport.push_n(transport_failed(), 100);

    f.processor
        .process(vec![serilog("a", r#"{"message":"hi"}"#)])
        .await
        .unwrap();

    assert_eq!(f.transport.submit_count(), 101);
    assert_eq!(f.processor.last_batch_failed_docs(), 0);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 0);
}

#[tokio::test]
async fn test_structured_server_error_fails_the_batch() {
    let mut f = fixture(no_stats());
    f.transport.push(SubmitOutcome::ServerError {
        status: 400,
        error: BulkError {
            kind: "illegal_argument_exception".to_string(),
            reason: "malformed action line".to_string(),
        },
    });

    let err = f
        .processor
        .process(vec![serilog("a", "{}")])
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::BulkRejected { status: 400, .. }));
    assert_eq!(f.checkpointer.count(), 0);
}

// =============================================================================
// Per-document retry and quarantine
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_persistent_item_failure_retries_then_quarantines() {
    let mut f = fixture(no_stats());

    // First submit rejects "b"; the bounded retry keeps rejecting it
    f.transport
        .push(success_with_failures(&["a", "b", "c"], &["b"]));
    f.transport.push_n(success_with_failures(&["b"], &["b"]), 10);
    // Quarantine submit falls through to the default clean success

    let batch = vec![
        serilog("a", r#"{"message":"1"}"#),
        serilog("b", ""),
        serilog("c", r#"{"message":"3"}"#),
    ];
    f.processor.process(batch).await.unwrap();

    // 1 initial + 10 bounded retries + 1 quarantine
    assert_eq!(f.transport.submit_count(), 12);
    assert_eq!(f.processor.last_batch_failed_docs(), 1);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 1);

    let bodies = f.transport.bodies();
    // Retry bodies carry only the rejected document
    assert_eq!(action_ids(&bodies[1]), vec!["b"]);
    assert_eq!(action_ids(&bodies[10]), vec!["b"]);
    // The quarantine body targets the abandoned-docs family
    let quarantine = &bodies[11];
    assert_eq!(action_ids(quarantine), vec!["b"]);
    assert!(action_indexes(quarantine)[0].starts_with("abandoneddocs-"));
    assert!(quarantine.contains("mapper_parsing_exception"));
}

#[tokio::test(start_paused = true)]
async fn test_recovered_item_failure_skips_quarantine() {
    let mut f = fixture(no_stats());

    f.transport
        .push(success_with_failures(&["a", "b"], &["b"]));
    // The first bounded retry succeeds

    f.processor
        .process(vec![serilog("a", "{}"), serilog("b", "{}")])
        .await
        .unwrap();

    assert_eq!(f.transport.submit_count(), 2);
    assert_eq!(f.processor.last_batch_failed_docs(), 1);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 0);
}

#[tokio::test]
async fn test_invalid_event_goes_straight_to_quarantine() {
    let mut f = fixture(no_stats());

    let batch = vec![RawEvent::new(&b"{\"a\":\n1}"[..], Utc::now())
        .with_property("Type", "SerilogEvent")
        .with_property("MessageId", "nl")];
    f.processor.process(batch).await.unwrap();

    // No valid items and stats disabled: the only submit is the quarantine
    assert_eq!(f.transport.submit_count(), 1);
    assert_eq!(f.processor.last_batch_failed_docs(), 0);
    assert_eq!(f.processor.last_batch_abandoned_docs(), 1);

    let body = &f.transport.bodies()[0];
    assert!(action_indexes(body)[0].starts_with("abandoneddocs-"));
    assert!(body.contains("Document body contains newlines"));
}

#[tokio::test]
async fn test_invalid_event_with_stats_still_submits_stats_items() {
    let mut f = fixture(IndexerOptions::default());

    let batch = vec![RawEvent::new(&b"{\"a\":\n1}"[..], Utc::now())
        .with_property("Type", "SerilogEvent")
        .with_property("MessageId", "nl")];
    f.processor.process(batch).await.unwrap();

    // Stats-only normal submit, then the quarantine submit
    assert_eq!(f.transport.submit_count(), 2);
    let bodies = f.transport.bodies();
    for index in action_indexes(&bodies[0]) {
        assert!(index.starts_with("ingestionstats-"));
    }
    assert!(action_indexes(&bodies[1])[0].starts_with("abandoneddocs-"));
    assert_eq!(f.processor.last_batch_abandoned_docs(), 1);
}

// =============================================================================
// Stats carry-over
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_next_batch_stats_carry_previous_counters() {
    let mut f = fixture(IndexerOptions {
        stats_enabled: true,
        ..no_stats()
    });

    f.transport.push(success_with_failures(&["a"], &["a"]));
    f.transport.push_n(success_with_failures(&["a"], &["a"]), 10);
    f.processor.process(vec![serilog("a", "")]).await.unwrap();

    f.processor
        .process(vec![serilog("b", r#"{"message":"ok"}"#)])
        .await
        .unwrap();

    let bodies = f.transport.bodies();
    let second_batch_body = &bodies[bodies.len() - 1];
    assert!(second_batch_body.contains("\"lastBatchFailedDocuments\":1"));
    assert!(second_batch_body.contains("\"lastBatchAbandonedDocuments\":1"));
}

// =============================================================================
// Checkpointing and close
// =============================================================================

#[tokio::test]
async fn test_checkpoint_after_interval() {
    let mut f = fixture(IndexerOptions {
        checkpoint_interval: Duration::ZERO,
        ..no_stats()
    });

    f.processor.process(vec![serilog("a", "{}")]).await.unwrap();
    assert_eq!(f.checkpointer.calls(), vec!["5".to_string()]);
}

#[tokio::test]
async fn test_close_on_shutdown_checkpoints_unconditionally() {
    let mut f = fixture(no_stats());

    f.processor.open().await.unwrap();
    f.processor.close(CloseReason::Shutdown).await.unwrap();

    assert_eq!(f.checkpointer.count(), 1);
}

#[tokio::test]
async fn test_close_on_lost_lease_never_checkpoints() {
    let mut f = fixture(no_stats());

    f.processor.process(vec![serilog("a", "{}")]).await.unwrap();
    f.processor.close(CloseReason::LeaseLost).await.unwrap();
    f.processor.close(CloseReason::Failure).await.unwrap();

    assert_eq!(f.checkpointer.count(), 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancellation_propagates_from_submission() {
    let mut f = fixture(no_stats());
    f.transport.push_n(transport_failed(), 5);
    f.cancel.cancel();

    let err = f
        .processor
        .process(vec![serilog("a", "{}")])
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(f.checkpointer.count(), 0);
}
