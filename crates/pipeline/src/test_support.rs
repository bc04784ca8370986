//! Shared test doubles for pipeline tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use siphon_sinks::elasticsearch::{
    BulkActionResult, BulkError, BulkItemResult, BulkResponse, BulkTransport, SubmitOutcome,
};

/// Transport double that replays a script of outcomes
///
/// Each `submit` records the body and pops the next scripted outcome;
/// an exhausted script yields clean successes sized to the submitted body.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<SubmitOutcome>>,
    bodies: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome
    pub fn push(&self, outcome: SubmitOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Queue the same outcome `n` times
    pub fn push_n(&self, outcome: SubmitOutcome, n: usize) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(outcome.clone());
        }
    }

    /// Bodies submitted so far, in order
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }

    /// Number of submissions observed
    pub fn submit_count(&self) -> usize {
        self.bodies.lock().len()
    }
}

#[async_trait]
impl BulkTransport for ScriptedTransport {
    async fn submit(&self, body: String) -> SubmitOutcome {
        let doc_count = body.lines().count() / 2;
        self.bodies.lock().push(body);

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| success_for(doc_count))
    }
}

/// A clean success for `doc_count` documents
pub fn success_for(doc_count: usize) -> SubmitOutcome {
    let items = (0..doc_count)
        .map(|_| BulkActionResult {
            index: BulkItemResult {
                index: String::new(),
                id: String::new(),
                status: 201,
                error: None,
            },
        })
        .collect();

    SubmitOutcome::Success(BulkResponse {
        took: 1,
        errors: false,
        items,
    })
}

/// A 2xx response rejecting the given doc ids
pub fn success_with_failures(all_ids: &[&str], failed_ids: &[&str]) -> SubmitOutcome {
    let items = all_ids
        .iter()
        .map(|id| {
            let failed = failed_ids.contains(id);
            BulkActionResult {
                index: BulkItemResult {
                    index: String::new(),
                    id: id.to_string(),
                    status: if failed { 400 } else { 201 },
                    error: failed.then(|| BulkError {
                        kind: "mapper_parsing_exception".to_string(),
                        reason: "failed to parse".to_string(),
                    }),
                },
            }
        })
        .collect();

    SubmitOutcome::Success(BulkResponse {
        took: 1,
        errors: !failed_ids.is_empty(),
        items,
    })
}

/// A gateway-level failure
pub fn transport_failed() -> SubmitOutcome {
    SubmitOutcome::TransportFailed {
        reason: "http status 502 Bad Gateway".to_string(),
    }
}

/// Doc ids appearing in a bulk body's action lines, in order
pub fn action_ids(body: &str) -> Vec<String> {
    body.lines()
        .step_by(2)
        .filter_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).ok()?;
            Some(value["index"]["_id"].as_str()?.to_string())
        })
        .collect()
}

/// Index names appearing in a bulk body's action lines, in order
pub fn action_indexes(body: &str) -> Vec<String> {
    body.lines()
        .step_by(2)
        .filter_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).ok()?;
            Some(value["index"]["_index"].as_str()?.to_string())
        })
        .collect()
}
