//! Bulk wire-format framing
//!
//! The `/_bulk` endpoint takes newline-delimited action/body pairs:
//!
//! ```text
//! {"index":{"_index":"logstash-2024.06.01","_type":"logevent","_id":"..."}}
//! {"message":"..."}
//! ```
//!
//! `BulkFrame` keeps each framed document addressable by id so the caller
//! can rebuild a body from just the documents a response rejected, in the
//! original order.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Serialize;

use siphon_protocol::BulkItem;

/// Action metadata line for one document
///
/// Field order matters on the wire and follows declaration order.
#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

#[derive(Serialize)]
struct Action<'a> {
    index: ActionMeta<'a>,
}

/// One framed document: its action line and its body line
#[derive(Debug, Clone)]
pub struct FramedDoc {
    /// Document identifier, mirrored from the action line
    pub doc_id: String,

    /// Serialized action line
    pub action: String,

    /// Single-line document body
    pub body: String,
}

/// An ordered set of framed documents addressable by id
#[derive(Debug, Default)]
pub struct BulkFrame {
    docs: Vec<FramedDoc>,
    by_id: HashMap<String, usize>,
}

impl BulkFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame one item and append it
    ///
    /// The body's no-newline invariant is enforced at classification time;
    /// framing trusts it.
    pub fn push(&mut self, item: &BulkItem) {
        let action = Action {
            index: ActionMeta {
                index: &item.index_name,
                doc_type: &item.doc_type,
                id: &item.doc_id,
            },
        };
        // Serializing a struct of string fields cannot fail
        let action = serde_json::to_string(&action).unwrap_or_default();

        self.by_id.insert(item.doc_id.clone(), self.docs.len());
        self.docs.push(FramedDoc {
            doc_id: item.doc_id.clone(),
            action,
            body: item.body.clone(),
        });
    }

    /// Number of framed documents
    #[inline]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the frame holds no documents
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Look up a framed document by id
    #[inline]
    pub fn get(&self, doc_id: &str) -> Option<&FramedDoc> {
        self.by_id.get(doc_id).map(|&i| &self.docs[i])
    }

    /// Iterate the framed documents in insertion order
    pub fn docs(&self) -> impl Iterator<Item = &FramedDoc> {
        self.docs.iter()
    }

    /// Build a new frame holding only the given ids, preserving order
    ///
    /// Ids not present in this frame are ignored.
    pub fn subset(&self, ids: &HashSet<String>) -> BulkFrame {
        let mut frame = BulkFrame::new();
        for doc in &self.docs {
            if ids.contains(&doc.doc_id) {
                frame.by_id.insert(doc.doc_id.clone(), frame.docs.len());
                frame.docs.push(doc.clone());
            }
        }
        frame
    }

    /// Render the bulk request body
    ///
    /// Each document contributes exactly two lines; the body ends with the
    /// trailing newline the bulk endpoint requires.
    pub fn body(&self) -> String {
        let estimated: usize = self
            .docs
            .iter()
            .map(|d| d.action.len() + d.body.len() + 2)
            .sum();
        let mut out = String::with_capacity(estimated);

        for doc in &self.docs {
            out.push_str(&doc.action);
            out.push('\n');
            out.push_str(&doc.body);
            out.push('\n');
        }
        out
    }
}
