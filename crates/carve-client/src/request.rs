//! Request identifier allocation and reply correlation.
//!
//! Every outgoing request carries a session-scoped, strictly increasing qid.
//! A [`RequestHandle`] observes the raw inbound message broadcast and
//! resolves exactly once, when a terminal reply carrying its own qid arrives.
//! Replies for other qids are ignored; any number of handles may coexist.
//!
//! The protocol defines no reply deadline, so a handle with no timeout can
//! stay pending forever (a disconnect does not resolve it). Callers that need
//! an upper bound use [`RequestHandle::wait_timeout`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use carve_core::protocol::Message;

/// Allocates qids and mints correlation handles.
pub struct RequestTracker {
    next_qid: u64,
    messages: broadcast::Sender<Arc<Message>>,
}

impl RequestTracker {
    pub fn new(messages: broadcast::Sender<Arc<Message>>) -> Self {
        RequestTracker {
            next_qid: 0,
            messages,
        }
    }

    /// Next request identifier: strictly increasing, starting at 1. Zero is
    /// reserved for "no request" and is never returned.
    pub fn next_qid(&mut self) -> u64 {
        self.next_qid += 1;
        self.next_qid
    }

    /// Mint a handle that resolves on the terminal reply for `qid`.
    ///
    /// Subscribe before sending the request so the reply cannot slip past.
    pub fn track(&self, qid: u64) -> RequestHandle {
        RequestHandle {
            qid,
            rx: self.messages.subscribe(),
        }
    }
}

/// Terminal outcome of one tracked request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A success terminal arrived for this qid.
    Done { qid: u64 },
    /// The server rejected the query.
    Failed { qid: u64, code: String, msg: String },
    /// The caller-specified deadline elapsed with no terminal reply.
    TimedOut { qid: u64 },
    /// The session object was dropped; no reply can ever arrive.
    Abandoned { qid: u64 },
}

impl RequestOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RequestOutcome::Done { .. })
    }
}

/// Observer for the terminal reply of one request.
pub struct RequestHandle {
    qid: u64,
    rx: broadcast::Receiver<Arc<Message>>,
}

impl RequestHandle {
    pub fn qid(&self) -> u64 {
        self.qid
    }

    /// Wait for the terminal reply. Resolves at most once; with no matching
    /// reply this pends forever, so most callers want
    /// [`RequestHandle::wait_timeout`].
    pub async fn wait(mut self) -> RequestOutcome {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if let Some(outcome) = terminal_outcome(&msg, self.qid) {
                        return outcome;
                    }
                }
                // Missed messages cannot be recovered; keep watching. A
                // terminal reply lost to lag behaves like a reply that never
                // arrived, which the timeout path covers.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return RequestOutcome::Abandoned { qid: self.qid };
                }
            }
        }
    }

    /// Wait with an upper bound; the handle deregisters itself on expiry.
    pub async fn wait_timeout(self, deadline: Duration) -> RequestOutcome {
        let qid = self.qid;
        match tokio::time::timeout(deadline, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => RequestOutcome::TimedOut { qid },
        }
    }
}

/// Classify a message as a terminal for `qid`, if it is one.
///
/// Success terminals: `request_ack` (field `rid`), `get_reply`,
/// `get_list_reply`, `get_data_reply`, `get_bindata_reply`. Failure terminal:
/// `query_error`. Everything else, including `request_error`, does not
/// resolve a handle.
fn terminal_outcome(msg: &Message, qid: u64) -> Option<RequestOutcome> {
    match msg {
        Message::RequestAck(p) if p.rid == qid => Some(RequestOutcome::Done { qid }),
        Message::GetReply(p) if p.qid == qid => Some(RequestOutcome::Done { qid }),
        Message::GetListReply(p) if p.qid == qid => Some(RequestOutcome::Done { qid }),
        Message::GetDataReply(p) if p.qid == qid => Some(RequestOutcome::Done { qid }),
        Message::GetBinDataReply(p) if p.qid == qid => Some(RequestOutcome::Done { qid }),
        Message::QueryError(p) if p.qid == qid => Some(RequestOutcome::Failed {
            qid,
            code: p.code.clone(),
            msg: p.msg.clone(),
        }),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use carve_core::protocol::{
        GetListReplyPayload, GetReplyPayload, NodeId, NodeInfo, QueryErrorPayload,
        RequestAckPayload, RequestErrorPayload,
    };
    use std::collections::BTreeMap;

    fn tracker() -> (RequestTracker, broadcast::Sender<Arc<Message>>) {
        let (tx, _) = broadcast::channel(64);
        (RequestTracker::new(tx.clone()), tx)
    }

    fn get_reply(qid: u64) -> Arc<Message> {
        Arc::new(Message::GetReply(GetReplyPayload {
            qid,
            node: NodeInfo {
                id: NodeId::ROOT,
                attributes: BTreeMap::new(),
                start: None,
                end: None,
            },
        }))
    }

    #[test]
    fn qids_start_at_one_and_strictly_increase() {
        let (mut tracker, _tx) = tracker();
        let first = tracker.next_qid();
        let second = tracker.next_qid();
        let third = tracker.next_qid();

        assert_eq!(first, 1);
        assert!(second > first);
        assert!(third > second);
        assert_ne!(first, 0);
    }

    #[tokio::test]
    async fn handle_resolves_on_matching_success_terminal() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(5);

        tx.send(get_reply(5)).unwrap();

        assert_eq!(handle.wait().await, RequestOutcome::Done { qid: 5 });
    }

    #[tokio::test]
    async fn handle_ignores_other_qids() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(5);

        // qid 6 replies must not fire a qid 5 handle.
        tx.send(get_reply(6)).unwrap();
        tx.send(Arc::new(Message::QueryError(QueryErrorPayload {
            qid: 6,
            code: "E".into(),
            msg: "m".into(),
        })))
        .unwrap();
        tx.send(get_reply(5)).unwrap();

        assert_eq!(handle.wait().await, RequestOutcome::Done { qid: 5 });
    }

    #[tokio::test]
    async fn query_error_resolves_as_failure_with_code_and_msg() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(7);

        tx.send(Arc::new(Message::QueryError(QueryErrorPayload {
            qid: 7,
            code: "E_NOENT".into(),
            msg: "not found".into(),
        })))
        .unwrap();

        assert_eq!(
            handle.wait().await,
            RequestOutcome::Failed {
                qid: 7,
                code: "E_NOENT".into(),
                msg: "not found".into(),
            }
        );
    }

    #[tokio::test]
    async fn request_ack_matches_on_rid() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(3);

        tx.send(Arc::new(Message::RequestAck(RequestAckPayload { rid: 3 })))
            .unwrap();

        assert_eq!(handle.wait().await, RequestOutcome::Done { qid: 3 });
    }

    #[tokio::test]
    async fn request_error_is_not_a_terminal() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(4);

        tx.send(Arc::new(Message::RequestError(RequestErrorPayload {
            rid: 4,
            code: "E".into(),
            msg: "m".into(),
        })))
        .unwrap();

        // Only the later list reply resolves the handle.
        tx.send(Arc::new(Message::GetListReply(GetListReplyPayload {
            qid: 4,
            parent: NodeId::ROOT,
            children: vec![],
        })))
        .unwrap();

        assert_eq!(handle.wait().await, RequestOutcome::Done { qid: 4 });
    }

    #[tokio::test]
    async fn independent_handles_match_only_their_own_qid() {
        let (tracker, tx) = tracker();
        let handle_a = tracker.track(1);
        let handle_b = tracker.track(2);

        tx.send(get_reply(2)).unwrap();
        tx.send(get_reply(1)).unwrap();

        assert_eq!(handle_a.wait().await, RequestOutcome::Done { qid: 1 });
        assert_eq!(handle_b.wait().await, RequestOutcome::Done { qid: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_as_timed_out() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(9);

        tx.send(get_reply(8)).unwrap();

        let outcome = handle.wait_timeout(Duration::from_secs(5)).await;
        assert_eq!(outcome, RequestOutcome::TimedOut { qid: 9 });
    }

    #[tokio::test]
    async fn dropped_sender_abandons_the_handle() {
        let (tracker, tx) = tracker();
        let handle = tracker.track(1);
        drop(tracker);
        drop(tx);

        assert_eq!(handle.wait().await, RequestOutcome::Abandoned { qid: 1 });
    }
}
