//! # Change Feed
//!
//! Bounded in-memory log of committed application mutations. Clients ask
//! for events after the last sequence number they saw instead of polling
//! whole resources; in-process subscribers receive each event as it is
//! published. The feed is not durable and restarts at sequence 1.

use std::collections::VecDeque;

use admit_core::{Actor, ApplicationId, Timestamp, UserId};
use admit_state::ApplicationStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default number of events retained.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// What happened to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    DocumentUploaded {
        requirement_id: Uuid,
        is_complete: bool,
    },
    DocumentVerified {
        document_id: Uuid,
        verified: bool,
    },
    /// A catalog change flipped the cached completeness flag.
    CompletenessChanged { is_complete: bool },
    StatusChanged {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

/// One committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationEvent {
    pub sequence: u64,
    pub application_id: Uuid,
    pub applicant_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
struct FeedLog {
    next_sequence: u64,
    events: VecDeque<ApplicationEvent>,
}

/// Sequence-numbered event log with broadcast fan-out.
#[derive(Debug)]
pub struct ChangeFeed {
    capacity: usize,
    log: Mutex<FeedLog>,
    sender: broadcast::Sender<ApplicationEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            capacity,
            log: Mutex::new(FeedLog {
                next_sequence: 1,
                events: VecDeque::with_capacity(capacity),
            }),
            sender,
        }
    }

    /// Append an event and broadcast it. Sequence numbers are gapless.
    pub fn publish(
        &self,
        application_id: ApplicationId,
        applicant_id: UserId,
        kind: EventKind,
        at: Timestamp,
    ) -> ApplicationEvent {
        let event = {
            let mut log = self.log.lock();
            let event = ApplicationEvent {
                sequence: log.next_sequence,
                application_id: *application_id.as_uuid(),
                applicant_id: *applicant_id.as_uuid(),
                kind,
                occurred_at: *at.as_datetime(),
            };
            log.next_sequence += 1;
            if log.events.len() == self.capacity {
                log.events.pop_front();
            }
            log.events.push_back(event.clone());
            event
        };
        // No receivers is fine.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Retained events newer than `after` that `actor` may see, oldest first.
    pub fn since(&self, after: u64, actor: &Actor) -> Vec<ApplicationEvent> {
        self.log
            .lock()
            .events
            .iter()
            .filter(|e| e.sequence > after)
            .filter(|e| actor.is_staff() || actor.owns(&UserId::from_uuid(e.applicant_id)))
            .cloned()
            .collect()
    }

    /// Sequence number of the newest event, 0 when none was published.
    pub fn latest(&self) -> u64 {
        self.log.lock().next_sequence - 1
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApplicationEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_gapless_and_filtered_by_after() {
        let feed = ChangeFeed::new(8);
        let owner = UserId::new();
        let app = ApplicationId::new();
        for _ in 0..3 {
            feed.publish(app, owner, EventKind::Updated, Timestamp::now());
        }
        let events = feed.since(1, &Actor::applicant(owner));
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, [2, 3]);
        assert_eq!(feed.latest(), 3);
    }

    #[test]
    fn applicants_only_see_their_own_events() {
        let feed = ChangeFeed::new(8);
        let (alice, bob) = (UserId::new(), UserId::new());
        feed.publish(ApplicationId::new(), alice, EventKind::Created, Timestamp::now());
        feed.publish(ApplicationId::new(), bob, EventKind::Created, Timestamp::now());

        assert_eq!(feed.since(0, &Actor::applicant(alice)).len(), 1);
        assert_eq!(feed.since(0, &Actor::officer(UserId::new())).len(), 2);
    }

    #[test]
    fn oldest_events_are_evicted_at_capacity() {
        let feed = ChangeFeed::new(2);
        let owner = UserId::new();
        for _ in 0..5 {
            feed.publish(ApplicationId::new(), owner, EventKind::Created, Timestamp::now());
        }
        let seqs: Vec<u64> = feed
            .since(0, &Actor::admin(UserId::system()))
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(seqs, [4, 5]);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();
        let published = feed.publish(
            ApplicationId::new(),
            UserId::new(),
            EventKind::StatusChanged {
                from: ApplicationStatus::Draft,
                to: ApplicationStatus::Submitted,
            },
            Timestamp::now(),
        );
        assert_eq!(rx.recv().await.unwrap(), published);
    }

    #[test]
    fn event_serializes_flat_with_kind_tag() {
        let feed = ChangeFeed::default();
        let event = feed.publish(
            ApplicationId::new(),
            UserId::new(),
            EventKind::StatusChanged {
                from: ApplicationStatus::Submitted,
                to: ApplicationStatus::UnderReview,
            },
            Timestamp::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "status_changed");
        assert_eq!(json["from"], "submitted");
        assert_eq!(json["to"], "under_review");
        assert_eq!(json["sequence"], 1);
    }
}
