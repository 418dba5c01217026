use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Likes,
    Comments,
    Shares,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngagementCounters {
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerCounts {
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub comments: Option<u64>,
    #[serde(default)]
    pub shares: Option<u64>,
    #[serde(default)]
    pub liked: Option<bool>,
}

impl EngagementCounters {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Likes => self.like_count,
            Counter::Comments => self.comment_count,
            Counter::Shares => self.share_count,
        }
    }

    #[must_use]
    pub fn toggle_like(self) -> Self {
        let liked = !self.liked;
        let like_count = if liked {
            self.like_count.saturating_add(1)
        } else {
            self.like_count.saturating_sub(1)
        };
        Self {
            liked,
            like_count,
            ..self
        }
    }

    #[must_use]
    pub fn apply_delta(self, counter: Counter, delta: i64) -> Self {
        let apply = |value: u64| {
            if delta >= 0 {
                value.saturating_add(delta.unsigned_abs())
            } else {
                value.saturating_sub(delta.unsigned_abs())
            }
        };
        let mut next = self;
        match counter {
            Counter::Likes => next.like_count = apply(self.like_count),
            Counter::Comments => next.comment_count = apply(self.comment_count),
            Counter::Shares => next.share_count = apply(self.share_count),
        }
        next
    }

    #[must_use]
    pub fn reconcile(self, server: ServerCounts) -> Self {
        Self {
            like_count: server.likes.unwrap_or(self.like_count),
            comment_count: server.comments.unwrap_or(self.comment_count),
            share_count: server.shares.unwrap_or(self.share_count),
            liked: server.liked.unwrap_or(self.liked),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementAction {
    ToggleLike,
    Comment,
    Share,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub action: EngagementAction,
    /// Liked flag after the optimistic toggle; only meaningful for likes.
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Reconciled,
    Deferred,
    RolledBack,
    Superseded,
    Unknown,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    counters: EngagementCounters,
    // Last state the server agreed with.
    confirmed: EngagementCounters,
    in_flight: u32,
}

#[derive(Debug, Default)]
pub struct EngagementLedger {
    entries: HashMap<String, Entry>,
}

impl EngagementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, id: impl Into<String>, counters: EngagementCounters) {
        let entry = self.entries.entry(id.into()).or_default();
        if entry.in_flight == 0 {
            entry.counters = counters;
            entry.confirmed = counters;
        }
    }

    pub fn counters(&self, id: &str) -> Option<EngagementCounters> {
        self.entries.get(id).map(|entry| entry.counters)
    }

    pub fn in_flight(&self, id: &str) -> u32 {
        self.entries.get(id).map(|entry| entry.in_flight).unwrap_or(0)
    }

    pub fn retain_ids<'a>(&mut self, live: impl IntoIterator<Item = &'a str>) {
        let live: std::collections::HashSet<&str> = live.into_iter().collect();
        self.entries
            .retain(|id, entry| entry.in_flight > 0 || live.contains(id.as_str()));
    }

    pub fn begin(&mut self, id: &str, action: EngagementAction) -> Option<Ticket> {
        let entry = self.entries.get_mut(id)?;
        entry.counters = match action {
            EngagementAction::ToggleLike => entry.counters.toggle_like(),
            EngagementAction::Comment => entry.counters.apply_delta(Counter::Comments, 1),
            EngagementAction::Share => entry.counters.apply_delta(Counter::Shares, 1),
        };
        entry.in_flight = entry.in_flight.saturating_add(1);
        Some(Ticket {
            id: id.to_string(),
            action,
            liked: entry.counters.liked,
        })
    }

    pub fn settle<E>(&mut self, ticket: &Ticket, outcome: &Result<ServerCounts, E>) -> Settlement {
        let Some(entry) = self.entries.get_mut(&ticket.id) else {
            return Settlement::Unknown;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);

        match outcome {
            Ok(server) => {
                if entry.in_flight == 0 {
                    entry.counters = entry.counters.reconcile(*server);
                    entry.confirmed = entry.counters;
                    Settlement::Reconciled
                } else {
                    Settlement::Deferred
                }
            }
            Err(_) if entry.in_flight == 0 => {
                entry.counters = entry.confirmed;
                Settlement::RolledBack
            }
            Err(_) => match ticket.action {
                EngagementAction::ToggleLike => {
                    if entry.counters.liked == ticket.liked {
                        entry.counters = entry.counters.toggle_like();
                        Settlement::RolledBack
                    } else {
                        Settlement::Superseded
                    }
                }
                EngagementAction::Comment => {
                    entry.counters = entry.counters.apply_delta(Counter::Comments, -1);
                    Settlement::RolledBack
                }
                EngagementAction::Share => {
                    entry.counters = entry.counters.apply_delta(Counter::Shares, -1);
                    Settlement::RolledBack
                }
            },
        }
    }
}
