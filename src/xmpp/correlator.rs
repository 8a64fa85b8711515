/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

struct Pending<C> {
    callback: C,
    deadline: Instant,
}

/// Matches IQ replies to the requests which are waiting for them.
///
/// Every registered request gets a fresh id from a per connection
/// counter. The callback is handed back exactly once: either on
/// [resolve()](Correlator::resolve) when the reply arrives, from
/// [sweep()](Correlator::sweep) after its deadline, or from
/// [drain()](Correlator::drain) when the connection goes away.
///
/// Expired entries are collected by a periodic sweep which runs every
/// half timeout while anything is pending, so a request fails between
/// one and one and a half timeouts after it was sent.
pub struct Correlator<C> {
    pending: HashMap<String, Pending<C>>,
    counter: u64,
    timeout: Duration,
    next_sweep: Option<Instant>,
}

impl<C> Correlator<C> {
    pub fn new(timeout: Duration) -> Self {
        Correlator {
            pending: HashMap::new(),
            counter: 0,
            timeout,
            next_sweep: None,
        }
    }

    /// Restarts the id counter for a new connection.
    ///
    /// Pending entries must be drained first.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.next_sweep = None;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocates an id without registering anything for it.
    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        self.counter.to_string()
    }

    /// Registers a request with the default timeout.
    pub fn register(&mut self, callback: C, now: Instant) -> String {
        self.register_with_timeout(callback, now, self.timeout)
    }

    pub fn register_with_timeout(&mut self, callback: C, now: Instant, timeout: Duration) -> String {
        let id = self.next_id();
        self.pending.insert(
            id.clone(),
            Pending {
                callback,
                deadline: now + timeout,
            },
        );
        if self.next_sweep.is_none() {
            self.next_sweep = Some(now + self.timeout / 2);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// When the next sweep is due, if anything is pending.
    pub fn next_sweep(&self) -> Option<Instant> {
        self.next_sweep
    }

    /// Takes the callback waiting for this id.
    pub fn resolve(&mut self, id: &str) -> Option<C> {
        let pending = self.pending.remove(id)?;
        if self.pending.is_empty() {
            self.next_sweep = None;
        }
        Some(pending.callback)
    }

    /// Takes the callbacks whose deadline passed, if a sweep is due.
    pub fn sweep(&mut self, now: Instant) -> Vec<C> {
        match self.next_sweep {
            Some(at) if now >= at => (),
            _ => return Vec::new(),
        }
        let mut expired_ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        // Fail in registration order
        expired_ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
        let expired: Vec<C> = expired_ids
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .map(|pending| pending.callback)
            .collect();
        if !expired.is_empty() {
            debug!(count = expired.len(), "IQ requests timed out");
        }
        self.next_sweep = if self.pending.is_empty() {
            None
        } else {
            Some(now + self.timeout / 2)
        };
        expired
    }

    /// Takes every pending callback.
    pub fn drain(&mut self) -> Vec<C> {
        self.next_sweep = None;
        let mut all: Vec<(String, Pending<C>)> = self.pending.drain().collect();
        all.sort_by_key(|(id, _)| id.parse::<u64>().unwrap_or(u64::MAX));
        all.into_iter().map(|(_, pending)| pending.callback).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn ids_are_unique() {
        let now = Instant::now();
        let mut correlator = Correlator::new(TIMEOUT);
        let a = correlator.register("a", now);
        let b = correlator.next_id();
        let c = correlator.register("c", now);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
        assert!(correlator.is_pending(&a));
        assert!(!correlator.is_pending(&b));
        assert_eq!(correlator.len(), 2);
    }

    #[test]
    fn resolve_hands_back_once() {
        let now = Instant::now();
        let mut correlator = Correlator::new(TIMEOUT);
        let id = correlator.register("a", now);
        assert!(correlator.next_sweep().is_some());
        assert_eq!(correlator.resolve(&id), Some("a"));
        assert_eq!(correlator.resolve(&id), None);
        assert_eq!(correlator.resolve("unknown"), None);
        // nothing pending, nothing to sweep
        assert_eq!(correlator.next_sweep(), None);
    }

    #[test]
    fn sweep_expires_late_requests() {
        let start = Instant::now();
        let mut correlator = Correlator::new(TIMEOUT);
        correlator.register("early", start);
        assert_eq!(correlator.next_sweep(), Some(start + TIMEOUT / 2));
        correlator.register("late", start + Duration::from_secs(20));

        // first sweep at 15s: nothing expired yet
        assert!(correlator.sweep(start + Duration::from_secs(15)).is_empty());
        assert_eq!(
            correlator.next_sweep(),
            Some(start + Duration::from_secs(30))
        );
        // not due yet
        assert!(correlator.sweep(start + Duration::from_secs(29)).is_empty());
        assert_eq!(correlator.sweep(start + Duration::from_secs(30)), vec!["early"]);
        assert_eq!(correlator.sweep(start + Duration::from_secs(45)), Vec::<&str>::new());
        assert_eq!(correlator.sweep(start + Duration::from_secs(60)), vec!["late"]);
        assert!(correlator.is_empty());
        assert_eq!(correlator.next_sweep(), None);
    }

    #[test]
    fn custom_timeout() {
        let start = Instant::now();
        let mut correlator = Correlator::new(TIMEOUT);
        correlator.register_with_timeout("quick", start, Duration::from_secs(5));
        assert_eq!(correlator.sweep(start + Duration::from_secs(15)), vec!["quick"]);
    }

    #[test]
    fn drain_fails_everything() {
        let now = Instant::now();
        let mut correlator = Correlator::new(TIMEOUT);
        for name in ["a", "b", "c"] {
            correlator.register(name, now);
        }
        assert_eq!(correlator.drain(), vec!["a", "b", "c"]);
        assert!(correlator.is_empty());
        assert_eq!(correlator.next_sweep(), None);
        correlator.reset();
        assert_eq!(correlator.next_id(), "1");
    }
}
