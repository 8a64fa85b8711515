/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;

use tracing::trace;

use crate::Element;
use crate::WriteMode;

/// Final status of a queued send.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendStatus {
    /// All bytes were handed to the transport.
    Written,
    /// The connection ended before the bytes were written.
    Aborted,
}

pub type SendCallback = Box<dyn FnOnce(SendStatus)>;

struct QueuedSend {
    bytes: Vec<u8>,
    written: usize,
    on_complete: Option<SendCallback>,
}

/// Outgoing byte queue with at most one write in flight.
///
/// Elements are serialized when they are queued and written strictly in
/// queue order. The transport only ever sees the unwritten remainder of
/// the head entry, and completion callbacks run in submission order.
#[derive(Default)]
pub struct SendQueue {
    items: VecDeque<QueuedSend>,
}

impl SendQueue {
    pub fn new() -> Self {
        SendQueue {
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, element: &Element, mode: WriteMode, on_complete: Option<SendCallback>) {
        let mut text = String::new();
        element.write_to(&mut text, mode);
        self.push_bytes(text.into_bytes(), on_complete);
    }

    pub fn push_bytes(&mut self, bytes: Vec<u8>, on_complete: Option<SendCallback>) {
        trace!(size = bytes.len(), queued = self.items.len(), "queueing send");
        self.items.push_back(QueuedSend {
            bytes,
            written: 0,
            on_complete,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The bytes that should be written next.
    pub fn pending(&self) -> Option<&[u8]> {
        self.items
            .front()
            .map(|item| &item.bytes[item.written..])
    }

    /// True if the head entry is partially written.
    pub fn in_flight(&self) -> bool {
        self.items.front().is_some_and(|item| item.written > 0)
    }

    /// Records that the transport accepted `n` bytes of the head entry.
    ///
    /// Returns true if the head entry completed.
    pub fn advance(&mut self, n: usize) -> bool {
        let Some(item) = self.items.front_mut() else {
            return false;
        };
        item.written = (item.written + n).min(item.bytes.len());
        if item.written < item.bytes.len() {
            return false;
        }
        if let Some(item) = self.items.pop_front() {
            if let Some(callback) = item.on_complete {
                callback(SendStatus::Written);
            }
        }
        true
    }

    /// Drops every entry, completing them as aborted in queue order.
    pub fn abort_all(&mut self) {
        for item in self.items.drain(..) {
            if let Some(callback) = item.on_complete {
                callback(SendStatus::Aborted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<(u32, SendStatus)>>>, id: u32) -> Option<SendCallback> {
        let log = log.clone();
        Some(Box::new(move |status| log.borrow_mut().push((id, status))))
    }

    #[test]
    fn completes_in_submission_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = SendQueue::new();
        queue.push(&Element::new("a"), WriteMode::Full, recorder(&log, 1));
        assert_eq!(queue.pending(), Some(&b"<a/>"[..]));
        // head is partially written while more arrive
        assert!(!queue.advance(2));
        assert!(queue.in_flight());
        queue.push(&Element::new("b"), WriteMode::Full, recorder(&log, 2));
        queue.push(&Element::new("c"), WriteMode::OpenOnly, recorder(&log, 3));
        assert_eq!(queue.pending(), Some(&b"/>"[..]));
        assert!(queue.advance(2));
        assert_eq!(queue.pending(), Some(&b"<b/>"[..]));
        assert!(!queue.in_flight());
        assert!(queue.advance(4));
        assert_eq!(queue.pending(), Some(&b"<c>"[..]));
        assert!(queue.advance(3));
        assert!(queue.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![
                (1, SendStatus::Written),
                (2, SendStatus::Written),
                (3, SendStatus::Written)
            ]
        );
    }

    #[test]
    fn abort_completes_everything() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = SendQueue::new();
        queue.push(&Element::new("a"), WriteMode::Full, recorder(&log, 1));
        queue.push(&Element::new("b"), WriteMode::Full, None);
        queue.push(&Element::new("c"), WriteMode::Full, recorder(&log, 3));
        queue.advance(1);
        queue.abort_all();
        assert!(queue.is_empty());
        assert_eq!(queue.pending(), None);
        assert!(!queue.advance(10));
        assert_eq!(
            *log.borrow(),
            vec![(1, SendStatus::Aborted), (3, SendStatus::Aborted)]
        );
    }
}
