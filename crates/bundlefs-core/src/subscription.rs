// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One-shot completion events with replay for late subscribers.

use std::cell::RefCell;
use std::fmt;

type Subscriber<T> = Box<dyn FnOnce(&T)>;

enum State<T> {
    Pending(Vec<Subscriber<T>>),
    Completed(T),
}

/// A value that becomes available once, with a subscriber list.
///
/// Subscribers registered before [`Completion::complete`] run in registration
/// order, exactly once, right after completion. Subscribers registered after
/// completion run immediately. Subscribers may subscribe again from inside
/// their callback; such nested subscriptions run immediately as well.
///
/// Owning-thread only.
pub struct Completion<T: Clone> {
    state: RefCell<State<T>>,
}

impl<T: Clone> Completion<T> {
    /// Creates a pending completion.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State::Pending(Vec::new())),
        }
    }

    /// Creates a completion that already holds `value`.
    pub fn completed(value: T) -> Self {
        Self {
            state: RefCell::new(State::Completed(value)),
        }
    }

    /// Returns `true` once [`Completion::complete`] has been called.
    pub fn is_completed(&self) -> bool {
        matches!(*self.state.borrow(), State::Completed(_))
    }

    /// Returns a copy of the value, if completed.
    pub fn value(&self) -> Option<T> {
        match &*self.state.borrow() {
            State::Completed(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Registers `subscriber`, or runs it now if the value is available.
    pub fn subscribe(&self, subscriber: impl FnOnce(&T) + 'static) {
        let value = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending(subscribers) => {
                    subscribers.push(Box::new(subscriber));
                    return;
                }
                State::Completed(value) => value.clone(),
            }
        };
        subscriber(&value);
    }

    /// Stores `value` and drains the subscribers.
    ///
    /// Returns `false`, leaving the first value in place, if already completed.
    pub fn complete(&self, value: T) -> bool {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if let State::Completed(_) = *state {
                return false;
            }
            match std::mem::replace(&mut *state, State::Completed(value.clone())) {
                State::Pending(subscribers) => subscribers,
                State::Completed(_) => Vec::new(),
            }
        };
        for subscriber in subscribers {
            subscriber(&value);
        }
        true
    }

    /// Number of subscribers waiting for completion.
    pub fn pending_subscribers(&self) -> usize {
        match &*self.state.borrow() {
            State::Pending(subscribers) => subscribers.len(),
            State::Completed(_) => 0,
        }
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            State::Pending(subscribers) => f
                .debug_struct("Completion")
                .field("pending_subscribers", &subscribers.len())
                .finish(),
            State::Completed(value) => f.debug_struct("Completion").field("value", value).finish(),
        }
    }
}
