// Copyright 2025 HEM Sp. z o.o.
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

use std::sync::Arc;

/// Registration handle returned by [`ObserverRegistry::add`]; revoke it with
/// [`ObserverRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// Explicitly managed list of observers. Nothing is dropped implicitly.
pub struct ObserverRegistry<T: ?Sized> {
    next_token: u64,
    entries: Vec<(ObserverToken, Arc<T>)>,
}

impl<T: ?Sized> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_token: 1,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Arc<T>) -> ObserverToken {
        let token = ObserverToken(self.next_token);
        self.next_token += 1;
        self.entries.push((token, observer));
        token
    }

    /// Returns the observer if the token was still registered.
    pub fn remove(&mut self, token: ObserverToken) -> Option<Arc<T>> {
        let idx = self.entries.iter().position(|(t, _)| *t == token)?;
        Some(self.entries.remove(idx).1)
    }

    /// Snapshot of the registered observers, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
