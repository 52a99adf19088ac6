//! The toolkit through which workers raise context requests.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::types::{ContextPriority, ContextRequest};

/// Capabilities offered to a worker while it produces a response.
///
/// The engine only observes what workers raise here; answering requests is
/// up to the caller of the next round.
pub trait Toolkit: Send + Sync {
    /// Records a context request and returns its id.
    fn request_context(&self, request: ContextRequest) -> String;

    /// Convenience wrapper building the request in place.
    fn ask(
        &self,
        agent_id: &str,
        query: &str,
        reason: &str,
        priority: ContextPriority,
    ) -> String {
        self.request_context(ContextRequest::new(agent_id, query, reason, priority))
    }
}

/// Toolkit that collects the requests raised during one round.
#[derive(Debug, Default)]
pub struct RoundToolkit {
    requests: Mutex<Vec<ContextRequest>>,
}

impl RoundToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ContextRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of requests raised so far, duplicates included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Takes every raised request.
    ///
    /// A worker may raise the same query twice in one call; only the first
    /// request per (agent, query) is kept. If any copy was
    /// required, the kept request is required.
    pub fn drain(&self) -> Vec<ContextRequest> {
        let raised = std::mem::take(&mut *self.lock());
        let mut seen = HashSet::new();
        let mut kept: Vec<ContextRequest> = Vec::with_capacity(raised.len());

        for request in raised {
            let key = (request.agent_id.clone(), request.query.trim().to_lowercase());
            if seen.insert(key.clone()) {
                kept.push(request);
            } else if request.is_required() {
                if let Some(existing) = kept
                    .iter_mut()
                    .find(|r| r.agent_id == key.0 && r.query.trim().to_lowercase() == key.1)
                {
                    existing.priority = ContextPriority::Required;
                }
            }
        }

        kept
    }
}

impl Toolkit for RoundToolkit {
    fn request_context(&self, request: ContextRequest) -> String {
        tracing::debug!(
            agent_id = %request.agent_id,
            request_id = %request.id,
            priority = ?request.priority,
            "Context requested"
        );
        let id = request.id.clone();
        self.lock().push(request);
        id
    }
}
