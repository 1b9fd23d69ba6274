use std::{collections::VecDeque, sync::{Mutex, MutexGuard, PoisonError}};

use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, Response, StatusCode};
use log::{debug, trace};
use tokio::sync::oneshot;

use crate::error::TaskError;

/// What a URL monitor observed for the first matching request.
#[derive(Clone, Debug)]
pub struct MonitorResponse {
    /// Full URL of the matching request.
    pub url: String,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    /// The body decoded as JSON, when it is JSON.
    pub object: Option<serde_json::Value>,
    pub error: Option<TaskError>,
}

impl MonitorResponse {
    pub(crate) fn from_result(url: &str, result: &Result<Response<Bytes>, TaskError>) -> Self {
        match result {
            Ok(response) => Self {
                url: url.to_string(),
                status: Some(response.status()),
                headers: response.headers().clone(),
                object: serde_json::from_slice(response.body()).ok(),
                error: None,
            },
            Err(e) => Self::failed(url, e.clone()),
        }
    }

    pub(crate) fn failed(url: &str, error: TaskError) -> Self {
        Self {
            url: url.to_string(),
            status: None,
            headers: HeaderMap::new(),
            object: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorState {
    /// Nothing matching has been intercepted yet.
    #[default]
    Idle,
    Intercepting,
    Completed,
}

/// Completed URLs remembered for `state`, oldest dropped first.
const COMPLETED_HISTORY: usize = 32;

/// Registered monitors keyed by URL prefix. Only URLs with a live monitor
/// are kept in `pending` and `states`.
#[derive(Default)]
pub(crate) struct Monitors {
    pending: DashMap<String, Vec<oneshot::Sender<MonitorResponse>>>,
    states: DashMap<String, MonitorState>,
    completed: Mutex<VecDeque<String>>,
}

impl Monitors {
    pub fn register(&self, url: &str) -> oneshot::Receiver<MonitorResponse> {
        self.sweep();
        let (tx, rx) = oneshot::channel();
        self.pending.entry(url.to_string()).or_default().push(tx);
        self.states.entry(url.to_string()).or_default();
        self.completed().retain(|done| done != url);
        trace!("monitoring {url}");
        rx
    }

    /// Drops senders whose receivers are gone, e.g. after a timeout.
    pub fn prune(&self, url: &str) {
        self.pending.remove_if_mut(url, |_, senders| {
            senders.retain(|tx| !tx.is_closed());
            senders.is_empty()
        });
        if !self.pending.contains_key(url) {
            self.states.remove(url);
        }
    }

    /// Forgets monitors whose futures were dropped without a match.
    fn sweep(&self) {
        self.pending.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
        self.states.retain(|url, _| self.pending.contains_key(url));
    }

    pub fn state(&self, url: &str) -> MonitorState {
        if let Some(state) = self.states.get(url) {
            return *state;
        }
        if self.completed().iter().any(|done| done == url) {
            MonitorState::Completed
        } else {
            MonitorState::Idle
        }
    }

    fn completed(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.pending.len() + self.states.len()
    }

    fn matching(&self, request_url: &str) -> Vec<String> {
        self.pending.iter()
            .filter(|entry| request_url.starts_with(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn intercepting(&self, request_url: &str) {
        for url in self.matching(request_url) {
            self.states.insert(url, MonitorState::Intercepting);
        }
    }

    /// Back to idle for monitors whose only matching request was stopped.
    pub fn abandoned(&self, request_url: &str) {
        for url in self.matching(request_url) {
            self.states.insert(url, MonitorState::Idle);
        }
    }

    pub fn complete(&self, request_url: &str, result: &Result<Response<Bytes>, TaskError>) {
        let matching = self.matching(request_url);
        if matching.is_empty() {
            return;
        }
        let response = MonitorResponse::from_result(request_url, result);
        for url in matching {
            let Some((_, senders)) = self.pending.remove(&url) else {
                continue;
            };
            debug!("{request_url} completed, notifying {} monitor(s) of {url}", senders.len());
            self.states.remove(&url);
            {
                let mut completed = self.completed();
                completed.retain(|done| *done != url);
                if completed.len() == COMPLETED_HISTORY {
                    completed.pop_front();
                }
                completed.push_back(url);
            }
            for tx in senders {
                let _ = tx.send(response.clone());
            }
        }
    }
}
