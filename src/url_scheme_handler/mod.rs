use std::{future::Future, sync::{atomic::{AtomicU64, Ordering}, Arc, OnceLock}, time::Duration};

use dashmap::DashMap;
use log::{debug, trace, warn};
use tokio::sync::oneshot;

use crate::error::TaskError;

mod fetch;
mod monitor;
mod task;

pub use fetch::{Fetch, FileFetcher, HttpFetcher};
pub use monitor::{MonitorResponse, MonitorState};
pub use task::{BufferedTask, SchemeTask, TaskId};

use monitor::Monitors;

static SHARED_INSTANCE: OnceLock<UrlSchemeHandler> = OnceLock::new();

/// Answers requests the embedded web view issues on intercepted schemes
/// and lets callers watch for specific URLs being fetched.
pub struct UrlSchemeHandler {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Arc<dyn Fetch>,
    monitors: Monitors,
    running: DashMap<TaskId, oneshot::Sender<()>>,
    next_id: AtomicU64,
}

impl UrlSchemeHandler {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                monitors: Monitors::default(),
                running: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide handler, created with an `HttpFetcher` on first use.
    pub fn shared_instance() -> &'static UrlSchemeHandler {
        SHARED_INSTANCE.get_or_init(|| {
            debug!("creating shared url scheme handler");
            UrlSchemeHandler::new(Arc::new(HttpFetcher::default()))
        })
    }

    /// Starts answering `task`. Must be called within a tokio runtime.
    pub fn start_url_scheme_task(&self, mut task: Box<dyn SchemeTask>) -> TaskId {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let request = task::clone_request(task.request());
        let url = request.uri().to_string();
        trace!("{id}: starting {} {url}", request.method());

        let (stop_tx, stop_rx) = oneshot::channel();
        self.inner.running.insert(id, stop_tx);
        self.inner.monitors.intercepting(&url);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = inner.fetcher.fetch(request) => result,
                _ = stop_rx => {
                    debug!("{id}: stopped while fetching {url}");
                    inner.monitors.abandoned(&url);
                    return;
                }
            };

            // a stop racing with completion wins; the task hears nothing more
            if inner.running.remove(&id).is_none() {
                inner.monitors.abandoned(&url);
                return;
            }

            match &result {
                Ok(response) => {
                    trace!("{id}: {} for {url}", response.status());
                    let (parts, body) = clone_response(response).into_parts();
                    task.did_receive_response(&parts);
                    task.did_receive_data(body);
                    task.did_finish();
                }
                Err(e) => {
                    warn!("{id}: {e}");
                    task.did_fail(e);
                }
            }
            inner.monitors.complete(&url, &result);
        });
        id
    }

    /// Stops a started task. Returns false if it already completed.
    pub fn stop_url_scheme_task(&self, id: TaskId) -> bool {
        match self.inner.running.remove(&id) {
            Some((_, stop_tx)) => {
                let _ = stop_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Resolves once with the first completed request whose URL starts with
    /// `url`. Registration happens immediately, before the first poll. If no
    /// such request is ever intercepted, the future never resolves.
    pub fn monitor_url(&self, url: &str) -> impl Future<Output = MonitorResponse> + Send + 'static {
        let rx = self.inner.monitors.register(url);
        async move {
            match rx.await {
                Ok(response) => response,
                Err(_) => std::future::pending().await,
            }
        }
    }

    /// Like `monitor_url`, but gives up after `timeout` with `TaskError::Timeout`.
    pub fn monitor_url_timeout(&self, url: &str, timeout: Duration) -> impl Future<Output = MonitorResponse> + Send + 'static {
        let rx = self.inner.monitors.register(url);
        let inner = self.inner.clone();
        let url = url.to_string();
        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(response)) => response,
                Ok(Err(_)) => std::future::pending().await,
                Err(_) => {
                    debug!("monitor for {url} timed out after {timeout:?}");
                    inner.monitors.prune(&url);
                    MonitorResponse::failed(&url, TaskError::Timeout(url.clone()))
                }
            }
        }
    }

    /// Completion-style `monitor_url`: `completion` runs exactly once, on a
    /// runtime task, if a matching request completes.
    pub fn monitor_url_with<F>(&self, url: &str, completion: F)
    where F: FnOnce(MonitorResponse) + Send + 'static
    {
        let monitored = self.monitor_url(url);
        tokio::spawn(async move {
            completion(monitored.await);
        });
    }

    pub fn monitor_state(&self, url: &str) -> MonitorState {
        self.inner.monitors.state(url)
    }
}

fn clone_response(response: &http::Response<bytes::Bytes>) -> http::Response<bytes::Bytes> {
    let mut copy = http::Response::new(response.body().clone());
    *copy.status_mut() = response.status();
    *copy.version_mut() = response.version();
    *copy.headers_mut() = response.headers().clone();
    copy
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{header::CONTENT_TYPE, Request, Response, StatusCode};
    use tokio::sync::Notify;

    use super::*;

    /// Answers from a fixed table; unknown URLs fail.
    struct TableFetcher {
        bodies: HashMap<String, &'static str>,
    }

    #[async_trait]
    impl Fetch for TableFetcher {
        async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TaskError> {
            let url = request.uri().to_string();
            match self.bodies.get(&url) {
                Some(body) => {
                    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
                    response.headers_mut().insert(CONTENT_TYPE, "application/json".parse().unwrap());
                    Ok(response)
                }
                None => Err(TaskError::NotFound(url)),
            }
        }
    }

    /// Never answers until released.
    struct StalledFetcher {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Fetch for StalledFetcher {
        async fn fetch(&self, _request: Request<Bytes>) -> Result<Response<Bytes>, TaskError> {
            self.release.notified().await;
            Ok(Response::new(Bytes::new()))
        }
    }

    #[derive(Debug, PartialEq)]
    enum Event {
        Response(StatusCode),
        Data(Bytes),
        Finish,
        Fail(String),
    }

    struct RecordingTask {
        request: Request<Bytes>,
        events: Arc<Mutex<Vec<Event>>>,
        done: Arc<Notify>,
    }

    impl RecordingTask {
        fn new(uri: &str) -> (Box<Self>, Arc<Mutex<Vec<Event>>>, Arc<Notify>) {
            let mut request = Request::new(Bytes::new());
            *request.uri_mut() = uri.parse().unwrap();
            let events = Arc::new(Mutex::new(Vec::new()));
            let done = Arc::new(Notify::new());
            (Box::new(Self { request, events: events.clone(), done: done.clone() }), events, done)
        }
    }

    impl SchemeTask for RecordingTask {
        fn request(&self) -> &Request<Bytes> {
            &self.request
        }
        fn did_receive_response(&mut self, response: &http::response::Parts) {
            self.events.lock().unwrap().push(Event::Response(response.status));
        }
        fn did_receive_data(&mut self, data: Bytes) {
            self.events.lock().unwrap().push(Event::Data(data));
        }
        fn did_finish(&mut self) {
            self.events.lock().unwrap().push(Event::Finish);
            self.done.notify_one();
        }
        fn did_fail(&mut self, error: &TaskError) {
            self.events.lock().unwrap().push(Event::Fail(error.to_string()));
            self.done.notify_one();
        }
    }

    const TRANSLATE_URL: &str = "https://www.bing.com/ttranslatev3?isVertical=1";

    fn table_handler() -> UrlSchemeHandler {
        let bodies = HashMap::from([(TRANSLATE_URL.to_string(), r#"[{"translations":[{"text":"hello"}]}]"#)]);
        UrlSchemeHandler::new(Arc::new(TableFetcher { bodies }))
    }

    #[test]
    fn shared_instance_is_a_singleton() {
        let a = UrlSchemeHandler::shared_instance();
        let b = UrlSchemeHandler::shared_instance();
        assert!(std::ptr::eq(a, b));
    }

    #[tokio::test]
    async fn task_receives_response_data_and_finish() {
        let handler = table_handler();
        let (task, events, done) = RecordingTask::new(TRANSLATE_URL);
        handler.start_url_scheme_task(task);
        done.notified().await;

        let events = events.lock().unwrap();
        assert_eq!(events[0], Event::Response(StatusCode::OK));
        assert!(matches!(&events[1], Event::Data(body) if body.starts_with(b"[{")));
        assert_eq!(events[2], Event::Finish);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn failed_fetch_fails_the_task() {
        let handler = table_handler();
        let (task, events, done) = RecordingTask::new("https://www.bing.com/unknown");
        handler.start_url_scheme_task(task);
        done.notified().await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Fail(msg) if msg.contains("unknown")));
    }

    #[tokio::test]
    async fn monitor_decodes_json_of_matching_request() {
        let handler = table_handler();
        let monitored = handler.monitor_url("https://www.bing.com/ttranslatev3");
        assert_eq!(handler.monitor_state("https://www.bing.com/ttranslatev3"), MonitorState::Idle);

        let (task, _, _) = RecordingTask::new(TRANSLATE_URL);
        handler.start_url_scheme_task(task);
        let response = monitored.await;

        assert_eq!(response.url, TRANSLATE_URL);
        assert_eq!(response.status, Some(StatusCode::OK));
        assert!(response.error.is_none());
        let object = response.object.unwrap();
        assert_eq!(object[0]["translations"][0]["text"], "hello");
        assert_eq!(handler.monitor_state("https://www.bing.com/ttranslatev3"), MonitorState::Completed);
    }

    #[tokio::test]
    async fn monitor_reports_fetch_errors() {
        let handler = table_handler();
        let monitored = handler.monitor_url("https://www.bing.com/");
        let (task, _, _) = RecordingTask::new("https://www.bing.com/missing");
        handler.start_url_scheme_task(task);

        let response = monitored.await;
        assert!(response.object.is_none());
        assert!(matches!(response.error, Some(TaskError::NotFound(_))));
    }

    #[tokio::test]
    async fn unmatched_monitor_times_out() {
        let handler = table_handler();
        let (task, _, done) = RecordingTask::new(TRANSLATE_URL);
        let monitored = handler.monitor_url_timeout("https://translate.google.com/", Duration::from_millis(50));
        handler.start_url_scheme_task(task);
        done.notified().await;

        let response = monitored.await;
        assert!(matches!(response.error, Some(TaskError::Timeout(_))));
        assert_eq!(handler.monitor_state("https://translate.google.com/"), MonitorState::Idle);
    }

    #[tokio::test]
    async fn stopped_task_hears_nothing() {
        let release = Arc::new(Notify::new());
        let handler = UrlSchemeHandler::new(Arc::new(StalledFetcher { release: release.clone() }));
        let monitored = handler.monitor_url_timeout(TRANSLATE_URL, Duration::from_millis(100));

        let (task, events, _) = RecordingTask::new(TRANSLATE_URL);
        let id = handler.start_url_scheme_task(task);
        assert_eq!(handler.monitor_state(TRANSLATE_URL), MonitorState::Intercepting);
        assert!(handler.stop_url_scheme_task(id));
        assert!(!handler.stop_url_scheme_task(id));
        release.notify_waiters();

        let response = monitored.await;
        assert!(matches!(response.error, Some(TaskError::Timeout(_))));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn buffered_task_collects_the_response() {
        let handler = table_handler();
        let mut request = Request::new(Bytes::new());
        *request.uri_mut() = TRANSLATE_URL.parse().unwrap();
        let (task, rx) = BufferedTask::new(request);
        handler.start_url_scheme_task(Box::new(task));

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn finished_and_dropped_monitors_are_forgotten() {
        let handler = table_handler();
        for i in 0..10 {
            drop(handler.monitor_url(&format!("https://www.bing.com/dict/{i}")));
        }
        let monitored = handler.monitor_url(TRANSLATE_URL);
        // one pending entry plus its state
        assert_eq!(handler.inner.monitors.tracked(), 2);

        let (task, _, _) = RecordingTask::new(TRANSLATE_URL);
        handler.start_url_scheme_task(task);
        monitored.await;

        assert_eq!(handler.inner.monitors.tracked(), 0);
        assert_eq!(handler.monitor_state(TRANSLATE_URL), MonitorState::Completed);
    }

    #[tokio::test]
    async fn completion_style_monitor_fires_once() {
        let handler = table_handler();
        let (tx, rx) = oneshot::channel();
        handler.monitor_url_with(TRANSLATE_URL, move |response| {
            let _ = tx.send(response.status);
        });
        let (task, _, _) = RecordingTask::new(TRANSLATE_URL);
        handler.start_url_scheme_task(task);

        assert_eq!(rx.await.unwrap(), Some(StatusCode::OK));
    }
}
