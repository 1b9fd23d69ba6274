use std::fmt;

use bytes::{Bytes, BytesMut};
use http::{response, HeaderMap, Request, Response, StatusCode, Version};
use tokio::sync::oneshot;

use crate::error::TaskError;

/// Identifies a started scheme task, used to stop it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One request issued by the web surface, together with the sink its
/// response goes to.
///
/// A task either receives `did_receive_response`, any number of
/// `did_receive_data` and then `did_finish`, or a single `did_fail`.
/// A stopped task receives nothing further.
pub trait SchemeTask: Send + 'static {
    fn request(&self) -> &Request<Bytes>;
    fn did_receive_response(&mut self, response: &response::Parts);
    fn did_receive_data(&mut self, data: Bytes);
    fn did_finish(&mut self);
    fn did_fail(&mut self, error: &TaskError);
}

/// A `SchemeTask` that assembles the whole response and hands it over
/// through a channel, for hosts that have no web view to feed.
pub struct BufferedTask {
    request: Request<Bytes>,
    head: Option<(StatusCode, Version, HeaderMap)>,
    body: BytesMut,
    tx: Option<oneshot::Sender<Result<Response<Bytes>, TaskError>>>,
}

impl BufferedTask {
    pub fn new(request: Request<Bytes>) -> (Self, oneshot::Receiver<Result<Response<Bytes>, TaskError>>) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            request,
            head: None,
            body: BytesMut::new(),
            tx: Some(tx),
        };
        (task, rx)
    }

    fn complete(&mut self, result: Result<Response<Bytes>, TaskError>) {
        if let Some(tx) = self.tx.take() {
            // receiver may be gone already; nobody is waiting then
            let _ = tx.send(result);
        }
    }
}

impl SchemeTask for BufferedTask {
    fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    fn did_receive_response(&mut self, response: &response::Parts) {
        self.head = Some((response.status, response.version, response.headers.clone()));
    }

    fn did_receive_data(&mut self, data: Bytes) {
        self.body.extend_from_slice(&data);
    }

    fn did_finish(&mut self) {
        let body = self.body.split().freeze();
        let result = match self.head.take() {
            Some((status, version, headers)) => {
                let mut response = Response::new(body);
                *response.status_mut() = status;
                *response.version_mut() = version;
                *response.headers_mut() = headers;
                Ok(response)
            }
            None => Err(TaskError::from(anyhow::anyhow!("task finished without a response"))),
        };
        self.complete(result);
    }

    fn did_fail(&mut self, error: &TaskError) {
        self.complete(Err(error.clone()));
    }
}

pub(crate) fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}
