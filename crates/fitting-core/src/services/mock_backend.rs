//! Scriptable in-memory backend for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::backend::{BackendFuture, BodyUploadResponse, ByteStream, FittingBackend};
use crate::error::{ErrorKind, FittingResult};
use crate::models::{Asset, Collection, RotationRequest, SelectedFile};

pub enum StreamScript {
    /// The request itself is rejected
    Reject(ErrorKind),
    /// Body chunks, then end of body
    Chunks(Vec<FittingResult<Bytes>>),
    /// Chunks are fed by the test; the body stays open until the sender drops
    Channel(UnboundedReceiver<FittingResult<Bytes>>),
}

#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<String>>,
    streams: Mutex<VecDeque<StreamScript>>,
    body_uploads: Mutex<VecDeque<FittingResult<BodyUploadResponse>>>,
    lists: Mutex<HashMap<Collection, VecDeque<FittingResult<Vec<Asset>>>>>,
    rotations: Mutex<VecDeque<FittingResult<()>>>,
    rotate_requests: Mutex<Vec<RotationRequest>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().push_back(script);
    }

    pub fn push_body_upload(&self, result: FittingResult<BodyUploadResponse>) {
        self.body_uploads.lock().push_back(result);
    }

    pub fn push_list(&self, collection: Collection, result: FittingResult<Vec<Asset>>) {
        self.lists
            .lock()
            .entry(collection)
            .or_default()
            .push_back(result);
    }

    pub fn push_rotate(&self, result: FittingResult<()>) {
        self.rotations.lock().push_back(result);
    }

    /// Later `list_assets` replies wait for one `notify_one` each on the
    /// returned handle.
    pub fn hold_lists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn rotate_requests(&self) -> Vec<RotationRequest> {
        std::mem::take(&mut *self.rotate_requests.lock())
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

pub fn sse(records: &[&str]) -> Bytes {
    let mut body = String::new();
    for record in records {
        body.push_str("data: ");
        body.push_str(record);
        body.push_str("\n\n");
    }
    Bytes::from(body)
}

pub fn asset(name: &str, collection: Collection, is_preset: bool) -> Asset {
    let format = name
        .rsplit_once('.')
        .and_then(|(_, ext)| ext.parse().ok())
        .unwrap_or(crate::models::AssetFormat::Glb);
    Asset {
        name: name.to_string(),
        url: format!("/outputs/{}/{}", collection, name),
        format,
        thumbnail_url: None,
        is_preset,
    }
}

impl FittingBackend for MockBackend {
    fn open_cloth_stream(&self, file: SelectedFile) -> BackendFuture<ByteStream> {
        self.record(format!("open_cloth_stream:{}", file.name));
        let script = self
            .streams
            .lock()
            .pop_front()
            .unwrap_or(StreamScript::Chunks(Vec::new()));
        Box::pin(async move {
            match script {
                StreamScript::Reject(kind) => Err(kind),
                StreamScript::Chunks(chunks) => Ok(futures::stream::iter(chunks).boxed()),
                StreamScript::Channel(rx) => Ok(rx.boxed()),
            }
        })
    }

    fn upload_body(&self, file: SelectedFile) -> BackendFuture<BodyUploadResponse> {
        self.record(format!("upload_body:{}", file.name));
        let result = self
            .body_uploads
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ErrorKind::Transport("no scripted reply".to_string())));
        Box::pin(async move { result })
    }

    fn list_assets(&self, collection: Collection) -> BackendFuture<Vec<Asset>> {
        self.record(format!("list_assets:{}", collection));
        let result = self
            .lists
            .lock()
            .get_mut(&collection)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()));
        let gate = self.list_gate.lock().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            result
        })
    }

    fn rotate(&self, request: RotationRequest) -> BackendFuture<()> {
        self.record(format!("rotate:{}", request.filename));
        self.rotate_requests.lock().push(request);
        let result = self.rotations.lock().pop_front().unwrap_or(Ok(()));
        Box::pin(async move { result })
    }

    fn fetch_model(&self, url: String) -> BackendFuture<Bytes> {
        self.record(format!("fetch_model:{}", url));
        Box::pin(async move { Ok(Bytes::from(url.into_bytes())) })
    }
}
