use crate::request::Response;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::Path;

/// The transport towards the operator's client.
///
/// Responses are sent from the request thread and from the step timer, so
/// implementations must be shareable between threads.
pub trait ResponseSink: Send + Sync {
    /// Returns true if the response was delivered.
    fn send(&self, response: Response) -> bool;

    /// A location the operator can use to fetch the file or directory, if
    /// there is one.
    fn url_for_path(&self, path: &Path) -> Option<String>;
}

/// Delivers responses to a channel. Paths are exposed as `file://` URLs.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<Response>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, Receiver<Response>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ResponseSink for ChannelSink {
    fn send(&self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }

    fn url_for_path(&self, path: &Path) -> Option<String> {
        Some(format!("file://{}", path.display()))
    }
}
