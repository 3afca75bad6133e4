use std::io;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum WorkerMessage {
    /// Replies with whether this request delivered the kill signal.
    Stop {
        response: oneshot::Sender<io::Result<bool>>,
    },
}
