//! Runs an [`EngineClient`] on its own task so move requests never block the
//! caller. Jobs go in over one channel and replies come back as events on
//! another.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::board::Move;
use crate::game::EngineTicket;

use super::{EngineClient, EngineError, SearchPosition};

#[derive(Debug, Clone)]
pub struct EngineJob {
    pub ticket: EngineTicket,
    pub position: SearchPosition,
    pub strength: u16,
}

#[derive(Debug, Clone)]
pub struct EngineReply {
    pub ticket: EngineTicket,
    pub outcome: Result<Move, EngineError>,
}

#[derive(Debug)]
pub struct EngineWorker {
    jobs: mpsc::UnboundedSender<EngineJob>,
    task: JoinHandle<()>,
}

impl EngineWorker {
    /// Takes ownership of a started client. The client is stopped when every
    /// job sender is gone or the reply receiver is dropped.
    pub fn spawn(client: EngineClient) -> (Self, mpsc::UnboundedReceiver<EngineReply>) {
        let (jobs, mut job_rx) = mpsc::unbounded_channel::<EngineJob>();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut client = client;
            while let Some(job) = job_rx.recv().await {
                let outcome = client.request_move(&job.position, job.strength).await;
                let reply = EngineReply { ticket: job.ticket, outcome };
                if reply_tx.send(reply).is_err() {
                    debug!("reply receiver gone, stopping engine worker");
                    break;
                }
            }
            client.stop().await;
        });
        (Self { jobs, task }, replies)
    }

    pub fn jobs(&self) -> mpsc::UnboundedSender<EngineJob> {
        self.jobs.clone()
    }

    /// Closes the job queue and waits for the engine to be stopped. Other
    /// clones of the job sender must be dropped first.
    pub async fn shutdown(self) {
        drop(self.jobs);
        if let Err(e) = self.task.await {
            debug!(error = %e, "engine worker task ended abnormally");
        }
    }
}
