//! Fixed pool of fetch-and-stream workers
//!
//! Each worker advertises itself by handing the pool a one-shot job slot,
//! waits for a job on it, runs the job to completion and advertises again.
//! The number of advertised slots never exceeds the number of workers, which
//! is what bounds how many archives are streamed at once.

use std::sync::Arc;

use log::debug;
use shared::{Request, CHUNK_LENGTH, CHUNK_SEPARATOR};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::asset::ArchiveProvider;
use crate::client::Client;
use crate::error::FileError;

/// One request to stream back to one client
pub struct Job {
    pub client: Client,
    pub request: Request,
    pub done: oneshot::Sender<Result<(), FileError>>,
}

/// A borrowed worker, ready for exactly one job
pub struct WorkerSlot(oneshot::Sender<Job>);

impl WorkerSlot {
    /// Hands the job over; gives it back if the worker has gone away
    pub fn submit(self, job: Job) -> Result<(), Job> {
        self.0.send(job)
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    available: Arc<Mutex<mpsc::Receiver<WorkerSlot>>>,
}

impl WorkerPool {
    /// Spawns `workers` workers serving archives from `provider`, at least one
    pub fn start(workers: usize, provider: Arc<dyn ArchiveProvider>) -> Self {
        let workers = workers.max(1);
        let (advertise, available) = mpsc::channel(workers);

        for id in 0..workers {
            let worker = Worker {
                id,
                advertise: advertise.clone(),
                provider: Arc::clone(&provider),
            };
            tokio::spawn(worker.run());
        }

        Self {
            available: Arc::new(Mutex::new(available)),
        }
    }

    /// Waits for a free worker; `None` once every worker has stopped
    pub async fn acquire(&self) -> Option<WorkerSlot> {
        self.available.lock().await.recv().await
    }

    /// A pool whose workers have all stopped
    #[cfg(test)]
    pub(crate) fn stopped() -> Self {
        let (_, available) = mpsc::channel(1);
        Self {
            available: Arc::new(Mutex::new(available)),
        }
    }
}

struct Worker {
    id: usize,
    advertise: mpsc::Sender<WorkerSlot>,
    provider: Arc<dyn ArchiveProvider>,
}

impl Worker {
    async fn run(self) {
        loop {
            let (slot, job) = oneshot::channel();
            if self.advertise.send(WorkerSlot(slot)).await.is_err() {
                break;
            }

            // A borrower may drop the slot without submitting anything.
            if let Ok(job) = job.await {
                debug!(
                    "Worker {} serving {}/{} to client {}",
                    self.id,
                    job.request.package,
                    job.request.archive,
                    job.client.id()
                );
                let result = stream_archive(&job.client, job.request, Arc::clone(&self.provider)).await;
                let _ = job.done.send(result);
            }
        }
        debug!("Worker {} stopped", self.id);
    }
}

/// Writes `[package][archive]` then the archive in separated chunks, then flushes
pub async fn stream_archive(
    client: &Client,
    request: Request,
    provider: Arc<dyn ArchiveProvider>,
) -> Result<(), FileError> {
    let Request { package, archive } = request;
    let bytes = tokio::task::spawn_blocking(move || provider.get(package, archive)).await??;

    let mut writer = client.writer();
    let [high, low] = archive.to_be_bytes();
    writer.write(vec![package, high, low]).await?;

    for (index, chunk) in bytes.chunks(CHUNK_LENGTH).enumerate() {
        if index > 0 {
            writer.write(vec![CHUNK_SEPARATOR]).await?;
        }
        writer.write(chunk.to_vec()).await?;
    }

    client.flush().await?;
    Ok(())
}
