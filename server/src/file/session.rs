use log::debug;
use shared::Request;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::worker::{Job, WorkerPool};
use crate::client::Client;
use crate::config::SessionConfig;
use crate::error::{ClientError, FileError};

/// Per-connection request queues
///
/// Requests are answered strictly one at a time, in the order the scheduler
/// picks them, because responses carry no request id. Priority requests are
/// picked whenever one is waiting at the moment of selection.
pub struct Session {
    client: Client,
    priority: mpsc::Sender<Request>,
    passive: mpsc::Sender<Request>,
}

impl Session {
    /// Creates the queues and spawns the scheduling loop
    pub fn start(client: Client, pool: WorkerPool, config: &SessionConfig) -> Self {
        let (priority, priority_requests) = mpsc::channel(config.priority_capacity.max(1));
        let (passive, passive_requests) = mpsc::channel(config.passive_capacity.max(1));

        let scheduler = Scheduler {
            client: client.clone(),
            pool,
            priority: priority_requests,
            passive: passive_requests,
        };
        tokio::spawn(scheduler.run());

        Self {
            client,
            priority,
            passive,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn enqueue_priority(&self, request: Request) {
        self.enqueue(request, &self.priority, "priority");
    }

    pub fn enqueue_passive(&self, request: Request) {
        self.enqueue(request, &self.passive, "passive");
    }

    // A dropped request would leave the client waiting forever, so a full queue ends the session.
    fn enqueue(&self, request: Request, queue: &mpsc::Sender<Request>, name: &'static str) {
        match queue.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.client.fatal(FileError::QueueFull(name)),
            Err(TrySendError::Closed(_)) => {
                debug!("Dropped request for closed client {}", self.client.id());
            }
        }
    }
}

struct Scheduler {
    client: Client,
    pool: WorkerPool,
    priority: mpsc::Receiver<Request>,
    passive: mpsc::Receiver<Request>,
}

impl Scheduler {
    async fn run(mut self) {
        while let Some(request) = self.next().await {
            match self.submit(request).await {
                Ok(()) | Err(FileError::Client(ClientError::Closed)) => {}
                Err(err) => self.client.fatal(err),
            }
        }
        debug!("Session for client {} stopped", self.client.id());
    }

    async fn next(&mut self) -> Option<Request> {
        if self.client.is_closed() {
            return None;
        }

        if let Ok(request) = self.priority.try_recv() {
            return Some(request);
        }

        tokio::select! {
            biased;
            _ = self.client.closed() => None,
            Some(request) = self.priority.recv() => Some(request),
            Some(request) = self.passive.recv() => Some(request),
            else => None,
        }
    }

    /// Runs one request on a borrowed worker and waits for it to finish
    async fn submit(&self, request: Request) -> Result<(), FileError> {
        let slot = tokio::select! {
            _ = self.client.closed() => return Ok(()),
            slot = self.pool.acquire() => slot,
        };
        let slot = slot.ok_or(FileError::NoWorkers)?;

        let (done, finished) = oneshot::channel();
        let job = Job {
            client: self.client.clone(),
            request,
            done,
        };
        slot.submit(job).map_err(|_| FileError::NoWorkers)?;

        finished.await.unwrap_or(Err(FileError::NoWorkers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OutputCommand;
    use crate::config::ClientConfig;
    use crate::file::testing::MemoryProvider;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn provider() -> Arc<MemoryProvider> {
        let mut provider = MemoryProvider::new();
        for archive in 1..=4 {
            provider = provider.with(0, archive, vec![archive as u8]);
        }
        Arc::new(provider)
    }

    fn client(id: u64) -> (Client, mpsc::Receiver<OutputCommand>) {
        Client::detached(id, "127.0.0.1:1".parse().unwrap(), &ClientConfig::default())
    }

    async fn next_header(commands: &mut mpsc::Receiver<OutputCommand>) -> Vec<u8> {
        loop {
            let command = timeout(Duration::from_secs(5), commands.recv())
                .await
                .unwrap()
                .unwrap();
            if let OutputCommand::Bytes(bytes) = command {
                if bytes.len() == 3 {
                    return bytes;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_priority_requests_are_served_first() {
        let pool = WorkerPool::start(1, provider());
        let (client, mut commands) = client(1);
        let session = Session::start(client, pool, &SessionConfig::default());

        session.enqueue_passive(Request::new(0, 1));
        session.enqueue_passive(Request::new(0, 2));
        session.enqueue_priority(Request::new(0, 3));
        session.enqueue_priority(Request::new(0, 4));

        for archive in [3, 4, 1, 2] {
            assert_eq!(next_header(&mut commands).await, vec![0, 0, archive]);
        }
    }

    #[tokio::test]
    async fn test_one_job_in_flight_keeps_responses_contiguous() {
        let pool = WorkerPool::start(4, provider());
        let (client, mut commands) = client(1);
        let session = Session::start(client, pool, &SessionConfig::default());

        for archive in 1..=4 {
            session.enqueue_passive(Request::new(0, archive));
        }

        for archive in 1..=4u8 {
            let header = timeout(Duration::from_secs(5), commands.recv()).await.unwrap();
            assert_eq!(header, Some(OutputCommand::Bytes(vec![0, 0, archive])));
            assert_eq!(commands.recv().await, Some(OutputCommand::Bytes(vec![archive])));
            assert_eq!(commands.recv().await, Some(OutputCommand::Flush));
        }
    }

    #[tokio::test]
    async fn test_full_queue_closes_only_its_session() {
        let pool = WorkerPool::start(1, provider());
        let config = SessionConfig {
            priority_capacity: 1,
            passive_capacity: 1,
        };

        let (first, _first_commands) = client(1);
        let (second, _second_commands) = client(2);
        let saturated = Session::start(first.clone(), pool.clone(), &config);
        let sibling = Session::start(second.clone(), pool, &config);

        saturated.enqueue_priority(Request::new(0, 1));
        saturated.enqueue_priority(Request::new(0, 2));
        sibling.enqueue_priority(Request::new(0, 1));

        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_request_without_workers_is_fatal() {
        let (client, mut commands) = client(1);
        let session = Session::start(client.clone(), WorkerPool::stopped(), &SessionConfig::default());

        session.enqueue_priority(Request::new(0, 1));
        timeout(Duration::from_secs(5), client.closed()).await.unwrap();
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_archive_is_fatal_to_session() {
        let pool = WorkerPool::start(1, provider());
        let (client, _commands) = client(1);
        let session = Session::start(client.clone(), pool, &SessionConfig::default());

        session.enqueue_priority(Request::new(9, 9));
        timeout(Duration::from_secs(5), client.closed()).await.unwrap();
    }
}
