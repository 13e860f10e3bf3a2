//! File service: handshakes, session admission and request routing
//!
//! One task owns the session table and is its only writer. Inbound mail and
//! session unregistrations are both handled by that task, one at a time.

pub mod response;
pub mod session;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use shared::message::file_service_descriptors;
use shared::{Message, Request, Status};
use tokio::sync::mpsc;

use crate::asset::ArchiveProvider;
use crate::client::Client;
use crate::config::FileConfig;
use crate::error::FileError;
use crate::mail::{Mail, MailReceiver};

pub use response::{Response, ResponseAssembler};
pub use session::Session;
pub use worker::{stream_archive, WorkerPool};

const MAILBOX_CAPACITY: usize = 1024;

pub struct FileService {
    config: FileConfig,
    pool: WorkerPool,
    sessions: HashMap<u64, Session>,
    mail: mpsc::Receiver<Mail>,
    unregister: mpsc::UnboundedSender<u64>,
    unregistered: mpsc::UnboundedReceiver<u64>,
}

impl FileService {
    /// Spawns the workers and the service task, returning the service's mailbox
    pub fn start(config: FileConfig, provider: Arc<dyn ArchiveProvider>) -> MailReceiver {
        let (handler, mail) = mpsc::channel(MAILBOX_CAPACITY);
        let (unregister, unregistered) = mpsc::unbounded_channel();

        info!(
            "Starting file service with {} workers, capacity {}, version {}",
            config.workers, config.capacity, config.supported_version
        );

        let service = Self {
            pool: WorkerPool::start(config.workers, provider),
            config,
            sessions: HashMap::new(),
            mail,
            unregister,
            unregistered,
        };
        tokio::spawn(service.run());

        MailReceiver {
            handler,
            accept: file_service_descriptors(),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                mail = self.mail.recv() => match mail {
                    Some(mail) => self.handle_mail(mail).await,
                    None => break,
                },
                Some(id) = self.unregistered.recv() => self.unregister_session(id),
            }
        }
        debug!("File service stopped");
    }

    async fn handle_mail(&mut self, mail: Mail) {
        let Mail { source, message } = mail;

        match message {
            Message::FileHandshake { version } => self.handshake(source, version).await,
            Message::PriorityRequest(request) => self.route(source, request, Session::enqueue_priority),
            Message::PassiveRequest(request) => self.route(source, request, Session::enqueue_passive),
            update @ (Message::OnlineStatusUpdate | Message::OfflineStatusUpdate) => {
                debug!("Client {} sent status update {}", source.id(), update.id());
            }
            other => warn!(
                "File service ignoring message {} from client {}",
                other.id(),
                source.id()
            ),
        }
    }

    async fn handshake(&mut self, source: Client, version: u32) {
        if self.sessions.contains_key(&source.id()) {
            source.fatal(FileError::DuplicateHandshake);
            return;
        }

        if version != self.config.supported_version {
            info!(
                "Rejecting client {} ({}): version {} is not {}",
                source.id(),
                source.remote_addr(),
                version,
                self.config.supported_version
            );
            reject(&source, Status::UnsupportedVersion).await;
            return;
        }

        if self.sessions.len() >= self.config.capacity {
            info!(
                "Rejecting client {} ({}): file service is full",
                source.id(),
                source.remote_addr()
            );
            reject(&source, Status::Full).await;
            return;
        }

        let session = Session::start(source.clone(), self.pool.clone(), &self.config.session);
        self.sessions.insert(source.id(), session);

        let client = source.clone();
        let unregister = self.unregister.clone();
        tokio::spawn(async move {
            client.closed().await;
            let _ = unregister.send(client.id());
        });

        info!(
            "Registered client {} ({}) to file service",
            source.id(),
            source.remote_addr()
        );

        if let Err(err) = source.send_now(Message::Status(Status::Okay)).await {
            source.fatal(err);
        }
    }

    fn route(&self, source: Client, request: Request, enqueue: fn(&Session, Request)) {
        match self.sessions.get(&source.id()) {
            Some(session) => enqueue(session, request),
            None => source.fatal(FileError::NoSession),
        }
    }

    fn unregister_session(&mut self, id: u64) {
        if let Some(session) = self.sessions.remove(&id) {
            info!(
                "Unregistered file session {} ({})",
                id,
                session.client().remote_addr()
            );
        }
    }
}

async fn reject(source: &Client, status: Status) {
    if let Err(err) = source.send_and_close(Message::Status(status)).await {
        source.fatal(err);
    }
}
