//! Static routing of inbound messages to the one service that accepts them

use std::collections::HashMap;
use std::sync::Arc;

use shared::{Descriptor, Message, ProtocolError, Registry};
use tokio::sync::mpsc;

use crate::client::Client;
use crate::error::ClientError;

/// A decoded message and the client it came from
#[derive(Debug, Clone)]
pub struct Mail {
    pub source: Client,
    pub message: Message,
}

pub type Mailbox = mpsc::Sender<Mail>;

/// A service's mailbox and the messages it accepts
#[derive(Debug, Clone)]
pub struct MailReceiver {
    pub handler: Mailbox,
    pub accept: Vec<Descriptor>,
}

/// Maps each message id to exactly one mailbox
#[derive(Debug)]
pub struct MailRouter {
    registry: Arc<Registry>,
    routes: HashMap<u8, Mailbox>,
}

impl MailRouter {
    /// Fails if two receivers claim the same message id
    pub fn new(receivers: Vec<MailReceiver>) -> Result<Self, ProtocolError> {
        let mut routes = HashMap::new();
        let mut descriptors = Vec::new();

        for receiver in receivers {
            for descriptor in receiver.accept {
                if routes.insert(descriptor.id, receiver.handler.clone()).is_some() {
                    return Err(ProtocolError::DuplicateDescriptor(descriptor.id));
                }
                descriptors.push(descriptor);
            }
        }

        Ok(Self {
            registry: Arc::new(Registry::new(descriptors)?),
            routes,
        })
    }

    /// Inbound descriptors of every receiver, for building decoders
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Delivers `mail`, waiting while the handler's mailbox is full
    pub async fn publish(&self, mail: Mail) -> Result<(), ClientError> {
        let id = mail.message.id();
        let handler = self
            .routes
            .get(&id)
            .ok_or(ProtocolError::UnrecognizedMessage(id))?;

        handler
            .send(mail)
            .await
            .map_err(|_| ClientError::Undeliverable(id))
    }
}
