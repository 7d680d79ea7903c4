//! Inbound DHT message dispatch
//!
//! The receiver never writes to storage. Put requests only land on the
//! request queue; gets take the store's read lock for the lookup.

use crate::error::{DhtError, Result};
use crate::queue::RequestQueue;
use crate::storage::LocalStore;
use crate::transport::ProtocolHandler;
use async_trait::async_trait;
use hashmesh_protocol::{Message, MessageBody, MessageType, Response};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Node state the receiver dispatches against
#[derive(Clone)]
pub struct DhtContext {
    pub store: Arc<RwLock<LocalStore>>,
    pub queue: Arc<RequestQueue>,
}

/// Dispatch one inbound message
///
/// Errors are the reply: nothing is acknowledged on failure.
pub async fn dispatch(ctx: &DhtContext, message: Message) -> Result<Response> {
    match (message.message_type, &message.body) {
        (MessageType::PutRequest, MessageBody::Hash(key)) => {
            debug!("PUT_REQUEST from {} for {}", message.source, key);

            ctx.queue.put(message).map_err(|e| {
                warn!("Rejected PUT_REQUEST: {}", e);
                e
            })?;
            Ok(Response::Queued)
        }

        (MessageType::GetRequest, MessageBody::Hash(key)) => {
            debug!("GET_REQUEST from {} for {}", message.source, key);

            let entry = ctx.store.read().await.entry(key)?;
            Ok(Response::Entry(entry))
        }

        (MessageType::GetMetaRequest, MessageBody::MetaQuery { hash, meta_type }) => {
            debug!(
                "GET_META_REQUEST from {} for {} ({})",
                message.source, hash, meta_type
            );

            let metas = ctx.store.read().await.get_meta(hash, meta_type)?;
            Ok(Response::Metas(metas))
        }

        (MessageType::SrcValidate, _) => {
            warn!(
                "Message type {:?} from {} not in the DHT protocol",
                message.message_type, message.source
            );
            Err(DhtError::UnsupportedMessageType(message.message_type.to_u8()))
        }

        (message_type, body) => {
            warn!(
                "{:?} from {} carried a {} body",
                message_type,
                message.source,
                body.kind()
            );
            Err(DhtError::BodyTypeMismatch {
                message_type,
                expected: message_type.expected_body().unwrap_or("no"),
            })
        }
    }
}

/// The DHT protocol handler registered with the transport
#[derive(Clone)]
pub struct ProtocolReceiver {
    ctx: DhtContext,
}

impl ProtocolReceiver {
    pub fn new(ctx: DhtContext) -> Self {
        ProtocolReceiver { ctx }
    }

    /// Decode a raw frame, then dispatch it
    pub async fn handle_bytes(&self, bytes: &[u8]) -> Result<Response> {
        let message = Message::from_bytes(bytes)?;
        dispatch(&self.ctx, message).await
    }
}

#[async_trait]
impl ProtocolHandler for ProtocolReceiver {
    async fn handle(&self, message: Message) -> Result<Response> {
        dispatch(&self.ctx, message).await
    }
}
