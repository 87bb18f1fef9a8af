//! Relay abstraction for the sync protocol.
//!
//! A relay is the central peer a replica syncs through. Implementations may
//! use HTTP, WebSockets or anything else; [`LocalRelay`] runs a coordinator
//! in-process and passes every request and response through the CBOR codec
//! the way a real transport would.

use std::sync::Arc;

use async_trait::async_trait;

use tally_store::GroupResolver;

use crate::coordinator::SyncCoordinator;
use crate::error::Result;
use crate::wire::{self, SyncRequest, SyncResponseWire};

/// Transport boundary between a replica and the relay.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Relay: Send + Sync {
    /// Perform one sync call.
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponseWire>;
}

#[async_trait]
impl<T: Relay + ?Sized> Relay for Arc<T> {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponseWire> {
        (**self).sync(request).await
    }
}

/// An in-process relay backed by a [`SyncCoordinator`].
pub struct LocalRelay<R: GroupResolver> {
    coordinator: Arc<SyncCoordinator<R>>,
}

impl<R: GroupResolver> LocalRelay<R> {
    pub fn new(coordinator: Arc<SyncCoordinator<R>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator<R>> {
        &self.coordinator
    }
}

impl<R: GroupResolver> Clone for LocalRelay<R> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

#[async_trait]
impl<R: GroupResolver> Relay for LocalRelay<R> {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponseWire> {
        let request = wire::decode_request(&wire::encode_request(&request)?)?;
        let response = self.coordinator.handle(request).await?;
        wire::decode_response(&wire::encode_response(&response)?)
    }
}
