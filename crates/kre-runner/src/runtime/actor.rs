//! Actor system utilities
//!
//! Long-lived services run as tasks that drain a command channel. Senders
//! never block: the channel is unbounded so that synchronous worker code can
//! enqueue work without waiting on the actor.

use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Trait for actor messages - all commands sent to actors must implement this
pub trait ActorMessage: Send + 'static {}

/// Generic actor handle that can send commands to an actor
pub struct ActorHandle<C: ActorMessage> {
    sender: mpsc::UnboundedSender<C>,
}

// Manual Clone implementation that doesn't require C: Clone
impl<C: ActorMessage> Clone for ActorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C: ActorMessage> ActorHandle<C> {
    /// Create a new actor handle from a sender
    pub fn new(sender: mpsc::UnboundedSender<C>) -> Self {
        Self { sender }
    }

    /// Send a command to the actor without waiting
    pub fn send(&self, cmd: C) -> ActorResult<()> {
        self.sender.send(cmd)?;
        Ok(())
    }

    /// Send a command carrying a reply channel and wait for the answer
    pub async fn request<R, F>(&self, make: F) -> ActorResult<R>
    where
        R: Send + 'static,
        F: FnOnce(oneshot::Sender<R>) -> C,
    {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        Ok(rx.await?)
    }

    /// Check if the actor is still alive (channel not closed)
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl<C: ActorMessage> fmt::Debug for ActorHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

/// Spawn an actor on a dedicated blocking thread.
///
/// Used for actors whose work is synchronous I/O, so they never stall the
/// async worker threads.
pub fn spawn_blocking_actor<C, F>(runtime: &tokio::runtime::Handle, actor_fn: F) -> ActorHandle<C>
where
    C: ActorMessage,
    F: FnOnce(mpsc::UnboundedReceiver<C>) + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.spawn_blocking(move || actor_fn(rx));
    ActorHandle::new(tx)
}

/// Result type for actor operations
pub type ActorResult<T> = Result<T, ActorError>;

/// Errors that can occur in actor operations
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Actor channel closed")]
    ChannelClosed,

    #[error("Actor dropped the reply")]
    NoReply,
}

impl From<oneshot::error::RecvError> for ActorError {
    fn from(_: oneshot::error::RecvError) -> Self {
        ActorError::NoReply
    }
}

impl<T> From<mpsc::error::SendError<T>> for ActorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ActorError::ChannelClosed
    }
}
