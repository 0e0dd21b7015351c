//! Execution mode and calculation sessions.
//!
//! Every bulk vector operation takes a [`Mode`]. `Mode::Serial` runs a
//! tight loop on the calling thread; `Mode::Parallel` fans the loop out
//! through the session's dispatcher, one keyed task per position, and
//! joins before returning.
//!
//! A [`Session`] lives for a set of parallel operations. It caches one
//! [`MessageRegistry`] per message type so the registration broadcast is
//! paid once per session rather than once per operation.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use vecta_rts_pool::Dispatcher;

use crate::error::VectorResult;
use crate::message::Message;
use crate::reduction::MessageRegistry;

/// How a bulk operation executes.
#[derive(Clone, Copy)]
pub enum Mode<'s> {
    /// Single loop on the calling thread.
    Serial,
    /// One keyed task per position on the session's workers.
    Parallel(&'s Session),
}

impl Mode<'_> {
    /// Check if this is the parallel mode.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        matches!(self, Mode::Parallel(_))
    }
}

impl fmt::Debug for Mode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Serial => f.write_str("Serial"),
            Mode::Parallel(session) => write!(f, "Parallel({} workers)", session.worker_count()),
        }
    }
}

/// A calculation session bound to a dispatcher.
pub struct Session {
    dispatcher: Arc<dyn Dispatcher>,
    /// Idle registries, one per message type.
    registries: Mutex<FxHashMap<TypeId, Box<dyn Any + Send>>>,
}

impl Session {
    /// Create a session dispatching through `dispatcher`.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            registries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Parallel mode bound to this session.
    #[must_use]
    pub fn parallel(&self) -> Mode<'_> {
        Mode::Parallel(self)
    }

    /// The dispatcher parallel work goes through.
    #[must_use]
    pub fn dispatcher(&self) -> &dyn Dispatcher {
        &*self.dispatcher
    }

    /// Number of workers behind the dispatcher.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.dispatcher.worker_count()
    }

    /// Build and cache the registry for `M` ahead of the first reduction.
    pub fn register<M: Message>(&self) -> VectorResult<()> {
        let registry = self.take_registry::<M>()?;
        self.restore_registry(registry);
        Ok(())
    }

    /// Number of message types with a cached registry.
    #[must_use]
    pub fn registered_types(&self) -> usize {
        self.registries.lock().len()
    }

    /// Take the idle registry for `M`, building one if none is cached.
    ///
    /// The registry is removed from the cache while in use, so two
    /// concurrent reductions of the same type never share slots.
    pub(crate) fn take_registry<M: Message>(&self) -> VectorResult<Arc<MessageRegistry<M>>> {
        let cached = self.registries.lock().remove(&TypeId::of::<M>());
        if let Some(entry) = cached {
            if let Ok(registry) = entry.downcast::<Arc<MessageRegistry<M>>>() {
                return Ok(*registry);
            }
        }
        Ok(Arc::new(MessageRegistry::register(&*self.dispatcher)?))
    }

    /// Return a registry to the cache. Keeps the one already cached, if any.
    pub(crate) fn restore_registry<M: Message>(&self, registry: Arc<MessageRegistry<M>>) {
        self.registries
            .lock()
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(registry));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("workers", &self.worker_count())
            .field("registered_types", &self.registered_types())
            .finish()
    }
}
