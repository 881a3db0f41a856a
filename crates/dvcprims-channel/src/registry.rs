use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dvcprims_transport::NativeChannel;
use tracing::{error, info, warn};

use crate::channel::{ChannelConfig, MessageChannel};
use crate::error::Result;
use crate::name::ChannelName;
use crate::push::CallbackChannel;

/// Error returned by an accept handler that refuses a channel.
pub type AcceptError = Box<dyn std::error::Error + Send + Sync>;

/// Application code run for every newly connected channel.
pub type AcceptHandler =
    Arc<dyn Fn(Arc<CallbackChannel>) -> std::result::Result<(), AcceptError> + Send + Sync>;

/// The native layer that creates listeners by channel name.
///
/// When the peer opens a channel, the manager calls
/// [`ChannelListener::on_new_channel_connection`] on the listener it was
/// given and routes later frame and close events to the returned channel.
pub trait ChannelManager {
    fn create_listener(&self, listener: Arc<ChannelListener>) -> std::io::Result<()>;
}

/// Turns native connection attempts for one name into push channels.
pub struct ChannelListener {
    name: ChannelName,
    handler: AcceptHandler,
    config: ChannelConfig,
}

impl ChannelListener {
    pub fn new(name: ChannelName, handler: AcceptHandler, config: ChannelConfig) -> Self {
        Self {
            name,
            handler,
            config,
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Wrap `native` in a channel and hand it to the accept handler.
    ///
    /// Returns the channel to route native callbacks to, or `None` if the
    /// connection is refused. A handler error or panic is logged and counts
    /// as a refusal; the channel is disposed and the native handle released.
    pub fn on_new_channel_connection(
        &self,
        native: Box<dyn NativeChannel>,
    ) -> Option<Arc<CallbackChannel>> {
        let channel = Arc::new(CallbackChannel::with_config(
            self.name.as_str(),
            native,
            self.config.clone(),
        ));

        let handler = Arc::clone(&self.handler);
        let accepted = Arc::clone(&channel);
        match catch_unwind(AssertUnwindSafe(move || handler(accepted))) {
            Ok(Ok(())) => {
                info!(channel = %self.name, "channel connection accepted");
                Some(channel)
            }
            Ok(Err(err)) => {
                error!(channel = %self.name, error = %err, "accept handler refused channel");
                channel.dispose();
                None
            }
            Err(_) => {
                error!(channel = %self.name, "accept handler panicked");
                channel.dispose();
                None
            }
        }
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("name", &self.name)
            .finish()
    }
}

/// Channel names this process serves, with the handler for each.
#[derive(Default)]
pub struct ListenerRegistry {
    registrations: BTreeMap<ChannelName, AcceptHandler>,
    listeners: Vec<Arc<ChannelListener>>,
    config: ChannelConfig,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration given to every channel the registry creates.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Register `handler` for `name`. A second registration replaces the first.
    pub fn register<F>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Arc<CallbackChannel>) -> std::result::Result<(), AcceptError> + Send + Sync + 'static,
    {
        let name = ChannelName::new(name)?;
        if self
            .registrations
            .insert(name.clone(), Arc::new(handler))
            .is_some()
        {
            warn!(channel = %name, "replacing existing registration");
        }
        Ok(())
    }

    /// Create one native listener per registration.
    ///
    /// A listener the manager fails to create is logged and skipped. Returns
    /// the number created.
    pub fn initialize(&mut self, manager: &dyn ChannelManager) -> usize {
        let mut created = 0usize;
        for (name, handler) in &self.registrations {
            let listener = Arc::new(ChannelListener::new(
                name.clone(),
                Arc::clone(handler),
                self.config.clone(),
            ));
            match manager.create_listener(Arc::clone(&listener)) {
                Ok(()) => {
                    self.listeners.push(listener);
                    created += 1;
                }
                Err(err) => {
                    error!(channel = %name, error = %err, "failed to create listener");
                }
            }
        }
        created
    }

    /// Registered channel names, in order.
    pub fn names(&self) -> impl Iterator<Item = &ChannelName> {
        self.registrations.keys()
    }

    /// Listeners created by [`initialize`](Self::initialize).
    pub fn listeners(&self) -> &[Arc<ChannelListener>] {
        &self.listeners
    }
}
