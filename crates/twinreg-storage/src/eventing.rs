//! Eventing decorator: publishes a [`RegistryEvent`] after every successful
//! state change.
//!
//! Events go out only once the wrapped call has returned `Ok`. Removals that
//! report nothing removed publish nothing. A failing call publishes nothing.

use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::info;

use twinreg_core::{
    RegistryEvent, SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor,
};

use crate::compose::Decorator;
use crate::error::RegistryError;
use crate::traits::ShellRegistry;

/// Receiver of registry notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RegistryEvent);
}

/// Emits one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: RegistryEvent) {
        match &event {
            RegistryEvent::SubmodelRegistered { submodel_id, .. }
            | RegistryEvent::SubmodelUnregistered { submodel_id, .. } => {
                info!(
                    kind = event.kind(),
                    shell_id = event.shell_id(),
                    submodel_id = submodel_id.as_str(),
                    "registry event"
                );
            }
            _ => info!(kind = event.kind(), shell_id = event.shell_id(), "registry event"),
        }
    }
}

/// Forwards events into a channel. Events are dropped once the receiver is
/// gone.
#[derive(Debug)]
pub struct ChannelEventSink {
    sender: Sender<RegistryEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: Sender<RegistryEvent>) -> Self {
        ChannelEventSink { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: RegistryEvent) {
        let _ = self.sender.send(event);
    }
}

/// Registry wrapper that publishes events for successful writes.
pub struct EventingRegistry {
    inner: Arc<dyn ShellRegistry>,
    sink: Arc<dyn EventSink>,
}

impl EventingRegistry {
    pub fn new(inner: Arc<dyn ShellRegistry>, sink: Arc<dyn EventSink>) -> Self {
        EventingRegistry { inner, sink }
    }
}

impl ShellRegistry for EventingRegistry {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        self.inner.get_shell(shell_id)
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        self.inner.get_all_shells()
    }

    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        self.inner.add_or_replace(descriptor.clone())?;
        self.sink.publish(RegistryEvent::ShellRegistered {
            shell_id: descriptor.id.clone(),
            descriptor,
        });
        Ok(())
    }

    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError> {
        let removed = self.inner.remove(shell_id)?;
        if removed {
            self.sink.publish(RegistryEvent::ShellUnregistered {
                shell_id: shell_id.to_string(),
            });
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<BTreeSet<String>, RegistryError> {
        let removed = self.inner.clear()?;
        for shell_id in &removed {
            self.sink.publish(RegistryEvent::ShellUnregistered {
                shell_id: shell_id.clone(),
            });
        }
        Ok(removed)
    }

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        self.inner.contains_submodel(shell_id, submodel_id)
    }

    fn get_all_submodels(&self, shell_id: &str) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        self.inner.get_all_submodels(shell_id)
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        self.inner.get_submodel(shell_id, submodel_id)
    }

    fn append_or_replace_submodel(
        &self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError> {
        self.inner.append_or_replace_submodel(shell_id, submodel.clone())?;
        self.sink.publish(RegistryEvent::SubmodelRegistered {
            shell_id: shell_id.to_string(),
            submodel_id: submodel.id.clone(),
            descriptor: submodel,
        });
        Ok(())
    }

    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        let removed = self.inner.remove_submodel(shell_id, submodel_id)?;
        if removed {
            self.sink.publish(RegistryEvent::SubmodelUnregistered {
                shell_id: shell_id.to_string(),
                submodel_id: submodel_id.to_string(),
            });
        }
        Ok(removed)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        self.inner.search(request)
    }
}

/// Wraps registries in an [`EventingRegistry`] publishing to one sink.
#[derive(Clone)]
pub struct EventingDecorator {
    sink: Arc<dyn EventSink>,
}

impl EventingDecorator {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        EventingDecorator { sink }
    }
}

impl Decorator<dyn ShellRegistry> for EventingDecorator {
    fn decorate(&self, inner: Arc<dyn ShellRegistry>) -> Arc<dyn ShellRegistry> {
        Arc::new(EventingRegistry::new(inner, Arc::clone(&self.sink)))
    }
}
