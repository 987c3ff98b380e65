//! Registry notifications.

use serde::{Deserialize, Serialize};

use crate::descriptor::{ShellDescriptor, SubmodelDescriptor};

/// A notification about one successful state change of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    #[serde(rename_all = "camelCase")]
    ShellRegistered {
        shell_id: String,
        descriptor: ShellDescriptor,
    },
    #[serde(rename_all = "camelCase")]
    ShellUnregistered { shell_id: String },
    #[serde(rename_all = "camelCase")]
    SubmodelRegistered {
        shell_id: String,
        submodel_id: String,
        descriptor: SubmodelDescriptor,
    },
    #[serde(rename_all = "camelCase")]
    SubmodelUnregistered {
        shell_id: String,
        submodel_id: String,
    },
}

impl RegistryEvent {
    /// The shell this event concerns.
    pub fn shell_id(&self) -> &str {
        match self {
            RegistryEvent::ShellRegistered { shell_id, .. }
            | RegistryEvent::ShellUnregistered { shell_id }
            | RegistryEvent::SubmodelRegistered { shell_id, .. }
            | RegistryEvent::SubmodelUnregistered { shell_id, .. } => shell_id,
        }
    }

    /// Short machine-readable name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::ShellRegistered { .. } => "shell_registered",
            RegistryEvent::ShellUnregistered { .. } => "shell_unregistered",
            RegistryEvent::SubmodelRegistered { .. } => "submodel_registered",
            RegistryEvent::SubmodelUnregistered { .. } => "submodel_unregistered",
        }
    }
}
