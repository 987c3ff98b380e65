//! Authorization decorator: checks every call with an [`Authorizer`] before
//! it reaches the wrapped registry.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::warn;

use twinreg_core::{SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor};

use crate::compose::{Action, Decorator};
use crate::error::RegistryError;
use crate::traits::ShellRegistry;

/// What a registry call is about to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    pub action: Action,
    /// Target shell, `None` for calls spanning the whole registry.
    pub shell_id: Option<&'a str>,
    pub submodel_id: Option<&'a str>,
}

impl<'a> AccessRequest<'a> {
    fn registry(action: Action) -> Self {
        AccessRequest {
            action,
            shell_id: None,
            submodel_id: None,
        }
    }

    fn shell(action: Action, shell_id: &'a str) -> Self {
        AccessRequest {
            action,
            shell_id: Some(shell_id),
            submodel_id: None,
        }
    }

    fn submodel(action: Action, shell_id: &'a str, submodel_id: &'a str) -> Self {
        AccessRequest {
            action,
            shell_id: Some(shell_id),
            submodel_id: Some(submodel_id),
        }
    }
}

/// Capability check consulted before each call.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, request: &AccessRequest<'_>) -> bool;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _request: &AccessRequest<'_>) -> bool {
        true
    }
}

/// Permits a fixed set of actions on any target.
#[derive(Debug, Clone, Default)]
pub struct ActionAuthorizer {
    allowed: HashSet<Action>,
}

impl ActionAuthorizer {
    pub fn new(allowed: impl IntoIterator<Item = Action>) -> Self {
        ActionAuthorizer {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn read_only() -> Self {
        Self::new([Action::Read])
    }
}

impl Authorizer for ActionAuthorizer {
    fn authorize(&self, request: &AccessRequest<'_>) -> bool {
        self.allowed.contains(&request.action)
    }
}

/// Registry wrapper that rejects unauthorized calls.
pub struct AuthorizingRegistry {
    inner: Arc<dyn ShellRegistry>,
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizingRegistry {
    pub fn new(inner: Arc<dyn ShellRegistry>, authorizer: Arc<dyn Authorizer>) -> Self {
        AuthorizingRegistry { inner, authorizer }
    }

    fn check(&self, request: AccessRequest<'_>) -> Result<(), RegistryError> {
        if self.authorizer.authorize(&request) {
            return Ok(());
        }
        warn!(
            action = %request.action,
            shell_id = request.shell_id,
            submodel_id = request.submodel_id,
            "registry access denied"
        );
        Err(RegistryError::Unauthorized {
            action: request.action,
        })
    }
}

impl ShellRegistry for AuthorizingRegistry {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        self.check(AccessRequest::shell(Action::Read, shell_id))?;
        self.inner.get_shell(shell_id)
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        self.check(AccessRequest::registry(Action::Read))?;
        self.inner.get_all_shells()
    }

    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        self.check(AccessRequest::shell(Action::Write, &descriptor.id))?;
        self.inner.add_or_replace(descriptor)
    }

    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError> {
        self.check(AccessRequest::shell(Action::Write, shell_id))?;
        self.inner.remove(shell_id)
    }

    fn clear(&self) -> Result<BTreeSet<String>, RegistryError> {
        self.check(AccessRequest::registry(Action::Write))?;
        self.inner.clear()
    }

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        self.check(AccessRequest::submodel(Action::Read, shell_id, submodel_id))?;
        self.inner.contains_submodel(shell_id, submodel_id)
    }

    fn get_all_submodels(&self, shell_id: &str) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        self.check(AccessRequest::shell(Action::Read, shell_id))?;
        self.inner.get_all_submodels(shell_id)
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        self.check(AccessRequest::submodel(Action::Read, shell_id, submodel_id))?;
        self.inner.get_submodel(shell_id, submodel_id)
    }

    fn append_or_replace_submodel(
        &self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError> {
        self.check(AccessRequest::submodel(Action::Write, shell_id, &submodel.id))?;
        self.inner.append_or_replace_submodel(shell_id, submodel)
    }

    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        self.check(AccessRequest::submodel(Action::Write, shell_id, submodel_id))?;
        self.inner.remove_submodel(shell_id, submodel_id)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        self.check(AccessRequest::registry(Action::Read))?;
        self.inner.search(request)
    }
}

/// Wraps registries in an [`AuthorizingRegistry`].
#[derive(Clone)]
pub struct AuthorizingDecorator {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizingDecorator {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        AuthorizingDecorator { authorizer }
    }
}

impl Decorator<dyn ShellRegistry> for AuthorizingDecorator {
    fn decorate(&self, inner: Arc<dyn ShellRegistry>) -> Arc<dyn ShellRegistry> {
        Arc::new(AuthorizingRegistry::new(inner, Arc::clone(&self.authorizer)))
    }
}
