// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Dynamic cluster dispatcher: resolves an object's Group/Version/Kind to a
//! Group/Version/Resource via discovery, then issues create/delete.

use kube::api::{DeleteParams, DynamicObject, PostParams};
use kube::core::gvk::GroupVersion;
use kube::{Api, Client, ResourceExt, discovery};
use tracing::instrument;

use crate::{Error, Result};

/// Resolves and dispatches create/delete calls for arbitrary objects against
/// the cluster API.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    /// Builds a dispatcher around an existing cluster client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolves `obj`'s `apiVersion`/`kind` to a REST resource via a fresh
    /// discovery call, then returns a dynamic `Api` scoped to `namespace`.
    ///
    /// Discovery is re-run on every call: resource mappings can change at
    /// runtime (e.g. a CRD gets installed), and this is the non-trivial part
    /// of the dispatcher, not an optimization target.
    ///
    /// # Errors
    ///
    /// Returns `Error::GroupVersion` if `apiVersion` doesn't parse, or
    /// `Error::Dispatcher` if discovery or REST mapping fails.
    async fn resolve(&self, obj: &DynamicObject, namespace: &str) -> Result<Api<DynamicObject>> {
        let api_version = obj
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or_default();
        let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();

        let gv: GroupVersion = api_version.parse()?;
        let group = discovery::pinned_group(&self.client, &gv).await?;
        let (resource, _caps) = group
            .recommended_kind(kind)
            .ok_or_else(|| format!("unable to find API kind {kind:?} in {api_version:?}"))?;

        Ok(Api::namespaced_with(self.client.clone(), namespace, &resource))
    }

    /// Creates `obj` in `namespace`, returning the server's (possibly
    /// defaulted) representation.
    ///
    /// # Errors
    ///
    /// Returns `Error::GroupVersion`/`Error::Dispatcher` verbatim; this layer
    /// does not classify transport, auth or not-found errors.
    #[instrument(skip(self, obj), fields(kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default(), name = %obj.name_any()))]
    pub async fn create(&self, obj: &DynamicObject, namespace: &str) -> Result<DynamicObject> {
        let api = self.resolve(obj, namespace).await?;
        let created = api.create(&PostParams::default(), obj).await?;
        Ok(created)
    }

    /// Deletes the object named by `obj` in `namespace` using foreground
    /// cascading deletion (the server blocks removal of the owner until
    /// dependents are gone).
    ///
    /// # Errors
    ///
    /// Returns `Error::GroupVersion`/`Error::Dispatcher` verbatim.
    #[instrument(skip(self, obj), fields(kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default(), name = %obj.name_any()))]
    pub async fn delete(&self, obj: &DynamicObject, namespace: &str) -> Result<()> {
        let api = self.resolve(obj, namespace).await?;
        api.delete(&obj.name_any(), &DeleteParams::foreground())
            .await?;
        Ok(())
    }
}
