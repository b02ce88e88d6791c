//! Seams between the cache and the engine that actually fetches assets

use futures::future::BoxFuture;

use crate::LoadError;

/// Fetches assets by address on behalf of a [`ResourceCache`](crate::ResourceCache).
///
/// The cache guarantees that `load` is never called twice concurrently for the
/// same address, and that `release` is called at most once per successful load.
pub trait AssetLoader: Send + Sync + 'static {
    /// The loaded asset.
    type Resource: Send + Sync + 'static;

    /// Starts loading the asset at `address`.
    ///
    /// The returned future is driven on its own task; it must not borrow from `self`.
    fn load(&self, address: &str) -> BoxFuture<'static, Result<Self::Resource, LoadError>>;

    /// Releases engine-level memory backing a resource that is leaving the cache.
    ///
    /// Consumers may still hold clones of the resource when this is called.
    fn release(&self, address: &str, resource: &Self::Resource) -> Result<(), LoadError> {
        let _ = (address, resource);
        Ok(())
    }
}

/// A resource made of named children, e.g. the sprites inside an atlas.
pub trait SubResources {
    type Child;

    fn sub_resource(&self, key: &str) -> Option<Self::Child>;
}
