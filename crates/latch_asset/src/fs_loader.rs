//! Filesystem atlas loader
//!
//! Resolves an address to `<root>/<address>.json` and parses it as a
//! [`SpriteAtlas`] manifest.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::{AssetLoader, LoadError, SpriteAtlas};

#[derive(Debug, Clone)]
pub struct FsAtlasLoader {
    root: PathBuf,
}

impl FsAtlasLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest path for `address`, or `None` if the address would escape the root.
    pub fn manifest_path(&self, address: &str) -> Option<PathBuf> {
        let escapes = address
            .split(['/', '\\'])
            .any(|part| part.is_empty() || part == "." || part == "..");
        if escapes {
            return None;
        }
        Some(self.root.join(format!("{address}.json")))
    }
}

impl AssetLoader for FsAtlasLoader {
    type Resource = SpriteAtlas;

    fn load(&self, address: &str) -> BoxFuture<'static, Result<SpriteAtlas, LoadError>> {
        let path = self.manifest_path(address);
        let address = address.to_string();
        async move {
            let Some(path) = path else {
                return Err(LoadError::NotFound);
            };
            tracing::trace!(address = %address, path = %path.display(), "Reading atlas manifest");
            let bytes = tokio::fs::read(&path).await?;
            let atlas: SpriteAtlas = serde_json::from_slice(&bytes)?;
            Ok(atlas)
        }
        .boxed()
    }

    fn release(&self, address: &str, atlas: &SpriteAtlas) -> Result<(), LoadError> {
        tracing::trace!(address = %address, sprites = atlas.len(), "Released atlas");
        Ok(())
    }
}
