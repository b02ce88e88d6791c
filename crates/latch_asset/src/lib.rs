//! Latch Asset Pipeline
//!
//! Addressable content: atlases are loaded by address through an
//! [`AssetLoader`], shared through a reference-counted [`ResourceCache`], and
//! queried for the sprites they contain.
//!
//! ```ignore
//! let cache = ResourceCache::new(FsAtlasLoader::new("assets/atlases"), CacheConfig::default());
//! let tokens = cache.acquire(TOKENS_ADDRESS).await?;
//! let sprite = cache.token_sprite("TokenType", 0);
//! cache.release(TOKENS_ADDRESS)?;
//! ```

pub mod atlas;
pub mod cache;
pub mod config;
mod error;
pub mod fs_loader;
pub mod loader;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use atlas::{Sprite, SpriteAtlas, SpriteRect, TOKENS_ADDRESS};
pub use cache::{Acquire, AcquireMany, CacheStatsSnapshot, ResourceCache};
pub use config::{CacheConfig, EvictionPolicy};
pub use error::{CacheError, LoadError};
pub use fs_loader::FsAtlasLoader;
pub use loader::{AssetLoader, SubResources};

/// Asset pipeline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
