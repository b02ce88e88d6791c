//! In-memory loader for exercising the cache

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::atlas::{Sprite, SpriteAtlas, SpriteRect};
use crate::{AssetLoader, LoadError};

/// Serves atlases from memory.
///
/// A gated loader holds every load until [`open`](Self::open) hands out
/// permits, which lets tests pile up waiters on an in-flight load.
#[derive(Clone)]
pub struct TestLoader {
    state: Arc<State>,
}

struct State {
    atlases: Mutex<HashMap<String, SpriteAtlas>>,
    gate: Semaphore,
    loads: Mutex<HashMap<String, usize>>,
    released: Mutex<Vec<String>>,
    failing_releases: Mutex<HashSet<String>>,
}

impl TestLoader {
    /// Loads complete as soon as they are polled.
    pub fn new() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// Loads wait for [`open`](Self::open).
    pub fn gated() -> Self {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            state: Arc::new(State {
                atlases: Mutex::new(HashMap::new()),
                gate: Semaphore::new(permits),
                loads: Mutex::new(HashMap::new()),
                released: Mutex::new(Vec::new()),
                failing_releases: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn with_atlas(self, atlas: SpriteAtlas) -> Self {
        self.state.atlases.lock().insert(atlas.name.clone(), atlas);
        self
    }

    /// Lets `loads` more loads finish.
    pub fn open(&self, loads: usize) {
        self.state.gate.add_permits(loads);
    }

    /// Number of loads issued for `address`.
    pub fn loads(&self, address: &str) -> usize {
        self.state.loads.lock().get(address).copied().unwrap_or(0)
    }

    /// Addresses passed to `release`, in call order.
    pub fn released(&self) -> Vec<String> {
        self.state.released.lock().clone()
    }

    pub fn fail_release_of(&self, address: &str) {
        self.state.failing_releases.lock().insert(address.to_string());
    }
}

impl Default for TestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader for TestLoader {
    type Resource = SpriteAtlas;

    fn load(&self, address: &str) -> BoxFuture<'static, Result<SpriteAtlas, LoadError>> {
        *self
            .state
            .loads
            .lock()
            .entry(address.to_string())
            .or_default() += 1;

        let state = Arc::clone(&self.state);
        let address = address.to_string();
        async move {
            let permit = state
                .gate
                .acquire()
                .await
                .map_err(|e| LoadError::Aborted(e.to_string()))?;
            permit.forget();
            state
                .atlases
                .lock()
                .get(&address)
                .cloned()
                .ok_or(LoadError::NotFound)
        }
        .boxed()
    }

    fn release(&self, address: &str, _atlas: &SpriteAtlas) -> Result<(), LoadError> {
        self.state.released.lock().push(address.to_string());
        if self.state.failing_releases.lock().contains(address) {
            return Err(LoadError::Io(format!("cannot release {address}")));
        }
        Ok(())
    }
}

/// Atlas named `name` holding 16x16 sprites with the given names.
pub fn atlas(name: &str, sprites: &[&str]) -> SpriteAtlas {
    let sprites = sprites
        .iter()
        .enumerate()
        .map(|(i, sprite)| {
            let sprite = Sprite {
                name: sprite.to_string(),
                rect: SpriteRect {
                    x: (i * 16) as f32,
                    y: 0.0,
                    width: 16.0,
                    height: 16.0,
                },
            };
            (sprite.name.clone(), sprite)
        })
        .collect();

    SpriteAtlas {
        name: name.to_string(),
        texture: format!("{name}.png"),
        texture_width: 256,
        texture_height: 16,
        sprites,
    }
}
