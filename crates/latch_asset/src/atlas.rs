//! Sprite atlases
//!
//! An atlas is one texture packed with many named sprites. Atlases are the
//! resources the content cache deals in; sprites are looked up by name inside
//! an atlas that is already loaded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::SubResources;

/// Address of the atlas holding the board token sprites.
pub const TOKENS_ADDRESS: &str = "TOKENS";

/// Name of the sprite for an entity type at a given level, e.g. `TokenType_0`.
pub fn token_sprite_name(entity_type: &str, level: u32) -> String {
    format!("{entity_type}_{level}")
}

/// Pixel rectangle inside the atlas texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpriteRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub name: String,
    pub rect: SpriteRect,
}

/// Atlas manifest as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteAtlas {
    pub name: String,
    pub texture: String,
    pub texture_width: u32,
    pub texture_height: u32,
    #[serde(with = "sprite_list")]
    pub sprites: HashMap<String, Sprite>,
}

impl SpriteAtlas {
    pub fn sprite(&self, name: &str) -> Option<&Sprite> {
        self.sprites.get(name)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    /// Sprite rectangle normalized to texture coordinates (0..1).
    ///
    /// Returns `None` for unknown sprites or a zero-sized texture.
    pub fn uv_rect(&self, name: &str) -> Option<SpriteRect> {
        let sprite = self.sprite(name)?;
        if self.texture_width == 0 || self.texture_height == 0 {
            return None;
        }
        let w = self.texture_width as f32;
        let h = self.texture_height as f32;
        Some(SpriteRect {
            x: sprite.rect.x / w,
            y: sprite.rect.y / h,
            width: sprite.rect.width / w,
            height: sprite.rect.height / h,
        })
    }
}

impl SubResources for SpriteAtlas {
    type Child = Sprite;

    fn sub_resource(&self, key: &str) -> Option<Sprite> {
        self.sprite(key).cloned()
    }
}

// Manifests list sprites as an array; lookups want them keyed by name.
mod sprite_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Sprite;

    pub fn serialize<S: Serializer>(
        sprites: &HashMap<String, Sprite>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<&Sprite> = sprites.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, Sprite>, D::Error> {
        let list = Vec::<Sprite>::deserialize(deserializer)?;
        let mut sprites = HashMap::with_capacity(list.len());
        for sprite in list {
            if sprites.contains_key(&sprite.name) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate sprite '{}'",
                    sprite.name
                )));
            }
            sprites.insert(sprite.name.clone(), sprite);
        }
        Ok(sprites)
    }
}
