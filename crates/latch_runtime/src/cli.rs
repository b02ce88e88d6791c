//! Command line interface

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Loads sprite atlases by address and looks sprites up in them.
#[derive(Debug, Parser)]
#[command(name = "latch", version)]
pub struct Cli {
    /// Settings file (JSON). Defaults apply when omitted.
    #[arg(long, short)]
    pub settings: Option<PathBuf>,

    /// Atlas manifest directory, overriding the settings file.
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Sprite to look up in every loaded atlas. May be repeated.
    #[arg(long = "sprite")]
    pub sprites: Vec<String>,

    /// Token sprite to look up, as `<type>:<level>`. May be repeated.
    #[arg(long = "token")]
    pub tokens: Vec<TokenQuery>,

    /// Atlas addresses to acquire.
    #[arg(default_value = latch_asset::TOKENS_ADDRESS)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenQuery {
    pub entity_type: String,
    pub level: u32,
}

impl FromStr for TokenQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity_type, level) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected <type>:<level>, got '{s}'"))?;
        if entity_type.is_empty() {
            return Err("token type must not be empty".to_string());
        }
        let level = level
            .parse()
            .map_err(|e| format!("invalid token level '{level}': {e}"))?;
        Ok(Self {
            entity_type: entity_type.to_string(),
            level,
        })
    }
}
