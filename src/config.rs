use serde::Deserialize;
use std::path::PathBuf;

use crate::player::playlist::Track;
use crate::vu::meter::DEFAULT_BARS;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default = "default_playlist")]
    pub playlist: Vec<Track>,
    #[serde(default)]
    pub additional_playlists: AdditionalPlaylists,
}

#[derive(Debug, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_bars")]
    pub bars: usize,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_asset_base")]
    pub asset_base: PathBuf,
}

/// Tracks kept out of the playlist until revealed.
#[derive(Debug, Deserialize)]
pub struct AdditionalPlaylists {
    #[serde(default = "default_unreleased")]
    pub unreleased: Vec<Track>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            playlist: default_playlist(),
            additional_playlists: AdditionalPlaylists::default(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            bars: default_bars(),
            fps: default_fps(),
            asset_base: default_asset_base(),
        }
    }
}

impl Default for AdditionalPlaylists {
    fn default() -> Self {
        Self {
            unreleased: default_unreleased(),
        }
    }
}

fn default_volume() -> f32 { 0.2 }
fn default_bars() -> usize { DEFAULT_BARS }
fn default_fps() -> u32 { 60 }
fn default_asset_base() -> PathBuf { PathBuf::from(".") }

fn default_playlist() -> Vec<Track> {
    vec![
        Track::new("Reload - 4-4 Rhodes.mp3", "Reload - 4-4 Rhodes"),
        Track::new("Vesna - F-Lower.mp3", "Vesna - F-Lower"),
        Track::new("Guardians Of Dalliance - Curious.mp3", "Guardians Of Dalliance - Curious"),
        Track::new("shinichi atobe - the red line.mp3", "Shinichi Atobe - The Red Line"),
    ]
}

fn default_unreleased() -> Vec<Track> {
    vec![Track::new("hyperix - insomnolence.mp3", "hyperix - insomnolence")]
}

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}
