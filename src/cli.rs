use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "retroamp", about = "Playlist player with a five-column VU meter")]
pub struct Cli {
    /// Config file (defaults to ./retroamp.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory that track paths are resolved against
    #[arg(long, default_value = ".")]
    pub asset_base: PathBuf,

    /// Bars per VU meter column
    #[arg(long, default_value_t = 10)]
    pub bars: usize,

    /// Meter refresh rate
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Initial volume (0.0-1.0, snapped to 0.1 steps)
    #[arg(long, default_value_t = 0.2)]
    pub volume: f32,

    /// Print the playlist and exit
    #[arg(long)]
    pub list: bool,
}
