mod audio;
mod cli;
mod config;
mod display;
mod input;
mod player;
mod vu;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

use audio::output::CpalTransport;
use cli::Cli;
use display::StatusLine;
use player::controller::PlaybackController;
use player::playlist::{Playlist, Track};
use player::session::{Command, Flow, PlayerSession};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect retroamp.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("retroamp.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("retroamp").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("retroamp").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };
    // Merge: config values apply only when CLI is at its default
    if cli.asset_base == std::path::Path::new(".") { cli.asset_base = cfg.player.asset_base; }
    if cli.bars == 10 { cli.bars = cfg.player.bars; }
    if cli.fps == 60 { cli.fps = cfg.player.fps; }
    if cli.volume == 0.2 { cli.volume = cfg.player.volume; }

    let playlist = Playlist::new(cfg.playlist).context("Config playlist is empty")?;

    if cli.list {
        println!("Playlist:");
        print_playlist(&playlist, None);
        return Ok(());
    }

    log::info!("retroamp - {} tracks from {}", playlist.len(), cli.asset_base.display());

    let transport = CpalTransport::new()?;
    let controller = PlaybackController::new(
        transport,
        playlist,
        cli.asset_base.clone(),
        cli.volume,
        StdRng::from_os_rng(),
    );
    let unreleased = cfg.additional_playlists.unreleased;
    let mut session = PlayerSession::new(controller, cli.bars, unreleased);

    // Launching the player counts as the first interaction
    session.start();
    session.enable_audio();

    let commands = input::spawn_stdin_reader();
    let status = StatusLine::new()?;
    status.suspend(|| println!("{}", input::HELP));

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(cli.fps.max(1)));
    let mut next_frame = Instant::now();
    'run: loop {
        while let Ok(command) = commands.try_recv() {
            if command == Command::ListPlaylist {
                let controller = session.controller();
                let current = controller.state().current_track_index;
                status.suspend(|| print_playlist(controller.playlist(), Some(current)));
            }
            if session.handle_command(command) == Flow::Quit {
                break 'run;
            }
        }

        session.poll_transport();
        session.frame();
        status.update(&session.status());

        next_frame += frame_interval;
        let now = Instant::now();
        if next_frame > now {
            std::thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }

    status.finish();
    log::debug!("{} meter frames rendered", session.animation().rendered_frames());
    log::info!("Bye");
    Ok(())
}

fn print_playlist(playlist: &Playlist, current: Option<usize>) {
    for (i, Track { file, title }) in playlist.iter().enumerate() {
        let marker = if Some(i) == current { '>' } else { ' ' };
        println!("{} {:>2}. {:<40} {}", marker, i + 1, title, file);
    }
}
