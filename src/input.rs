use std::io::BufRead;
use std::sync::mpsc::{channel, Receiver};

use crate::player::session::Command;

pub const HELP: &str =
    "p play/pause | b prev | n next | +/- volume | v <0-1> set volume | u unreleased | l list | q quit";

/// Reads commands line by line on a helper thread so the frame loop never
/// blocks on the terminal.
pub fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => log::warn!("Unknown command '{}' ({})", line.trim(), HELP),
            }
        }
        log::debug!("Input closed");
    });
    rx
}
