// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const STOP: &str = "stop";
const VOLUME: &str = "volume";
const VARIATION: &str = "variation";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// A controller that controls a player using line-oriented keyboard commands.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses one command line. Returns None if the line isn't a command.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        match (command.as_str(), args.as_slice()) {
            (PLAY, []) => Some(Event::Play),
            (STOP, []) => Some(Event::Stop),
            (STATUS, []) => Some(Event::Status),
            (QUIT, []) => Some(Event::Quit),
            (VOLUME, [channel, percent]) => Some(Event::SetVolume {
                channel: channel.parse().ok()?,
                percent: percent.parse().ok()?,
            }),
            (VARIATION, [channel, variation]) => Some(Event::SetVariation {
                channel: channel.parse().ok()?,
                variation: variation.parse().ok()?,
            }),
            _ => None,
        }
    }

    /// Reads and forwards one command. Returns false when input is exhausted, the user quits or
    /// the controller has gone away.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {} <channel> <percent>, {} <channel> <index>, {}, {}): ",
            PLAY, STOP, VOLUME, VARIATION, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let input = input.trim();
        if input.is_empty() {
            return Ok(true);
        }
        match Driver::parse(input) {
            Some(event) => {
                let quit = event == Event::Quit;
                if events_tx.blocking_send(event).is_err() {
                    return Ok(false);
                }
                Ok(!quit)
            }
            None => {
                warn!(input, "Unrecognized input");
                Ok(true)
            }
        }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
