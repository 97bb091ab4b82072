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
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use crate::dispatcher::{Edge, EventDispatcher};

const PRESS: &str = "press";
const RELEASE: &str = "release";

/// A driver that reads button edges from stdin, e.g. `press 17` then `release 17`.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and dispatches one command. Returns false once the reader is exhausted.
    fn monitor_io<R, W>(
        dispatcher: &EventDispatcher,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "Command ({} <pin>, {} <pin>): ", PRESS, RELEASE)?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match parse_command(&input) {
            Some((pin, edge)) => {
                dispatcher.dispatch(pin, edge);
            }
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

fn parse_command(input: &str) -> Option<(u8, Edge)> {
    let lowered = input.trim().to_lowercase();
    let mut words = lowered.split_whitespace();
    let edge = match words.next()? {
        PRESS => Edge::Activated,
        RELEASE => Edge::Deactivated,
        _ => return None,
    };
    let pin = words.next()?.parse().ok()?;
    if words.next().is_some() {
        return None;
    }
    Some((pin, edge))
}

impl super::Driver for Driver {
    fn monitor_events(
        &self,
        dispatcher: Arc<EventDispatcher>,
    ) -> JoinHandle<Result<(), io::Error>> {
        // Stdin reads can't be cancelled, so they run on a detached thread rather than
        // the blocking pool, which would hold up runtime shutdown.
        let (result_tx, result_rx) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name("keyboard-driver".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "keyboard driver");
                let _enter = span.enter();

                info!("Keyboard driver started.");
                let result = loop {
                    match Self::monitor_io(&dispatcher, io::stdin().lock(), io::stdout()) {
                        Ok(true) => continue,
                        Ok(false) => {
                            info!("Stdin closed, keyboard driver stopping.");
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                };
                let _ = result_tx.send(result);
            });

        tokio::spawn(async move {
            spawned?;
            result_rx
                .await
                .unwrap_or_else(|_| Err(io::Error::other("keyboard driver thread panicked")))
        })
    }
}
