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
use std::time::Duration;

use rppal::gpio::{Event, Gpio, InputPin, Trigger};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

use crate::config::Pull;
use crate::dispatcher::{Edge, EventDispatcher};

/// A driver that watches GPIO pins for edge interrupts.
pub struct Driver {
    pins: Vec<u8>,
    debounce: Option<Duration>,
    pull: Pull,
}

impl Driver {
    pub fn new(pins: Vec<u8>, debounce: Option<Duration>, pull: Pull) -> Driver {
        Driver {
            pins,
            debounce,
            pull,
        }
    }
}

/// Maps a raw level change to a button edge given how the pin is biased.
fn edge_for(trigger: Trigger, pull: Pull) -> Option<Edge> {
    match (trigger, pull) {
        (Trigger::FallingEdge, Pull::Up) | (Trigger::RisingEdge, Pull::Down) => {
            Some(Edge::Activated)
        }
        (Trigger::RisingEdge, Pull::Up) | (Trigger::FallingEdge, Pull::Down) => {
            Some(Edge::Deactivated)
        }
        _ => None,
    }
}

/// Configures every pin as an input and registers its interrupt callback. The
/// callbacks stay registered for as long as the returned pins are alive.
fn watch_pins(
    pins: &[u8],
    debounce: Option<Duration>,
    pull: Pull,
    dispatcher: Arc<EventDispatcher>,
) -> Result<Vec<InputPin>, rppal::gpio::Error> {
    let gpio = Gpio::new()?;
    let mut inputs = Vec::with_capacity(pins.len());
    for &pin in pins {
        let gpio_pin = gpio.get(pin)?;
        let mut input = match pull {
            Pull::Up => gpio_pin.into_input_pullup(),
            Pull::Down => gpio_pin.into_input_pulldown(),
        };

        let dispatcher = dispatcher.clone();
        input.set_async_interrupt(Trigger::Both, debounce, move |event: Event| {
            if let Some(edge) = edge_for(event.trigger, pull) {
                dispatcher.dispatch(pin, edge);
            }
        })?;
        inputs.push(input);
    }
    Ok(inputs)
}

impl super::Driver for Driver {
    fn monitor_events(
        &self,
        dispatcher: Arc<EventDispatcher>,
    ) -> JoinHandle<Result<(), io::Error>> {
        let pins = self.pins.clone();
        let debounce = self.debounce;
        let pull = self.pull;

        tokio::spawn(
            async move {
                let _inputs =
                    watch_pins(&pins, debounce, pull, dispatcher).map_err(io::Error::other)?;
                info!(?pins, ?debounce, ?pull, "GPIO driver started.");

                // Interrupts are delivered on rppal's threads until this task is aborted.
                std::future::pending::<()>().await;
                Ok::<(), io::Error>(())
            }
            .instrument(info_span!("gpio driver")),
        )
    }
}
