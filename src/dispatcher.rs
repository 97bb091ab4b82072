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
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use crate::registry::{ButtonId, SamplerRegistry};

/// An edge reported by the GPIO layer, already corrected for the pin's active level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// The button went down.
    Activated,
    /// The button came back up.
    Deactivated,
}

/// A transition request for a single button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    Release,
}

/// Binds a GPIO pin to a button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub pin: u8,
    pub button: ButtonId,
}

/// Routes pin edges to per-button work queues.
///
/// Dispatching never blocks, so it is safe to call from interrupt callbacks. Each
/// button's queue is drained in order by its own worker.
pub struct EventDispatcher {
    bindings: Vec<Binding>,
    queues: Vec<mpsc::UnboundedSender<ButtonEvent>>,
}

impl EventDispatcher {
    /// Creates a dispatcher for the given bindings. Returns the receiving end of each
    /// button's queue, indexed by button ID.
    pub fn new(
        bindings: Vec<Binding>,
    ) -> (EventDispatcher, Vec<mpsc::UnboundedReceiver<ButtonEvent>>) {
        let buttons = bindings
            .iter()
            .map(|binding| binding.button + 1)
            .max()
            .unwrap_or(0);
        let (queues, receivers) = (0..buttons).map(|_| mpsc::unbounded_channel()).unzip();

        (EventDispatcher { bindings, queues }, receivers)
    }

    fn button_for(&self, pin: u8) -> Option<ButtonId> {
        self.bindings
            .iter()
            .find(|binding| binding.pin == pin)
            .map(|binding| binding.button)
    }

    /// Queues the transition for the button bound to `pin`. Returns false if the pin is
    /// unbound or the button's worker has stopped.
    pub fn dispatch(&self, pin: u8, edge: Edge) -> bool {
        let Some(button) = self.button_for(pin) else {
            warn!(pin, ?edge, "Edge on unbound pin");
            return false;
        };
        let event = match edge {
            Edge::Activated => ButtonEvent::Press,
            Edge::Deactivated => ButtonEvent::Release,
        };

        if self.queues[button].send(event).is_err() {
            debug!(pin, button, ?event, "Button worker stopped, dropping event");
            return false;
        }
        debug!(pin, button, ?event, "Edge dispatched");
        true
    }
}

/// Starts one worker per button queue. Workers exit when their queue closes, or
/// once `stop` turns true. A worker never stops partway through a transition.
pub fn spawn_workers(
    registry: Arc<SamplerRegistry>,
    receivers: Vec<mpsc::UnboundedReceiver<ButtonEvent>>,
    stop: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(button, events)| {
            tokio::spawn(
                button_worker(registry.clone(), button, events, stop.clone())
                    .instrument(info_span!("button", button)),
            )
        })
        .collect()
}

async fn button_worker(
    registry: Arc<SamplerRegistry>,
    button: ButtonId,
    mut events: mpsc::UnboundedReceiver<ButtonEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = stop.wait_for(|stop| *stop) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            ButtonEvent::Press => {
                registry.on_press(button).await;
            }
            ButtonEvent::Release => {
                registry.on_release(button).await;
            }
        }
    }
    debug!("Button worker closing.");
}
