//! Observable canvas notifications.
//!
//! Each stream fans a value out to every live subscriber over an unbounded
//! flume channel. Subscribers whose receiver was dropped are pruned on the
//! next emit.

/// Broadcast stream of `T`.
#[derive(Debug)]
pub struct EventStream<T> {
    subscribers: Vec<flume::Sender<T>>,
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> EventStream<T> {
    /// New receiver that sees every later emit.
    pub fn subscribe(&mut self) -> flume::Receiver<T> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Number of live subscribers as of the last emit.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Send `value` to every subscriber.
    pub fn emit(&mut self, value: T) {
        self.subscribers
            .retain(|sender| sender.send(value.clone()).is_ok());
    }
}

/// Every stream a [`Canvas3D`](super::Canvas3D) exposes.
#[derive(Debug, Default)]
pub struct CanvasEvents {
    /// Host time (ms) of each frame that actually rendered.
    pub did_draw: EventStream<f64>,
    /// Host time (ms) of each fully drained commit.
    pub commited: EventStream<f64>,
    /// New drawing buffer size after a resize was picked up.
    pub resized: EventStream<(u32, u32)>,
    /// Fired once GPU resources were recreated after a context loss.
    pub context_restored: EventStream<()>,
    /// Number of registered representations after each change.
    pub repr_count: EventStream<usize>,
}
