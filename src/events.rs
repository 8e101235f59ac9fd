//! # Engine Events
//!
//! The engine publishes structural and execution lifecycle notifications on
//! an explicit publish/subscribe channel. The excluded editor layer (progress
//! bars, network view) subscribes to these; the engine itself never depends
//! on a subscriber existing or responding, and a bus with zero subscribers is
//! the normal headless configuration.
//!
//! Subscribers run synchronously on the emitting thread and should return
//! quickly; anything slow belongs on the subscriber's own task.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::module::ModuleId;
use crate::network::ConnectionId;

/// One notification published by the engine.
#[derive(Clone, Debug)]
pub enum EngineEvent {
  /// A module was added to the network.
  ModuleAdded {
    /// Id assigned to the new module.
    id: ModuleId,
  },
  /// A module (and every connection touching it) was removed.
  ModuleRemoved {
    /// Id of the removed module.
    id: ModuleId,
  },
  /// A connection was established.
  ConnectionAdded {
    /// Id of the new connection.
    id: ConnectionId,
  },
  /// A connection was removed.
  ConnectionRemoved {
    /// Id of the removed connection.
    id: ConnectionId,
  },
  /// A connection request was rejected; the reason mirrors the structural
  /// error returned to the caller.
  InvalidConnection {
    /// Why the request was rejected.
    reason: String,
  },
  /// A scheduling pass began.
  ExecutionStarted,
  /// A module's algorithm body is about to run.
  ModuleExecuteBegins {
    /// Module starting execution.
    id: ModuleId,
  },
  /// A module finished its turn in the pass (ran, was skipped, or errored).
  ModuleExecuteEnds {
    /// Module whose turn ended.
    id: ModuleId,
  },
  /// A module failed, or had an upstream failure propagated onto it.
  ModuleErrored {
    /// Failing module.
    id: ModuleId,
    /// Recorded error message.
    message: String,
  },
  /// The scheduling pass finished (normally or via a stop request).
  ExecutionFinished,
}

/// An event plus the wall-clock instant it was published.
#[derive(Clone, Debug)]
pub struct EventNotification {
  /// When the event was published.
  pub timestamp: DateTime<Utc>,
  /// The event itself.
  pub event: EngineEvent,
}

type Subscriber = Box<dyn Fn(&EventNotification) + Send + Sync>;

/// The engine's publish/subscribe channel.
///
/// Cloning the bus yields another handle to the same subscriber list, so the
/// network and the scheduler can share one bus.
#[derive(Clone, Default)]
pub struct EventBus {
  subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
  /// Creates a bus with no subscribers.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a callback invoked for every subsequent event.
  pub fn subscribe<F>(&self, callback: F)
  where
    F: Fn(&EventNotification) + Send + Sync + 'static,
  {
    if let Ok(mut subscribers) = self.subscribers.lock() {
      subscribers.push(Box::new(callback));
    }
  }

  /// Publishes an event to all current subscribers.
  pub fn emit(&self, event: EngineEvent) {
    let notification = EventNotification {
      timestamp: Utc::now(),
      event,
    };
    if let Ok(subscribers) = self.subscribers.lock() {
      for subscriber in subscribers.iter() {
        subscriber(&notification);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn events_reach_every_subscriber() {
    let bus = EventBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
      let seen = Arc::clone(&seen);
      bus.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
      });
    }
    bus.emit(EngineEvent::ExecutionStarted);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn emitting_with_no_subscribers_is_fine() {
    let bus = EventBus::new();
    bus.emit(EngineEvent::ExecutionFinished);
  }
}
