//! In-process event bus
//!
//! Handlers are registered per topic. Published events go through a channel
//! to a dispatch loop which hands every event to its own task, so delivery is
//! unordered and a slow or failing handler never blocks later events. Handler
//! errors and panics are logged and never reach the publisher. Publishing
//! fails until the bus is started.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fleetsched_types::events::{DomainEvent, EventEnvelope};

use crate::prelude::*;

pub type EventHandler = Arc<dyn Fn(DomainEvent) -> BoxFuture<'static, ClResult<()>> + Send + Sync>;

#[derive(Clone)]
pub struct EventBus {
	handlers: Arc<parking_lot::RwLock<HashMap<&'static str, Vec<EventHandler>>>>,
	tx: flume::Sender<DomainEvent>,
	rx: flume::Receiver<DomainEvent>,
	started: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let handlers = self.handlers.read();
		f.debug_struct("EventBus")
			.field("topics", &handlers.keys().collect::<Vec<_>>())
			.field("pending", &self.rx.len())
			.finish()
	}
}

impl EventBus {
	pub fn new(buffer: usize) -> Self {
		let (tx, rx) = if buffer == 0 { flume::unbounded() } else { flume::bounded(buffer) };
		Self {
			handlers: Arc::new(parking_lot::RwLock::new(HashMap::new())),
			tx,
			rx,
			started: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Register a handler for a topic
	pub fn subscribe<F, Fut>(&self, topic: &'static str, handler: F)
	where
		F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ClResult<()>> + Send + 'static,
	{
		let handler: EventHandler = Arc::new(move |event: DomainEvent| handler(event).boxed());
		self.handlers.write().entry(topic).or_default().push(handler);
		debug!("Subscribed handler to {}", topic);
	}

	pub fn handler_count(&self, topic: &str) -> usize {
		self.handlers.read().get(topic).map_or(0, Vec::len)
	}

	pub fn is_started(&self) -> bool {
		self.started.load(Ordering::SeqCst)
	}

	/// Start the dispatch loop (idempotent)
	pub fn start(&self) {
		if self.started.swap(true, Ordering::SeqCst) {
			return;
		}

		let bus = self.clone();
		let rx = self.rx.clone();
		tokio::spawn(async move {
			while let Ok(event) = rx.recv_async().await {
				let bus = bus.clone();
				tokio::spawn(async move {
					bus.dispatch(event).await;
				});
			}
			debug!("Event bus loop finished");
		});
		info!("Event bus started");
	}

	/// Queue an event for asynchronous delivery
	pub async fn publish(&self, event: DomainEvent) -> ClResult<()> {
		if !self.is_started() {
			warn!("Dropping {} event: event bus is not started", event.topic());
			return Err(Error::Internal("event bus is not started".into()));
		}
		debug!("Publishing {} event", event.topic());
		self.tx
			.send_async(event)
			.await
			.map_err(|_| Error::Internal("event bus is closed".into()))
	}

	/// Decode and publish an event received from an external transport
	pub async fn publish_envelope(&self, envelope: EventEnvelope) -> ClResult<()> {
		let id = envelope.id.clone();
		let event = envelope
			.into_event()
			.inspect_err(|err| warn!("Dropping undecodable event {}: {}", id, err))?;
		self.publish(event).await
	}

	/// Deliver an event to all handlers of its topic and wait for them.
	/// Returns the number of handlers that completed successfully.
	pub async fn dispatch(&self, event: DomainEvent) -> usize {
		let topic = event.topic();
		let handlers = self.handlers.read().get(topic).cloned().unwrap_or_default();
		if handlers.is_empty() {
			debug!("No handlers for {} event", topic);
			return 0;
		}

		let tasks = handlers.iter().map(|handler| tokio::spawn(handler(event.clone())));
		let mut succeeded = 0;
		for res in join_all(tasks).await {
			match res {
				Ok(Ok(())) => succeeded += 1,
				Ok(Err(err)) => warn!("Handler for {} failed: {}", topic, err),
				Err(err) => error!("Handler for {} panicked: {}", topic, err),
			}
		}
		succeeded
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(0)
	}
}


// vim: ts=4
