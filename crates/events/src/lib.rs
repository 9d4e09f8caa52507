//! Workflow notifications.
//!
//! Executors and the scheduler publish [`WorkflowEvent`]s on an [`EventBus`];
//! anything interested in progress (UI push, metrics, audit) subscribes. The bus
//! is for distribution only: the content repository stays the source of truth.

pub mod bus;
pub mod in_memory_bus;
pub mod workflow;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use workflow::{WorkflowEvent, WorkflowEventKind};
