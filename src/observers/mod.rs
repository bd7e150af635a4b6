//! Observer system for consumer state changes.
//!
//! Observers receive what the consumer republishes:
//! - Messages arriving, being removed, or reloaded in bulk
//! - Connection transitions
//! - Errors landing in the error slot
//!
//! Each observer has a bounded buffer; an observer that falls behind is
//! dropped rather than slowing down ingestion.
//!
//! # Example
//!
//! ```ignore
//! let handle = consumer.subscribe(ObserverFilter::all());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ConsumerEvent::MessageReceived { message }) => println!("{}", message.content),
//!         Ok(ConsumerEvent::Dropped { .. }) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::ObserverRegistry;
pub use types::{
    ConsumerEvent, DropReason, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId,
};
