//! World state for Hamlet: placement, per-frame animation and persistence.

pub mod error;
pub mod factory;
pub mod frame;
pub mod gateway;
pub mod images;
pub mod model;
pub mod store;
pub mod world;

pub use error::{GatewayError, PlacementError};
pub use frame::{FrameRecorder, Surface};
pub use images::{Arrival, ImageStatus, ResidentRequest};
pub use model::{Action, ImageId, PlacedObject, Resident, Snapshot};
pub use store::{Engine, MemoryStore, Storage};
pub use world::World;
