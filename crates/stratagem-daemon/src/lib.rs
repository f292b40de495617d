//! stratagem-mapper daemon library
//!
//! Binds numpad keys to stratagem input sequences and plays them back through
//! a virtual keyboard.

pub mod binding;
pub mod catalog;
pub mod controller;
pub mod daemon;
pub mod device;
pub mod feedback;
pub mod injector;
pub mod ipc;
pub mod keys;
pub mod player;
pub mod resolver;

pub use binding::{BindingError, KeyBindingStore, SlotId};
pub use catalog::{CatalogError, MacroCatalog, Stratagem};
pub use controller::{
    ChangeObserver, ControllerError, DragPayload, KeyOutcome, SettingsUpdate,
    SlotAssignmentController, SlotSnapshot, SlotState,
};
pub use daemon::{Daemon, ProfileWriter};
pub use feedback::{DaemonFeedback, FeedbackSink};
pub use injector::{InjectError, KeySink, VirtualDevice, VIRTUAL_DEVICE_NAME};
pub use ipc::{IpcRequest, IpcResponse, IpcServer};
pub use player::{MacroPlayer, PlaybackError, PlaybackEvent, PlaybackOptions, PlaybackRequest};
pub use resolver::resolve;
