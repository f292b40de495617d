//! Configuration for stratagem-mapper
//!
//! This crate parses the KDL stratagem catalog and the persisted profile
//! (settings plus numpad slot table), and writes the profile back.

mod error;
mod layout;
mod model;
mod parser;
mod writer;

pub use error::{ConfigError, InvalidDirectionInfo};
pub use layout::{layout_for, SlotLayout, NUMPAD_LAYOUT};
pub use model::*;
pub use parser::{
    builtin_catalog, parse_catalog, parse_catalog_str, parse_profile, parse_profile_str,
    BUILTIN_CATALOG,
};
pub use writer::{generate_profile, write_profile};
