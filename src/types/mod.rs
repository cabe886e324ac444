// ABOUTME: Identifiers and image references shared by the engine and transports.
// ABOUTME: Phantom-typed IDs plus a defaults-free reference parser.

mod id;
mod image_ref;
pub mod reference;

pub use id::{Id, ImageId, LayerId};
pub use image_ref::ImageRef;
pub use reference::{ParseReferenceError, ParsedRef};
