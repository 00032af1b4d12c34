//! iCalendar serialization (RFC 5545).
//!
//! Properties are written from their raw (escaped) value so unknown
//! content survives a parse/serialize cycle unchanged.

mod escape;
mod fold;
mod serializer;

pub use escape::escape_text;
pub use fold::fold_line;
pub use serializer::{serialize, serialize_component, serialize_property};
