// Resume aggregate: validation, persistence (upsert root + replace children),
// and HTML rendering for preview and printable export.

pub mod handlers;
pub mod render;
pub mod store;
pub mod validation;
