//! Safety gate for generated SQL.
//!
//! Every candidate statement passes a lexical denylist and a read-only prefix
//! check, then gets a `LIMIT` if it has none. An optional parser pass can only
//! add rejections on top of the lexical baseline.

pub mod gate;
pub mod parse;

pub use gate::{FORBIDDEN_KEYWORDS, QueryGate, READ_ONLY_PREFIXES, bound, validate};
