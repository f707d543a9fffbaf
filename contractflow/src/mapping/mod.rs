//! Field mapping between stages.
//!
//! Resolves values from nested data using dotted paths, literal markers and
//! recursive mapping templates.

mod resolver;

pub use resolver::{
    is_present, kind_of, lookup, FieldResolver, MappingError, MissingPathPolicy,
    DEFAULT_LITERAL_MARKER,
};
