// Internal utilities shared across the arbor modules

pub mod error;
