pub mod finalizer;
pub mod metadata;
pub mod raw_sink;
