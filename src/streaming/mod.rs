//! Stream plumbing: the part vocabulary, step concatenation and teeing.

pub mod part;
pub mod stitchable;
pub mod tee;

pub use part::StreamPart;
pub use stitchable::{BoxedStream, StitchableHandle, StitchableStream, stitchable_stream};
pub use tee::{Tee, tee};

/// A boxed stream of [`StreamPart`]s.
pub type PartStream = BoxedStream<StreamPart>;
