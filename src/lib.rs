pub mod header;
pub mod gzip;
pub mod archive;
pub mod pipeline;
pub mod report;
pub mod error;

pub use header::{HeaderRecord, HeaderError, HeaderWarning, decode_header, encode_header, compute_checksum};
pub use pipeline::{unwrap, wrap, inspect, UnwrapOptions, WrapOptions, Unwrapped, Inspection};
pub use report::{Reporter, Event, Severity, TracingReporter, MemoryReporter, NullReporter};
pub use error::ContainerError;
