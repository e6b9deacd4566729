pub mod envelope;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod relay;
pub mod repackager;

pub use envelope::{Envelope, RequestContext};
pub use error::RelayError;
pub use forwarder::{Forwarder, HostAllowList};
pub use headers::HeaderPolicy;
pub use relay::{RelayOutcome, RelayService};
pub use repackager::RelayPayload;
