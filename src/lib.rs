//! Shared-memory metrics export in the MMV binary format.
//!
//! An instrumented process registers metrics, instance domains, and help
//! text with an [`MmvWriter`], then `start()`s it: the writer lays every
//! entity out at a fixed offset in one memory-mapped region and publishes it
//! behind a generation handshake an external collector can trust. After
//! that, value updates are single aligned stores into pre-placed slots, with
//! no locks, sockets, or serialization on the hot path. [`UpdateBridge`]
//! adds a bounded lossy queue for producers that outrun the writer.

pub mod bridge;
pub mod config;
pub mod error;
pub mod ident;
pub mod instance;
pub mod layout;
pub mod metric;
pub mod region;
pub mod store;
pub mod strings;
pub mod units;
pub mod value;
pub mod version;
pub mod writer;

pub use bridge::{MetricUpdate, UpdateBridge};
pub use config::{FLAG_NO_PREFIX, FLAG_PROCESS, MmvWriterConfig};
pub use error::{MmvError, MmvResult};
pub use metric::MetricName;
pub use units::Unit;
pub use value::{MetricType, MetricValue, Semantics};
pub use version::MmvVersion;
pub use writer::MmvWriter;
