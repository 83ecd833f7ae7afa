//! Ordered concurrent chunk production.
//!
//! Units are processed on a bounded pool of worker threads; completions are
//! reordered by a delivery buffer and leave the pipeline as a strictly
//! index-ordered stream of events on a crossbeam channel.

pub mod cancel;
pub mod delivery;
pub mod error;
pub mod pool;
pub mod producer;
pub mod types;

pub use cancel::CancellationToken;
pub use delivery::{Delivered, DeliveryBuffer, Resolution};
pub use error::{CollectingReporter, ErrorReporter, LogReporter};
pub use pool::{PoolConfig, PoolHandle, ProducerPool};
pub use producer::{CommandProducer, JobContext, MockProducer, Producer};
pub use types::{Artifact, PipelineEvent, WorkUnit};
