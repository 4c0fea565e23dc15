// Fabric provenance common library - main library exports

pub mod messages;
pub mod rest_helper;
pub mod sink;
pub mod types;

// Flattened re-exports
pub use self::sink::{IdentityObservationSink, ObservationBatch};
pub use self::types::*;
