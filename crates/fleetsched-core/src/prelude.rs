pub use fleetsched_types::error::{ClResult, Error};
pub use fleetsched_types::types::{Timestamp, TnId};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
