//! Application state shared across request handlers.

use flaggraph_core::{FlagService, MemoryStorage};

pub(crate) struct AppState {
    /// The flag orchestrator over the process-wide store.
    pub(crate) flags: FlagService<MemoryStorage>,
}
