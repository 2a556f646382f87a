//! Process-wide library initialization.

use std::sync::Once;

use tracing::info;

use crate::backend::BackendKind;
use crate::space::SpaceType;

static INIT: Once = Once::new();

/// Initialize the library. Safe to call any number of times from any thread;
/// only the first call does work.
pub fn init_library() {
    INIT.call_once(|| {
        let spaces: Vec<&str> = SpaceType::ALL.iter().map(|s| s.name()).collect();
        info!(
            version = env!("CARGO_PKG_VERSION"),
            default_backend = %BackendKind::default(),
            spaces = ?spaces,
            "knn-index initialized"
        );
    });
}

pub fn is_initialized() -> bool {
    INIT.is_completed()
}
