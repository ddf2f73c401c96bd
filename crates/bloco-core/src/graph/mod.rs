pub(crate) mod effects;
pub(crate) mod manager;
pub(crate) mod net;

// Re-export essential types
pub use effects::{EffectConfig, EffectKind, EffectTarget, FilterShape};
pub use manager::GraphManager;
pub use net::BlocoNet;
