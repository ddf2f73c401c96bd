pub(crate) mod clock;
pub(crate) mod looper;

// Re-export essential types
pub use clock::{
    duration_to_beats, Transport, BEATS_PER_MEASURE, DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO,
};
pub use looper::{LoopCallback, LoopScheduler, LoopTick};
