pub mod barrier;

pub use barrier::{AesGcmBarrier, Barrier, BarrierError};
