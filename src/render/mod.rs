//! Incremental rendering of a streamed markdown buffer.
//!
//! `state` is the pure half: previous state plus fragment in, new state out.
//! `diff` turns two frames into the escape sequences that repaint one over
//! the other, and `stream` drives both against a [`Terminal`](crate::Terminal).

pub mod diff;
pub mod state;
pub mod stream;

pub use diff::diff_frames;
pub use state::{BlockRender, RenderState};
pub use stream::StreamRenderer;
