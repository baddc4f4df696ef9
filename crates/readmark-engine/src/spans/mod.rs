//! Offset-based span annotation.
//!
//! - **`index`**: [`TextPositionIndex`], translating flat offsets to fragment positions
//! - **`store`**: [`SpanStore`], the disjoint, position-numbered span set
//! - **`renderer`**: [`SpanRenderer`], redrawing decorations from the span set
//! - **`palette`**: the fixed decoration colors

pub mod index;
pub mod palette;
pub mod renderer;
pub mod store;

pub use index::{Bias, FragmentRange, IndexEntry, IndexLookupError, Point, TextPositionIndex};
pub use palette::{Color, PALETTE};
pub use renderer::{RenderReport, SkippedSpan, SpanRenderer};
pub use store::{Span, SpanError, SpanStore};
