//! Memory management
//!
//! Physical frames and their owners, executable decoding, per-process
//! address spaces and the strategies that populate them.

pub mod coremap;
pub mod frame;
pub mod noff;
pub mod source;
pub mod space;

pub use coremap::{CoreMap, CoreMapEntry};
pub use frame::{FrameAllocator, FramePool, FrameStats};
pub use noff::{NoffHeader, Segment};
pub use source::{DemandPages, PageSource, StaticPages};
pub use space::{AddressSpace, Eviction, PageEntry, PageOrigin};
