//! Value streams used for status and leak-report observation.

mod stream;
pub mod subscription;

pub use stream::{Next, Stream, StreamExt};
pub use subscription::{Publisher, Subscription};
