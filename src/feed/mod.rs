//! The feed view: optimistic post list, its remote propagation and rendering.

mod outbox;
mod render;
mod view;

pub use render::FeedRender;
pub use view::{Editor, FeedView, Mount, PostForm};
