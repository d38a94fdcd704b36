//! Framework-neutral UI bindings over the presence tracker.
//!
//! Rendering belongs to whatever UI stack embeds the client. These types
//! hold the derived state a view needs and recompute it on change.

pub mod avatar_list;
pub mod decoration;

pub use avatar_list::{AvatarItem, AvatarListView};
pub use decoration::OnlineDecoration;
