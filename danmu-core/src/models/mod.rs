pub mod anime;
pub mod danmaku;

pub use anime::{ascii_sum, Anime, Episode, MediaType};
pub use danmaku::{Danmaku, DanmakuMode, WHITE};
