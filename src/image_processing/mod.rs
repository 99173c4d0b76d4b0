pub mod annotate;
pub mod batch;
pub mod enhance;
pub mod geometry;
pub mod resize;
pub mod sprite;

pub use annotate::LabelRenderer;
pub use batch::{RenderedSprite, SpriteBatch, SpriteBatchConfig};
pub use geometry::{RowBand, SpriteGeometry, ROW_COUNT};
pub use sprite::{save_jpeg, Sprite, SpriteBuilder};
