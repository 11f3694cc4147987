//! 摄像头引脚定义，按板型 feature 选择

#[cfg(all(feature = "ai_thinker", not(feature = "_no_default")))]
pub mod ai_thinker;
#[cfg(all(feature = "ai_thinker", not(feature = "_no_default")))]
pub use ai_thinker::*;

#[cfg(feature = "esp_eye")]
pub mod esp_eye;
#[cfg(feature = "esp_eye")]
pub use esp_eye::*;

/// GPIO numbers for the DVP camera bus; -1 means not connected.
#[derive(Debug, Clone, Copy)]
pub struct CameraPins {
    pub pwdn: i32,
    pub reset: i32,
    pub xclk: i32,
    pub sda: i32,
    pub scl: i32,
    /// D0..D7 (Y2..Y9 on the module silkscreen)
    pub d: [i32; 8],
    pub vsync: i32,
    pub href: i32,
    pub pclk: i32,
}
