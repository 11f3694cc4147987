//! CamLink：ESP32 摄像头 MJPEG 推流 + WiFi 自举
//!
//! 核心逻辑与硬件无关，可在主机上测试；`platform` 与 `boards`
//! 只在 ESP-IDF 目标上编译。

pub mod bootstrap;
pub mod context;
pub mod control;
pub mod credential;
pub mod server;
pub mod stream;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "espidf")]
pub mod boards;
#[cfg(target_os = "espidf")]
pub mod platform;
