//! ESP-IDF 上的实现：NVS 存储、WiFi、摄像头、HTTP 服务器、系统

pub mod camera;
pub mod httpd;
pub mod nvs;
pub mod system;
pub mod wifi;

pub use camera::{Camera, CameraFrame};
pub use nvs::NvsCredentialStore;
pub use system::{log_heap, EspSystem};
pub use wifi::{EspNetworkStatus, EspRadio};
