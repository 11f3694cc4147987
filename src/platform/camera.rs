//! esp32-camera 帧源
//!
//! `esp_camera_fb_get` 取出的缓冲区必须用 `esp_camera_fb_return` 归还，
//! 这里由 `CameraFrame` 的 `Drop` 负责。

use std::ptr::NonNull;

use esp_idf_svc::sys::{camera, esp};

use crate::boards::CameraPins;
use crate::stream::FrameSource;

const XCLK_FREQ_HZ: i32 = 20_000_000;
const JPEG_QUALITY: i32 = 12;
/// Driver frame buffers; also the number of viewers served at once.
pub const FB_COUNT: usize = 2;

/// Handle proving the sensor driver is initialised.
pub struct Camera {
    _private: (),
}

impl Camera {
    pub fn init(pins: &CameraPins) -> anyhow::Result<Self> {
        let mut config = camera::camera_config_t::default();
        config.pin_pwdn = pins.pwdn;
        config.pin_reset = pins.reset;
        config.pin_xclk = pins.xclk;
        config.__bindgen_anon_1.pin_sccb_sda = pins.sda;
        config.__bindgen_anon_2.pin_sccb_scl = pins.scl;
        config.pin_d7 = pins.d[7];
        config.pin_d6 = pins.d[6];
        config.pin_d5 = pins.d[5];
        config.pin_d4 = pins.d[4];
        config.pin_d3 = pins.d[3];
        config.pin_d2 = pins.d[2];
        config.pin_d1 = pins.d[1];
        config.pin_d0 = pins.d[0];
        config.pin_vsync = pins.vsync;
        config.pin_href = pins.href;
        config.pin_pclk = pins.pclk;

        config.xclk_freq_hz = XCLK_FREQ_HZ;
        config.ledc_timer = camera::ledc_timer_t_LEDC_TIMER_0;
        config.ledc_channel = camera::ledc_channel_t_LEDC_CHANNEL_0;
        config.pixel_format = camera::pixformat_t_PIXFORMAT_JPEG;
        config.frame_size = camera::framesize_t_FRAMESIZE_VGA;
        config.jpeg_quality = JPEG_QUALITY;
        config.fb_count = FB_COUNT as _;
        config.fb_location = camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM;
        config.grab_mode = camera::camera_grab_mode_t_CAMERA_GRAB_LATEST;

        esp!(unsafe { camera::esp_camera_init(&config) })?;
        log::info!("Camera initialized");
        Ok(Self { _private: () })
    }
}

/// A checked-out frame buffer; returned to the driver on drop.
pub struct CameraFrame {
    fb: NonNull<camera::camera_fb_t>,
}

impl AsRef<[u8]> for CameraFrame {
    fn as_ref(&self) -> &[u8] {
        unsafe {
            let fb = self.fb.as_ref();
            std::slice::from_raw_parts(fb.buf, fb.len as usize)
        }
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        unsafe { camera::esp_camera_fb_return(self.fb.as_ptr()) }
    }
}

impl FrameSource for Camera {
    type Frame = CameraFrame;

    fn capture(&self) -> Option<CameraFrame> {
        let fb = NonNull::new(unsafe { camera::esp_camera_fb_get() });
        if fb.is_none() {
            log::debug!("No frame buffer available");
        }
        fb.map(|fb| CameraFrame { fb })
    }
}
