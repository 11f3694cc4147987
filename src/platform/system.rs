use std::time::Duration;

use crate::context::System;

pub struct EspSystem;

impl System for EspSystem {
    fn restart_after(&self, delay: Duration) {
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            unsafe { esp_idf_svc::sys::esp_restart() }
        });
    }

    fn log_heap(&self) {
        log_heap();
    }
}

pub fn log_heap() {
    unsafe {
        use esp_idf_svc::sys::{heap_caps_get_free_size, MALLOC_CAP_INTERNAL, MALLOC_CAP_SPIRAM};

        log::info!(
            "Free SPIRAM heap size: {}KB",
            heap_caps_get_free_size(MALLOC_CAP_SPIRAM) / 1024
        );
        log::info!(
            "Free INTERNAL heap size: {}KB",
            heap_caps_get_free_size(MALLOC_CAP_INTERNAL) / 1024
        );
    }
}
