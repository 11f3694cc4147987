#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use camlink::{
        boards,
        bootstrap::{Bootstrap, BootstrapConfig},
        context::AppContext,
        control::NetworkStatus,
        stream::StreamConfig,
        platform::{self, httpd, Camera, EspNetworkStatus, EspRadio, EspSystem, NvsCredentialStore},
    };
    use esp_idf_svc::eventloop::EspSystemEventLoop;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;

    let store = NvsCredentialStore::new(partition.clone())?;

    platform::log_heap();

    // 摄像头失败不影响联网和控制接口，只是 /stream 不可用
    let camera = Camera::init(&boards::CAMERA_PINS)
        .map_err(|e| log::error!("Camera init failed, streaming disabled: {:?}", e))
        .ok();

    let mut radio = EspRadio::new(peripherals.modem, sysloop.clone(), Some(partition))?;
    let outcome = match Bootstrap::new(BootstrapConfig::default()).run(&store, &mut radio) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Network bootstrap failed: {:?}", e);
            unsafe { esp_idf_svc::sys::esp_restart() }
        }
    };

    let network: EspNetworkStatus = radio.into_status(outcome.mode);
    log::info!(
        "Network mode: {:?}, address: {:?}",
        outcome.mode,
        network.ip_address()
    );

    platform::log_heap();

    let ctx = AppContext::new(
        Box::new(store),
        camera,
        Box::new(network),
        outcome.mode,
        Box::new(EspSystem),
    )
    .with_stream_config(StreamConfig {
        max_sessions: platform::camera::FB_COUNT,
        ..Default::default()
    });
    let _server = httpd::start(Arc::new(ctx))?;

    loop {
        std::thread::sleep(Duration::from_secs(60));
        platform::log_heap();
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "camlink runs on ESP-IDF targets only, e.g. `cargo build --target xtensa-esp32-espidf`"
    );
}
