//! WiFi 驱动：STA 加入已知网络，或以固定 IP 开启 SoftAP

use std::net::Ipv4Addr;

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4::{self, Mask, Subnet},
    netif::{EspNetif, NetifConfiguration, NetifStack},
    nvs::EspDefaultNvsPartition,
    sys::{esp, esp_wifi_sta_get_ap_info, wifi_ap_record_t},
    wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration as WifiConfig,
        EspWifi, WifiDriver,
    },
};

use crate::bootstrap::{NetworkMode, WifiRadio};
use crate::control::NetworkStatus;
use crate::credential::NetworkCredential;

/// AP 模式的固定 IP 地址
const AP_IP: ipv4::Ipv4Addr = ipv4::Ipv4Addr::new(192, 168, 4, 1);
const AP_GATEWAY: ipv4::Ipv4Addr = ipv4::Ipv4Addr::new(192, 168, 4, 1);
const AP_NETMASK: Mask = Mask(24);

pub struct EspRadio {
    wifi: EspWifi<'static>,
}

impl EspRadio {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        // 配置 AP 网络接口，使用固定 IP 192.168.4.1
        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_GATEWAY,
                    mask: AP_NETMASK,
                },
                dhcp_enabled: true,
                dns: Some(AP_IP),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;

        let driver = WifiDriver::new(modem, sysloop, nvs)?;
        let sta_netif = EspNetif::new(NetifStack::Sta)?;

        let wifi = EspWifi::wrap_all(driver, sta_netif, ap_netif)?;
        Ok(Self { wifi })
    }

    /// Freezes the radio in the mode the bootstrap settled on.
    pub fn into_status(self, mode: NetworkMode) -> EspNetworkStatus {
        EspNetworkStatus {
            wifi: self.wifi,
            mode,
        }
    }
}

impl WifiRadio for EspRadio {
    fn begin_join(&mut self, credential: &NetworkCredential) -> anyhow::Result<()> {
        let config = ClientConfiguration {
            ssid: credential
                .name
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("SSID too long: {:?}", credential.name))?,
            password: credential
                .secret
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Password too long"))?,
            auth_method: if credential.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        self.wifi.set_configuration(&WifiConfig::Client(config))?;
        self.wifi.start()?;
        log::info!("Connecting to {:?}", credential.name);
        self.wifi.connect()?;
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<()> {
        if self.wifi.is_started().unwrap_or(false) {
            if let Err(e) = self.wifi.disconnect() {
                log::debug!("Disconnect before AP start: {:?}", e);
            }
            self.wifi.stop()?;
        }

        let ap_config = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("AP SSID too long: {:?}", ssid))?,
            ssid_hidden: false,
            channel: 1,
            auth_method: AuthMethod::None,
            max_connections: 4,
            ..Default::default()
        };

        self.wifi.set_configuration(&WifiConfig::AccessPoint(ap_config))?;
        self.wifi.start()?;
        log::info!("SoftAP started: {} on {}", ssid, AP_IP);
        Ok(())
    }
}

/// `/status` view of whichever interface this boot brought up.
pub struct EspNetworkStatus {
    wifi: EspWifi<'static>,
    mode: NetworkMode,
}

impl NetworkStatus for EspNetworkStatus {
    fn ip_address(&self) -> Option<Ipv4Addr> {
        let netif = match self.mode {
            NetworkMode::SelfHosted => self.wifi.ap_netif(),
            _ => self.wifi.sta_netif(),
        };
        netif
            .get_ip_info()
            .map_err(|e| log::error!("Failed to get ip info: {:?}", e))
            .ok()
            .map(|info| info.ip)
    }

    fn rssi(&self) -> i32 {
        if self.mode == NetworkMode::SelfHosted {
            return 0;
        }
        let mut record = wifi_ap_record_t::default();
        match esp!(unsafe { esp_wifi_sta_get_ap_info(&mut record) }) {
            Ok(()) => record.rssi as i32,
            Err(_) => 0,
        }
    }
}
