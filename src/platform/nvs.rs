use esp_idf_svc::nvs::{EspDefaultNvs, EspDefaultNvsPartition};

use crate::credential::{CredentialStore, NetworkCredential, StoreError, StoredRecord};

pub const NAMESPACE: &str = "camlink";
const WIFI_KEY: &str = "wifi";
/// Fits a record whose every field byte was JSON-escaped to `\u00XX`.
const RECORD_BUF_LEN: usize = 640;

/// Credential record kept as one JSON string under `camlink/wifi`.
pub struct NvsCredentialStore {
    nvs: EspDefaultNvs,
}

impl NvsCredentialStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspDefaultNvs::new(partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl CredentialStore for NvsCredentialStore {
    fn load(&self) -> Option<NetworkCredential> {
        let mut str_buf = [0; RECORD_BUF_LEN];
        let raw = self
            .nvs
            .get_str(WIFI_KEY, &mut str_buf)
            .map_err(|e| log::error!("Failed to get {}: {:?}", WIFI_KEY, e))
            .ok()
            .flatten()?;
        StoredRecord::decode(raw)
    }

    fn save(&mut self, credential: &NetworkCredential) -> Result<(), StoreError> {
        let raw = StoredRecord::encode(credential)?;
        // set_str commits before returning
        self.nvs
            .set_str(WIFI_KEY, &raw)
            .map_err(|e| StoreError::Write(format!("{:?}", e)))
    }
}
