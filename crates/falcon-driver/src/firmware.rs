//! Firmware bring-up.

use falcon_hardware::{DeviceConnection, FalconDevice, FirmwareImage, FirmwareStatus};
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::error::FirmwareError;

/// Proof that firmware was confirmed running on a connection.
///
/// Only [`FirmwareLoader::ensure_firmware`] creates one, and homing requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareReady {
    attempts: u32,
}

impl FirmwareReady {
    /// Upload attempts spent; zero when firmware was already running.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Uploads firmware with a bounded number of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareLoader {
    max_attempts: u32,
    skip_checksum: bool,
}

impl FirmwareLoader {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            skip_checksum: false,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.firmware_attempts).with_skip_checksum(config.skip_checksum)
    }

    #[must_use]
    pub fn with_skip_checksum(mut self, skip: bool) -> Self {
        self.skip_checksum = skip;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Make sure firmware is running on `conn`, uploading `image` if needed.
    ///
    /// Succeeds without uploading when the device already reports firmware.
    ///
    /// # Errors
    ///
    /// - [`FirmwareError::NoImage`] if an upload is needed and `image` is
    ///   missing or empty. No attempt is made.
    /// - [`FirmwareError::LoadFailed`] once every attempt has been rejected.
    /// - [`FirmwareError::NotConfirmed`] if an upload is accepted but the
    ///   device still reports no firmware.
    /// - [`FirmwareError::Hardware`] for a closed connection or transport failure.
    pub async fn ensure_firmware<D: FalconDevice>(
        &self,
        conn: &mut DeviceConnection<D>,
        image: Option<&FirmwareImage>,
    ) -> Result<FirmwareReady, FirmwareError> {
        if conn.refresh_firmware_status().await? == FirmwareStatus::Loaded {
            info!(index = %conn.index(), "Firmware already loaded");
            return Ok(FirmwareReady { attempts: 0 });
        }

        let image = match image {
            Some(image) if !image.is_empty() => image,
            _ => return Err(FirmwareError::NoImage),
        };

        info!(index = %conn.index(), bytes = image.len(), "Loading firmware");
        for attempt in 1..=self.max_attempts {
            match conn.upload_firmware(image, self.skip_checksum).await {
                Ok(()) => {
                    if conn.refresh_firmware_status().await? != FirmwareStatus::Loaded {
                        return Err(FirmwareError::NotConfirmed);
                    }
                    info!(attempt, "Firmware loaded");
                    return Ok(FirmwareReady { attempts: attempt });
                }
                Err(e) if e.is_closed() => return Err(e.into()),
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "Firmware loading try failed");
                }
            }
        }

        Err(FirmwareError::LoadFailed {
            attempts: self.max_attempts,
        })
    }
}

impl Default for FirmwareLoader {
    fn default() -> Self {
        Self::new(falcon_core::constants::FIRMWARE_LOAD_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falcon_core::DeviceIndex;
    use falcon_hardware::mock::{MockFalcon, MockFalconHandle, SIMULATOR_FIRMWARE};
    use rstest::rstest;

    async fn open_mock() -> (DeviceConnection<MockFalcon>, MockFalconHandle) {
        let (falcon, handle) = MockFalcon::new();
        let conn = DeviceConnection::open(falcon, DeviceIndex::new(0))
            .await
            .unwrap();
        (conn, handle)
    }

    fn image() -> FirmwareImage {
        FirmwareImage::from_static(SIMULATOR_FIRMWARE)
    }

    #[tokio::test]
    async fn test_uploads_once_when_link_is_clean() {
        let (mut conn, handle) = open_mock().await;
        let ready = FirmwareLoader::default()
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap();

        assert_eq!(ready.attempts(), 1);
        assert_eq!(handle.upload_attempts(), 1);
        assert_eq!(conn.firmware_status(), FirmwareStatus::Loaded);
        conn.close().await.unwrap();
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    #[tokio::test]
    async fn test_checksum_flag_reaches_upload(#[case] skip: bool) {
        let config = DriverConfig::builder().skip_checksum(skip).build().unwrap();
        let (mut conn, handle) = open_mock().await;

        FirmwareLoader::from_config(&config)
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap();

        assert_eq!(handle.last_skip_checksum(), Some(skip));
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let (mut conn, handle) = open_mock().await;
        handle.fail_uploads(4);

        let ready = FirmwareLoader::default()
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap();
        assert_eq!(ready.attempts(), 5);
        assert_eq!(handle.upload_attempts(), 5);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_bound() {
        let (mut conn, handle) = open_mock().await;
        handle.fail_uploads(u32::MAX);

        let err = FirmwareLoader::new(3)
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap_err();
        assert!(matches!(err, FirmwareError::LoadFailed { attempts: 3 }));
        assert_eq!(handle.upload_attempts(), 3);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_image_spends_no_attempts() {
        let (mut conn, handle) = open_mock().await;

        let err = FirmwareLoader::default()
            .ensure_firmware(&mut conn, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FirmwareError::NoImage));

        let empty = FirmwareImage::new(Vec::new());
        let err = FirmwareLoader::default()
            .ensure_firmware(&mut conn, Some(&empty))
            .await
            .unwrap_err();
        assert!(matches!(err, FirmwareError::NoImage));
        assert_eq!(handle.upload_attempts(), 0);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_loaded_device_needs_no_image() {
        let (mut conn, handle) = open_mock().await;
        handle.set_firmware_loaded(true);

        let ready = FirmwareLoader::default()
            .ensure_firmware(&mut conn, None)
            .await
            .unwrap();
        assert_eq!(ready.attempts(), 0);
        assert_eq!(handle.upload_attempts(), 0);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfirmed_upload() {
        let (mut conn, handle) = open_mock().await;
        handle.set_confirm_upload(false);

        let err = FirmwareLoader::default()
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap_err();
        assert!(matches!(err, FirmwareError::NotConfirmed));
        assert_eq!(handle.upload_attempts(), 1);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (mut conn, handle) = open_mock().await;
        conn.close().await.unwrap();

        let err = FirmwareLoader::default()
            .ensure_firmware(&mut conn, Some(&image()))
            .await
            .unwrap_err();
        assert!(matches!(err, FirmwareError::Hardware(e) if e.is_closed()));
        assert_eq!(handle.upload_attempts(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = DriverConfig::builder()
            .firmware_attempts(7)
            .skip_checksum(true)
            .build()
            .unwrap();
        let loader = FirmwareLoader::from_config(&config);
        assert_eq!(loader.max_attempts(), 7);
        assert_eq!(loader, FirmwareLoader::new(7).with_skip_checksum(true));
    }
}
