use crate::vendor::Capability;

/// Errors that can occur while talking to a PTP camera.
#[derive(Debug, thiserror::Error)]
pub enum PtpError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("PTP response 0x{0:04x}")]
    Response(u16),

    #[error("no PTP session open")]
    NoSession,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device slot pool full")]
    PoolFull,

    #[error("capability {0:?} is not bound for this vendor")]
    CapabilityAbsent(Capability),

    #[error("device already claimed by another driver instance")]
    AlreadyClaimed,

    #[error("operation aborted")]
    Aborted,

    #[error("timeout waiting for camera")]
    Timeout,

    #[error("device worker gone")]
    ChannelDisconnected,
}

impl PtpError {
    /// The PTP response code carried by a protocol-level failure, if any.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            PtpError::Response(code) => Some(*code),
            _ => None,
        }
    }
}
