//! Static camera model descriptors, looked up by USB vendor/product id at
//! hotplug time. Unmatched devices are ignored by the lifecycle manager.

bitflags::bitflags! {
    /// Per-model capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModelFlags: u32 {
        /// Camera supports live preview streaming.
        const LIVE_VIEW = 1 << 0;
    }
}

/// Immutable descriptor of one supported camera model.
#[derive(Debug, Clone, Copy)]
pub struct CameraModel {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
    pub flags: ModelFlags,
    /// Sensor width/height in pixels.
    pub width: u32,
    pub height: u32,
    /// Pixel size in micrometers.
    pub pixel_size: f32,
}

impl CameraModel {
    /// Bitwise live-view flag test. The driver this reimplements tested the
    /// flag with a logical AND, which was true for any non-zero flags word;
    /// the corrected mask test is intentional here.
    pub fn live_view(&self) -> bool {
        self.flags.contains(ModelFlags::LIVE_VIEW)
    }
}

pub const CANON_VID: u16 = 0x04A9;
pub const NIKON_VID: u16 = 0x04B0;
pub const SONY_VID: u16 = 0x054C;

const LV: ModelFlags = ModelFlags::LIVE_VIEW;
const NONE: ModelFlags = ModelFlags::empty();

/// Supported models. At most one entry per (vendor, product) pair.
pub static CAMERA_MODELS: &[CameraModel] = &[
    m(CANON_VID, 0x3110, "Canon EOS 400D", NONE, 3888, 2592, 5.7),
    m(CANON_VID, 0x3113, "Canon EOS 30D", NONE, 3520, 2344, 6.4),
    m(CANON_VID, 0x3145, "Canon EOS 450D", LV, 4272, 2848, 5.19),
    m(CANON_VID, 0x3146, "Canon EOS 40D", LV, 3888, 2592, 5.7),
    m(CANON_VID, 0x3199, "Canon EOS 5DM2", LV, 5616, 3744, 6.41),
    m(CANON_VID, 0x319a, "Canon EOS 7D", LV, 5184, 3456, 4.3),
    m(CANON_VID, 0x3218, "Canon EOS 600D", LV, 5184, 3456, 4.3),
    m(CANON_VID, 0x3250, "Canon EOS 6D", LV, 5472, 3648, 6.54),
    m(CANON_VID, 0x3281, "Canon EOS 5DM4", LV, 6720, 4480, 5.25),
    m(CANON_VID, 0x3294, "Canon EOS 80D", LV, 6000, 4000, 3.71),
    m(CANON_VID, 0x32d2, "Canon EOS M50", LV, 6000, 4000, 3.71),
    m(CANON_VID, 0x32da, "Canon EOS R", LV, 6720, 4480, 5.25),
    m(NIKON_VID, 0x0410, "Nikon D200", NONE, 3872, 2592, 6.09),
    m(NIKON_VID, 0x0421, "Nikon D90", LV, 4288, 2848, 5.5),
    m(NIKON_VID, 0x0424, "Nikon D3000", NONE, 3872, 2592, 6.09),
    m(NIKON_VID, 0x0428, "Nikon D7000", LV, 4928, 3264, 4.78),
    m(NIKON_VID, 0x042a, "Nikon D800", LV, 7360, 4912, 4.88),
    m(NIKON_VID, 0x0436, "Nikon D810", LV, 7360, 4912, 4.88),
    m(NIKON_VID, 0x0441, "Nikon D850", LV, 8256, 5504, 4.34),
    m(NIKON_VID, 0x0442, "Nikon Z7", LV, 8256, 5504, 4.34),
    m(NIKON_VID, 0x0443, "Nikon Z6", LV, 6048, 4024, 5.9),
    m(SONY_VID, 0x079c, "Sony Alpha A6300", LV, 6000, 4000, 3.92),
    m(SONY_VID, 0x07c6, "Sony Alpha A5000", NONE, 5456, 3632, 4.25),
    m(SONY_VID, 0x094e, "Sony Alpha A6000", LV, 6000, 4000, 3.92),
    m(SONY_VID, 0x096f, "Sony Alpha A7III", LV, 6000, 4000, 5.98),
    m(SONY_VID, 0x0a6b, "Sony Alpha A7RII", LV, 7974, 5316, 4.5),
    m(SONY_VID, 0x0c2a, "Sony Alpha A9", LV, 6000, 4000, 5.98),
    // Generic PTP devices without a vendor extension.
    m(0x045E, 0x0A00, "Microsoft Lumia 950", NONE, 5344, 3008, 1.12),
    m(0x05AC, 0x12A8, "Apple iPhone", NONE, 4032, 3024, 1.22),
];

const fn m(
    vendor_id: u16,
    product_id: u16,
    name: &'static str,
    flags: ModelFlags,
    width: u32,
    height: u32,
    pixel_size: f32,
) -> CameraModel {
    CameraModel {
        vendor_id,
        product_id,
        name,
        flags,
        width,
        height,
        pixel_size,
    }
}

/// Find the model descriptor for a USB id pair, if any.
pub fn lookup(vendor_id: u16, product_id: u16) -> Option<&'static CameraModel> {
    CAMERA_MODELS
        .iter()
        .find(|m| m.vendor_id == vendor_id && m.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup(CANON_VID, 0x3145).map(|m| m.name), Some("Canon EOS 450D"));
        assert!(lookup(0x1234, 0x5678).is_none());
        // Known vendor, unknown product is still unmatched.
        assert!(lookup(CANON_VID, 0xFFFF).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut seen = HashSet::new();
        for model in CAMERA_MODELS {
            assert!(
                seen.insert((model.vendor_id, model.product_id)),
                "duplicate id for {}",
                model.name
            );
        }
    }

    #[test]
    fn test_table_includes_generic_vendor_fallback() {
        use crate::vendor::Vendor;
        // Devices without a vendor extension keep the fallback path live.
        assert!(CAMERA_MODELS
            .iter()
            .any(|m| Vendor::from_vid(m.vendor_id) == Vendor::GenericPtp));
        let phone = lookup(0x05AC, 0x12A8).unwrap();
        assert_eq!(Vendor::from_vid(phone.vendor_id), Vendor::GenericPtp);
        assert!(!phone.live_view());
    }

    #[test]
    fn test_live_view_is_a_mask_test() {
        // EOS 400D has no flags at all, EOS 450D carries the live-view bit.
        assert!(!lookup(CANON_VID, 0x3110).unwrap().live_view());
        assert!(lookup(CANON_VID, 0x3145).unwrap().live_view());
    }
}
