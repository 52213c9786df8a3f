//! Fixed sample invoice layout.
//!
//! The invoice reports which device was claimed and how long the claim took:
//!
//! ```text
//!        Current connection to
//!         00:11:62:AA:BB:CC
//!               takes
//!           __412 ms
//! ```

use std::time::Duration;

use crate::protocol::commands::{self, CRLF, Justify, VENDOR_MODE};
use crate::protocol::encoder::Fragment;
use crate::transport::DeviceAddress;

/// Width of the latency field, padded on the left with `_`.
pub const LATENCY_WIDTH: usize = 5;

/// Claim latency as underscore-padded decimal milliseconds.
///
/// Values wider than the field are printed in full.
pub fn format_latency(latency: Duration) -> String {
    format!("{:_>width$}", latency.as_millis(), width = LATENCY_WIDTH)
}

/// Fragments of the sample invoice.
pub fn sample_invoice(device: &DeviceAddress, latency: Duration) -> Vec<Fragment> {
    vec![
        Fragment::Raw(commands::init()),
        Fragment::Raw(commands::status_back(0xFF)),
        Fragment::Raw(VENDOR_MODE.to_vec()),
        Fragment::Raw(commands::justify(Justify::Center)),
        Fragment::Raw(commands::char_size(1, 1)),
        Fragment::Text(format!("Current connection to{}", CRLF)),
        Fragment::Raw(commands::feed_dots(16)),
        Fragment::Raw(commands::char_size(2, 2)),
        Fragment::Text(format!("{}{}", device, CRLF)),
        Fragment::Raw(commands::feed_dots(40)),
        Fragment::Raw(commands::char_size(1, 1)),
        Fragment::Text(format!("takes{}", CRLF)),
        Fragment::Raw(commands::feed_dots(16)),
        Fragment::Raw(commands::char_size(5, 5)),
        Fragment::Text(format_latency(latency)),
        Fragment::Raw(commands::char_size(2, 2)),
        Fragment::Text(format!("ms{}", CRLF)),
        Fragment::Raw(commands::feed_dots(160)),
        Fragment::Raw(commands::cut_partial()),
        Fragment::Raw(commands::pulse(2, 1, 1)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::encode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Duration::from_millis(0)), "____0");
        assert_eq!(format_latency(Duration::from_millis(412)), "__412");
        assert_eq!(format_latency(Duration::from_millis(12345)), "12345");
        assert_eq!(format_latency(Duration::from_millis(123456)), "123456");
    }

    #[test]
    fn test_sample_invoice_bytes() {
        let device = DeviceAddress::from("00:11:62:aa:bb:cc");
        let buf = encode(&sample_invoice(&device, Duration::from_millis(412))).unwrap();

        let mut expected: Vec<u8> = vec![
            0x1B, 0x40, //
            0x1D, 0x61, 0xFF, //
            0x1B, 0x02, //
            0x1B, 0x61, 1, //
            0x1D, 0x21, 0x00,
        ];
        expected.extend(b"Current connection to\r\n");
        expected.extend([0x1B, 0x4A, 16, 0x1D, 0x21, 0x11]);
        expected.extend(b"00:11:62:AA:BB:CC\r\n");
        expected.extend([0x1B, 0x4A, 40, 0x1D, 0x21, 0x00]);
        expected.extend(b"takes\r\n");
        expected.extend([0x1B, 0x4A, 16, 0x1D, 0x21, 0x44]);
        expected.extend(b"__412");
        expected.extend([0x1D, 0x21, 0x11]);
        expected.extend(b"ms\r\n");
        expected.extend([0x1B, 0x4A, 160, 0x1B, b'm', 0x1D, 0x07, 2, 1, 1]);

        assert_eq!(buf.as_bytes(), expected.as_slice());
    }
}
