//! # ESC/POS Control Codes
//!
//! Byte builders for the control codes cajero sends to WinPOS-style receipt
//! printers. Only the commands used by the sample invoice and the filler pulse
//! are implemented.
//!
//! ## Escape Sequence Structure
//!
//! - Two bytes: `ESC @`, `ESC m`
//! - Three bytes with one parameter: `ESC a n`, `ESC J n`, `GS ! n`
//! - Five bytes: `GS BEL m t1 t2`
//!
//! Some sequences are vendor extensions with no public documentation; those
//! are kept as opaque constants and sent verbatim.

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// BEL - Suffix byte of the `GS BEL` peripheral pulse
pub const BEL: u8 = 0x07;

/// CR LF line terminator used by the printer's text mode
pub const CRLF: &str = "\r\n";

/// Vendor mode-select sequence sent right after initialization.
pub const VENDOR_MODE: [u8; 2] = [ESC, 0x02];

/// The 5-byte pulse transmitted once per step of a timed filler job.
pub const FILLER_PULSE: [u8; 5] = [GS, BEL, 1, 1, 1];

// ============================================================================
// INITIALIZATION
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// | Hex | 1B 40 |
/// |-----|-------|
///
/// Clears the print buffer and resets text formatting, size and alignment.
///
/// ```
/// use cajero::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Automatic Status Back (GS a n)
///
/// Enables the status reports the driver surfaces as uninterested messages.
/// `0xFF` enables every status bit.
#[inline]
pub fn status_back(mask: u8) -> Vec<u8> {
    vec![GS, b'a', mask]
}

// ============================================================================
// TEXT LAYOUT
// ============================================================================

/// Justification for `ESC a n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left = 0,
    Center = 1,
    Right = 2,
}

/// # Select Justification (ESC a n)
#[inline]
pub fn justify(j: Justify) -> Vec<u8> {
    vec![ESC, b'a', j as u8]
}

/// # Character Size (GS ! n)
///
/// High nibble is the width multiplier minus one, low nibble the height
/// multiplier minus one. Both are clamped to 1..=8.
///
/// ```
/// use cajero::protocol::commands;
///
/// assert_eq!(commands::char_size(1, 1), vec![0x1D, 0x21, 0x00]);
/// assert_eq!(commands::char_size(2, 2), vec![0x1D, 0x21, 0x11]);
/// assert_eq!(commands::char_size(5, 5), vec![0x1D, 0x21, 0x44]);
/// ```
#[inline]
pub fn char_size(width: u8, height: u8) -> Vec<u8> {
    let w = width.clamp(1, 8) - 1;
    let h = height.clamp(1, 8) - 1;
    vec![GS, b'!', (w << 4) | h]
}

/// # Print and Feed (ESC J n)
///
/// Prints the line buffer and feeds `dots` vertical motion units.
#[inline]
pub fn feed_dots(dots: u8) -> Vec<u8> {
    vec![ESC, b'J', dots]
}

// ============================================================================
// PAPER AND PERIPHERALS
// ============================================================================

/// # Partial Cut (ESC m)
#[inline]
pub fn cut_partial() -> Vec<u8> {
    vec![ESC, b'm']
}

/// # Peripheral Pulse (GS BEL m t1 t2)
///
/// Fires the drawer-kick / buzzer output `m` times with on-time `t1` and
/// off-time `t2` (in firmware units).
#[inline]
pub fn pulse(m: u8, t1: u8, t2: u8) -> Vec<u8> {
    vec![GS, BEL, m, t1, t2]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_justify_center() {
        assert_eq!(justify(Justify::Center), vec![0x1B, 0x61, 0x01]);
    }

    #[test]
    fn test_char_size_clamps() {
        assert_eq!(char_size(0, 0), vec![0x1D, 0x21, 0x00]);
        assert_eq!(char_size(9, 9), vec![0x1D, 0x21, 0x77]);
    }

    #[test]
    fn test_filler_pulse_matches_builder() {
        assert_eq!(pulse(1, 1, 1), FILLER_PULSE.to_vec());
    }

    #[test]
    fn test_cut_and_feed() {
        assert_eq!(cut_partial(), vec![0x1B, b'm']);
        assert_eq!(feed_dots(160), vec![0x1B, 0x4A, 160]);
    }
}
