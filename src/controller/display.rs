//! # Controller Output Reports
//!
//! Builds the bytes written back to USB controllers on every poll: the
//! Type II door lamp and the Shinkansen speedometer/ATC display.
//!
//! ## Shinkansen Display Layout
//!
//! | Byte | Contents |
//! |------|----------|
//! | 2 | 128 × door lamp + limit approach bar (0..=10) |
//! | 3 | speed gauge, `ceil(speed / 15)` |
//! | 4 | speed tens (high nibble) and units (low nibble) |
//! | 5 | speed hundreds |
//! | 6 | limit tens (high nibble) and units (low nibble) |
//! | 7 | limit hundreds |
//!
//! Bytes 4..=7 set to `0xFF` blank their digits.

/// Train state the host feeds to the controller displays.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainStatus {
    /// A train is loaded and running
    pub in_game: bool,
    pub doors_closed: bool,
    /// Current speed in km/h
    pub speed_kmh: f64,
    /// Current signal or route limit in km/h
    pub speed_limit_kmh: Option<f64>,
    /// The train is inside an ATC-controlled section
    pub atc_section: bool,
}

/// Type II output before a train is loaded.
pub const TYPE2_IDLE: [u8; 2] = [0x00, 0x03];

/// Shinkansen output with every digit blanked.
pub const SHINKANSEN_BLANK: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];

/// Width of the limit approach bar in km/h
const APPROACH_RANGE: i64 = 10;

fn digits(value: i64) -> (u8, u8, u8) {
    let value = value.clamp(0, 999);
    ((value % 10) as u8, (value % 100 / 10) as u8, (value / 100) as u8)
}

/// Approach bar length: full at or above the limit, growing over the
/// last 10 km/h below it.
#[must_use]
pub fn limit_approach(speed: i64, limit: i64) -> u8 {
    if speed >= limit {
        APPROACH_RANGE as u8
    } else if speed > limit - APPROACH_RANGE {
        (speed - limit + APPROACH_RANGE) as u8
    } else {
        0
    }
}

/// Type II door lamp report.
///
/// # Examples
///
/// ```
/// use dengo_bridge::controller::display::{type2_output, TrainStatus};
///
/// let status = TrainStatus { in_game: true, doors_closed: true, ..Default::default() };
/// assert_eq!(type2_output(&status), vec![0x00, 0x01]);
/// ```
#[must_use]
pub fn type2_output(status: &TrainStatus) -> Vec<u8> {
    let mut report = TYPE2_IDLE.to_vec();
    if status.in_game {
        report[1] = u8::from(status.doors_closed);
    }
    report
}

/// Shinkansen speedometer and ATC display report.
#[must_use]
pub fn shinkansen_output(status: &TrainStatus) -> Vec<u8> {
    let mut report = SHINKANSEN_BLANK.to_vec();
    if !status.in_game {
        return report;
    }

    let lamp = if status.doors_closed { 128u8 } else { 0 };
    let speed = status.speed_kmh.abs().round() as i64;
    let (s1, s2, s3) = digits(speed);

    match status.speed_limit_kmh.filter(|l| *l >= 0.0 && status.atc_section) {
        Some(limit) => {
            let limit = limit.round() as i64;
            let (l1, l2, l3) = digits(limit);
            report[2] = lamp + limit_approach(speed, limit);
            report[6] = 16 * l2 + l1;
            report[7] = l3;
        }
        None => report[2] = lamp,
    }

    report[3] = (speed as f64 / 15.0).ceil().min(f64::from(u8::MAX)) as u8;
    report[4] = 16 * s2 + s1;
    report[5] = s3;
    report
}
