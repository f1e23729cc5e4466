//! Li-ion state-of-charge estimation from the supply voltage

/// Voltage divider between the cell and the ADC pin.
pub const VOLTAGE_DIVIDER_RATIO: f32 = 2.0;

/// Number of ADC reads averaged per voltage measurement.
pub const BATTERY_ADC_SAMPLES: usize = 8;

/// Discharge curve: (volts, percent), highest voltage first.
const DISCHARGE_CURVE: [(f32, u8); 9] = [
    (4.20, 100),
    (4.10, 90),
    (4.00, 80),
    (3.90, 70),
    (3.80, 60),
    (3.70, 50),
    (3.60, 15),
    (3.50, 5),
    (3.00, 0),
];

/// Map a cell voltage onto 0..=100 % by linear interpolation on the curve.
///
/// The interpolated value is truncated, so 3.65 V lands on 32 %.
pub fn battery_percentage(volts: f32) -> u8 {
    let (top_v, _) = DISCHARGE_CURVE[0];
    let (bottom_v, _) = DISCHARGE_CURVE[DISCHARGE_CURVE.len() - 1];

    if volts >= top_v {
        return 100;
    }
    if volts <= bottom_v {
        return 0;
    }

    for pair in DISCHARGE_CURVE.windows(2) {
        let (hi_v, hi_p) = pair[0];
        let (lo_v, lo_p) = pair[1];
        if volts <= hi_v && volts > lo_v {
            let factor = (volts - lo_v) / (hi_v - lo_v);
            let span = (hi_p - lo_p) as f32;
            return lo_p + (factor * span) as u8;
        }
    }

    0
}

/// Convert a batch of ADC millivolt reads into the cell voltage.
///
/// Returns `None` when no reads were taken.
pub fn cell_voltage(adc_millivolts: &[u32]) -> Option<f32> {
    if adc_millivolts.is_empty() {
        return None;
    }
    let sum: u64 = adc_millivolts.iter().map(|&mv| mv as u64).sum();
    let mean_mv = sum as f32 / adc_millivolts.len() as f32;
    Some(mean_mv * VOLTAGE_DIVIDER_RATIO / 1000.0)
}
