//! Rate → motor duty and gear suggestion.
//!
//! The pump was measured on the reference syringe at every gear ratio; each
//! gear covers one band of flow where its duty/flow response is close to
//! linear. A requested rate is first converted to the flow it corresponds to
//! on the reference syringe, then looked up in the band table.

use crate::calibration::{Calibration, FlowUnit};

/// Duty kept when the request is slower than the slowest band, the motor
/// stalls below about a quarter of full drive.
pub const SLOW_DUTY_FLOOR: u8 = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GearRatio {
    /// Slower than any calibrated band; use the slowest gear.
    Slowest,
    Ratio(u8),
    /// Faster than any calibrated band; use the fastest gear.
    Fastest,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GearSelection {
    pub duty: u8,
    pub gear: GearRatio,
    /// Reference-syringe flow in ml/min.
    pub normalized_rate: f32,
}

/// One calibrated band `[low, high)` in reference ml/min.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlowRange {
    pub low: f32,
    pub high: f32,
    pub offset: f32,
    pub slope: f32,
    pub gear: u8,
}

impl FlowRange {
    pub fn contains(&self, rate: f32) -> bool {
        self.low <= rate && rate < self.high
    }

    pub fn duty(&self, rate: f32) -> u8 {
        clamp_duty((rate - self.offset) / self.slope * 100.0)
    }
}

#[rustfmt::skip]
pub const FLOW_RANGES: [FlowRange; 10] = [
    FlowRange { low: 0.010, high: 0.020, offset: 0.006_65, slope: 0.005_24, gear: 10 },
    FlowRange { low: 0.020, high: 0.045, offset: 0.011_62, slope: 0.013_09, gear: 9 },
    FlowRange { low: 0.045, high: 0.100, offset: 0.026_57, slope: 0.028_80, gear: 8 },
    FlowRange { low: 0.100, high: 0.220, offset: 0.059_79, slope: 0.062_83, gear: 7 },
    FlowRange { low: 0.220, high: 0.500, offset: 0.126_18, slope: 0.146_60, gear: 6 },
    FlowRange { low: 0.500, high: 1.100, offset: 0.298_95, slope: 0.314_14, gear: 5 },
    FlowRange { low: 1.100, high: 2.500, offset: 0.630_89, slope: 0.732_98, gear: 4 },
    FlowRange { low: 2.500, high: 5.500, offset: 1.494_76, slope: 1.570_68, gear: 3 },
    FlowRange { low: 5.500, high: 12.00, offset: 3.321_99, slope: 3.403_14, gear: 2 },
    FlowRange { low: 12.00, high: 26.00, offset: 7.308_90, slope: 7.329_84, gear: 1 },
];

pub const MIN_CALIBRATED_FLOW: f32 = FLOW_RANGES[0].low;
pub const MAX_CALIBRATED_FLOW: f32 = FLOW_RANGES[FLOW_RANGES.len() - 1].high;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowClass {
    BelowRange,
    InRange(usize),
    AboveRange,
}

fn clamp_duty(duty: f32) -> u8 {
    if duty.is_nan() || duty <= 0.0 {
        0
    } else if duty >= 255.0 {
        255
    } else {
        duty as u8
    }
}

/// Converts a rate to ml/min, then to the flow the reference syringe would
/// need for the same plunger speed. Percent is a share of the fastest band.
pub fn normalize(rate: f32, unit: FlowUnit, diameter_scale: f32) -> f32 {
    let ml_per_min = match unit {
        FlowUnit::Percent => return rate / 100.0 * MAX_CALIBRATED_FLOW,
        FlowUnit::MicrolitersPerSecond => rate * 60.0 / 1_000.0,
        FlowUnit::MicrolitersPerMinute => rate / 1_000.0,
        FlowUnit::MillilitersPerMinute => rate,
    };
    ml_per_min * diameter_scale
}

/// Inverse of `normalize`: a reference flow expressed in the operator's unit.
pub fn denormalize(reference_flow: f32, unit: FlowUnit, diameter_scale: f32) -> f32 {
    if matches!(unit, FlowUnit::Percent) {
        return reference_flow / MAX_CALIBRATED_FLOW * 100.0;
    }
    let ml_per_min = reference_flow / diameter_scale;
    match unit {
        FlowUnit::MicrolitersPerSecond => ml_per_min * 1_000.0 / 60.0,
        FlowUnit::MicrolitersPerMinute => ml_per_min * 1_000.0,
        _ => ml_per_min,
    }
}

pub fn classify(normalized_rate: f32) -> FlowClass {
    if normalized_rate.is_nan() || normalized_rate < MIN_CALIBRATED_FLOW {
        return FlowClass::BelowRange;
    }
    match FLOW_RANGES.iter().position(|r| r.contains(normalized_rate)) {
        Some(i) => FlowClass::InRange(i),
        None => FlowClass::AboveRange,
    }
}

pub fn select_gear(normalized_rate: f32) -> GearSelection {
    let (duty, gear) = match classify(normalized_rate) {
        FlowClass::BelowRange => (SLOW_DUTY_FLOOR, GearRatio::Slowest),
        FlowClass::InRange(i) => {
            let range = &FLOW_RANGES[i];
            (range.duty(normalized_rate), GearRatio::Ratio(range.gear))
        }
        FlowClass::AboveRange => (u8::MAX, GearRatio::Fastest),
    };
    GearSelection { duty, gear, normalized_rate }
}

pub fn map_flow_rate(calibration: &Calibration) -> GearSelection {
    let normalized = normalize(calibration.rate(), calibration.flow_unit(), calibration.diameter_scale());
    let selection = select_gear(normalized);
    debug!(
        "rate {} -> reference {} ml/min, duty {}, gear {:?}",
        calibration.rate(),
        normalized,
        selection.duty,
        selection.gear
    );
    selection
}

/// Fastest flow the pump can deliver with this syringe, in the operator's unit.
pub fn max_achievable_rate(calibration: &Calibration) -> f32 {
    denormalize(MAX_CALIBRATED_FLOW, calibration.flow_unit(), calibration.diameter_scale())
}
