use generic::pump_error::ConfigError;
use generic::pump_proto::MotorDirection;

use crate::timer::PumpDuration;

/// Bore of the syringe the flow table was measured with.
pub const REFERENCE_DIAMETER_MM: f32 = 14.5;

/// Longest run a volume/rate pair may ask for, about eleven days.
const MAX_RUN_MS: f32 = 1.0e9;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowUnit {
    Percent,
    MicrolitersPerSecond,
    MicrolitersPerMinute,
    MillilitersPerMinute,
}

impl FlowUnit {
    pub const ALL: [FlowUnit; 4] = [
        FlowUnit::Percent,
        FlowUnit::MicrolitersPerSecond,
        FlowUnit::MicrolitersPerMinute,
        FlowUnit::MillilitersPerMinute,
    ];

    pub fn code(self) -> u8 {
        match self {
            FlowUnit::Percent => 0,
            FlowUnit::MicrolitersPerSecond => 1,
            FlowUnit::MicrolitersPerMinute => 2,
            FlowUnit::MillilitersPerMinute => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        FlowUnit::ALL.get(code as usize).copied().ok_or(ConfigError::UnknownFlowUnit)
    }

    pub fn label(self) -> &'static str {
        match self {
            FlowUnit::Percent => "%",
            FlowUnit::MicrolitersPerSecond => "ul/s",
            FlowUnit::MicrolitersPerMinute => "ul/min",
            FlowUnit::MillilitersPerMinute => "ml/min",
        }
    }

    /// Unit the target volume is entered in.
    pub fn volume_label(self) -> &'static str {
        match self {
            FlowUnit::Percent => "-",
            FlowUnit::MicrolitersPerSecond | FlowUnit::MicrolitersPerMinute => "ul",
            FlowUnit::MillilitersPerMinute => "ml",
        }
    }

    /// Milliseconds in the time unit of the rate, `None` for percent.
    pub fn period_ms(self) -> Option<f32> {
        match self {
            FlowUnit::Percent => None,
            FlowUnit::MicrolitersPerSecond => Some(1_000.0),
            FlowUnit::MicrolitersPerMinute | FlowUnit::MillilitersPerMinute => Some(60_000.0),
        }
    }

    pub fn next(self) -> Self {
        FlowUnit::ALL[(self.code() as usize + 1) % FlowUnit::ALL.len()]
    }

    pub fn prev(self) -> Self {
        FlowUnit::ALL[(self.code() as usize + FlowUnit::ALL.len() - 1) % FlowUnit::ALL.len()]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpDirection {
    Infuse,
    Withdraw,
}

impl PumpDirection {
    pub fn code(self) -> u8 {
        match self {
            PumpDirection::Infuse => 0,
            PumpDirection::Withdraw => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        match code {
            0 => Ok(PumpDirection::Infuse),
            1 => Ok(PumpDirection::Withdraw),
            _ => Err(ConfigError::UnknownDirection),
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            PumpDirection::Infuse => PumpDirection::Withdraw,
            PumpDirection::Withdraw => PumpDirection::Infuse,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PumpDirection::Infuse => "Infuse",
            PumpDirection::Withdraw => "Withdraw",
        }
    }

    pub fn motor_direction(self) -> MotorDirection {
        match self {
            PumpDirection::Infuse => MotorDirection::Forward,
            PumpDirection::Withdraw => MotorDirection::Backward,
        }
    }
}

/// Plunger speed at a given flow scales with the inverse of the bore area,
/// so the reference-syringe flow equivalent is `(Dref / d)^2` times the flow.
pub fn diameter_scale(diameter_mm: f32) -> f32 {
    let ratio = REFERENCE_DIAMETER_MM / diameter_mm;
    ratio * ratio
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    rate: f32,
    diameter_mm: f32,
    diameter_scale: f32,
    flow_unit: FlowUnit,
    direction: PumpDirection,
    target_volume_hundredths: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            rate: 1.0,
            diameter_mm: REFERENCE_DIAMETER_MM,
            diameter_scale: 1.0,
            flow_unit: FlowUnit::MillilitersPerMinute,
            direction: PumpDirection::Infuse,
            target_volume_hundredths: 100,
        }
    }
}

impl Calibration {
    pub fn new(
        rate: f32,
        diameter_mm: f32,
        flow_unit: FlowUnit,
        direction: PumpDirection,
        target_volume_hundredths: u32,
    ) -> Result<Self, ConfigError> {
        let mut calibration = Calibration { flow_unit, direction, target_volume_hundredths, ..Default::default() };
        calibration.set_rate(rate)?;
        calibration.set_diameter(diameter_mm)?;
        Ok(calibration)
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn diameter_mm(&self) -> f32 {
        self.diameter_mm
    }

    pub fn diameter_scale(&self) -> f32 {
        self.diameter_scale
    }

    pub fn flow_unit(&self) -> FlowUnit {
        self.flow_unit
    }

    pub fn direction(&self) -> PumpDirection {
        self.direction
    }

    pub fn target_volume_hundredths(&self) -> u32 {
        self.target_volume_hundredths
    }

    pub fn target_volume(&self) -> f32 {
        self.target_volume_hundredths as f32 / 100.0
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<(), ConfigError> {
        if !positive(rate) {
            return Err(ConfigError::NonPositiveRate);
        }
        self.rate = rate;
        Ok(())
    }

    pub fn set_diameter(&mut self, diameter_mm: f32) -> Result<(), ConfigError> {
        if !positive(diameter_mm) {
            return Err(ConfigError::NonPositiveDiameter);
        }
        self.diameter_mm = diameter_mm;
        self.diameter_scale = diameter_scale(diameter_mm);
        Ok(())
    }

    pub fn set_flow_unit(&mut self, flow_unit: FlowUnit) {
        self.flow_unit = flow_unit;
    }

    pub fn set_direction(&mut self, direction: PumpDirection) {
        self.direction = direction;
    }

    pub fn set_target_volume_hundredths(&mut self, hundredths: u32) {
        self.target_volume_hundredths = hundredths;
    }

    /// Volume in the unit of `volume_label`, stored rounded to hundredths.
    pub fn set_target_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(ConfigError::VolumeOutOfRange);
        }
        let hundredths = volume * 100.0 + 0.5;
        if hundredths >= u32::MAX as f32 {
            return Err(ConfigError::VolumeOutOfRange);
        }
        self.target_volume_hundredths = hundredths as u32;
        Ok(())
    }

    /// How long the configured volume takes at the configured rate.
    pub fn target_duration(&self) -> Result<PumpDuration, ConfigError> {
        let period_ms = self.flow_unit.period_ms().ok_or(ConfigError::PercentRateNotTimed)?;
        if self.target_volume_hundredths == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        let ms = self.target_volume() / self.rate * period_ms + 0.5;
        if !ms.is_finite() || ms > MAX_RUN_MS {
            return Err(ConfigError::DurationOverflow);
        }
        if ms < 1.0 {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(PumpDuration::from_ticks(ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diameter_scale_follows_bore_area() {
        assert_eq!(diameter_scale(REFERENCE_DIAMETER_MM), 1.0);
        assert!((diameter_scale(REFERENCE_DIAMETER_MM * 2.0) - 0.25).abs() < 1e-6);
        assert!((diameter_scale(REFERENCE_DIAMETER_MM / 2.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_recomputed_with_diameter() {
        let mut calibration = Calibration::default();
        calibration.set_diameter(29.0).unwrap();
        assert!((calibration.diameter_scale() - 0.25).abs() < 1e-6);
        assert_eq!(calibration.set_diameter(0.0), Err(ConfigError::NonPositiveDiameter));
        assert_eq!(calibration.set_diameter(f32::NAN), Err(ConfigError::NonPositiveDiameter));
        // rejected values leave the previous diameter and its scale in place
        assert_eq!(calibration.diameter_mm(), 29.0);
        assert!((calibration.diameter_scale() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_rate_validation() {
        let mut calibration = Calibration::default();
        assert_eq!(calibration.set_rate(-1.0), Err(ConfigError::NonPositiveRate));
        assert_eq!(calibration.set_rate(0.0), Err(ConfigError::NonPositiveRate));
        assert_eq!(calibration.set_rate(f32::INFINITY), Err(ConfigError::NonPositiveRate));
        assert_eq!(calibration.rate(), 1.0);
        assert!(Calibration::new(0.0, 10.0, FlowUnit::Percent, PumpDirection::Infuse, 0).is_err());
    }

    #[test]
    fn test_target_duration_per_unit() {
        // 2.50 ml at 0.5 ml/min is five minutes
        let c = Calibration::new(0.5, 14.5, FlowUnit::MillilitersPerMinute, PumpDirection::Infuse, 250).unwrap();
        assert_eq!(c.target_duration().unwrap().ticks(), 300_000);

        // 10 ul at 2 ul/s is five seconds
        let c = Calibration::new(2.0, 14.5, FlowUnit::MicrolitersPerSecond, PumpDirection::Infuse, 1_000).unwrap();
        assert_eq!(c.target_duration().unwrap().ticks(), 5_000);

        // 30 ul at 60 ul/min is thirty seconds
        let c = Calibration::new(60.0, 14.5, FlowUnit::MicrolitersPerMinute, PumpDirection::Withdraw, 3_000).unwrap();
        assert_eq!(c.target_duration().unwrap().ticks(), 30_000);
    }

    #[test]
    fn test_target_duration_errors() {
        let c = Calibration::new(50.0, 14.5, FlowUnit::Percent, PumpDirection::Infuse, 100).unwrap();
        assert_eq!(c.target_duration(), Err(ConfigError::PercentRateNotTimed));

        let c = Calibration::new(1.0, 14.5, FlowUnit::MillilitersPerMinute, PumpDirection::Infuse, 0).unwrap();
        assert_eq!(c.target_duration(), Err(ConfigError::ZeroDuration));

        let c = Calibration::new(0.0001, 14.5, FlowUnit::MillilitersPerMinute, PumpDirection::Infuse, 1_000_000).unwrap();
        assert_eq!(c.target_duration(), Err(ConfigError::DurationOverflow));
    }

    #[test]
    fn test_volume_rounding() {
        let mut c = Calibration::default();
        c.set_target_volume(1.234).unwrap();
        assert_eq!(c.target_volume_hundredths(), 123);
        c.set_target_volume(0.256).unwrap();
        assert_eq!(c.target_volume_hundredths(), 26);
        assert_eq!(c.set_target_volume(-1.0), Err(ConfigError::VolumeOutOfRange));
        assert_eq!(c.target_volume_hundredths(), 26);
    }

    #[test]
    fn test_unit_cycle() {
        let mut unit = FlowUnit::Percent;
        for _ in 0..FlowUnit::ALL.len() {
            unit = unit.next();
        }
        assert_eq!(unit, FlowUnit::Percent);
        assert_eq!(FlowUnit::Percent.prev(), FlowUnit::MillilitersPerMinute);
        assert_eq!(FlowUnit::from_code(9), Err(ConfigError::UnknownFlowUnit));
    }
}
