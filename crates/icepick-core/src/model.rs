//! RC charging model
//!
//! The sense front-end measures how long a capacitor takes to charge and to
//! discharge through a known resistor, counted at a fixed sample clock. With
//! the time constant `K` expressed in counts, the sensed voltage is
//!
//! ```text
//! V_chg(t) = Vs * (1 - exp(-t / K))
//! V_dis(t) = Vs * exp(-(full_scale - t) / K)     (t > 0)
//! ```
//!
//! `K` and an additive offset per direction are fitted on the bench and
//! supplied through [`RcModel`].

use serde::{Deserialize, Serialize};

use crate::frame::SampleRecord;

/// Full scale of the 18-bit discharge counter
pub const FULL_SCALE: f64 = (1u32 << 18) as f64;

/// Default supply voltage of the sense network
pub const SUPPLY_VOLTAGE: f64 = 3.3;

/// Sample clock of the counters (48 MHz DDR)
pub const SAMPLE_CLOCK_HZ: f64 = 96e6;

/// Sense capacitor
pub const SENSE_CAPACITANCE_F: f64 = 100e-9;

/// Sense resistor
pub const SENSE_RESISTANCE_OHM: f64 = 5e3;

/// Voltage reached after charging for `t` counts
///
/// Returns 0 for `t == 0` and any positive `k`.
pub fn voltage_charging(t: f64, k: f64, supply_voltage: f64) -> f64 {
    supply_voltage * (1.0 - (-(t / k)).exp())
}

/// Voltage inferred from a discharge time of `t` counts
///
/// A zero (or negative) count means no discharge was observed and maps to 0.
/// Callers should clamp `t` to `[0, full_scale]` first; outside that range the
/// exponential can overflow to infinity.
pub fn voltage_discharging(t: f64, k: f64, supply_voltage: f64, full_scale: f64) -> f64 {
    if t > 0.0 {
        supply_voltage * (-((full_scale - t) / k)).exp()
    } else {
        0.0
    }
}

/// Clamp a counter value into the model's valid domain
pub fn clamp_time(t: f64, full_scale: f64) -> f64 {
    t.clamp(0.0, full_scale)
}

/// Fitted constants for one direction (charge or discharge)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RcConstants {
    /// Time constant in counter ticks
    pub k: f64,
    /// Additive correction applied to the raw count
    #[serde(default)]
    pub offset: f64,
}

/// Complete RC model used to turn decoded records into voltages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcModel {
    /// Supply voltage of the RC network
    pub supply_voltage: f64,
    /// Discharge counter full scale
    pub full_scale: f64,
    /// Input divider ratio (sensed voltage is multiplied by this)
    pub divider: f64,
    /// Charge-direction constants
    pub charge: RcConstants,
    /// Discharge-direction constants
    pub discharge: RcConstants,
}

impl Default for RcModel {
    /// Constants fitted against the 3V3 and 1V2 rails on a reference board
    fn default() -> Self {
        Self {
            supply_voltage: SUPPLY_VOLTAGE,
            full_scale: FULL_SCALE,
            divider: 2.0,
            charge: RcConstants {
                k: 47558.0,
                offset: 520.0,
            },
            discharge: RcConstants {
                k: 49019.0,
                offset: -2050.0,
            },
        }
    }
}

impl RcModel {
    /// Build an uncalibrated model from component values
    ///
    /// `K = f_sample * C * R` in counter ticks, no offsets.
    pub fn theoretical(sample_clock_hz: f64, capacitance_f: f64, resistance_ohm: f64) -> Self {
        let k = sample_clock_hz * capacitance_f * resistance_ohm;
        let constants = RcConstants { k, offset: 0.0 };
        Self {
            charge: constants,
            discharge: constants,
            ..Self::default()
        }
    }

    /// Voltage estimate from a charge time
    pub fn charge_voltage(&self, chg: u32) -> f64 {
        let t = clamp_time(chg as f64 + self.charge.offset, self.full_scale);
        self.divider * voltage_charging(t, self.charge.k, self.supply_voltage)
    }

    /// Voltage estimate from a discharge time
    pub fn discharge_voltage(&self, dis: u32) -> f64 {
        if dis == 0 {
            return 0.0;
        }
        let t = clamp_time(dis as f64 + self.discharge.offset, self.full_scale);
        self.divider * voltage_discharging(t, self.discharge.k, self.supply_voltage, self.full_scale)
    }

    /// Both estimates for a decoded record
    pub fn record_voltages(&self, record: &SampleRecord) -> (f64, f64) {
        (
            self.charge_voltage(record.chg as u32),
            self.discharge_voltage(record.dis),
        )
    }

    /// Charge time the model predicts for a sensed voltage (inverse of
    /// [`charge_voltage`](Self::charge_voltage))
    pub fn charge_time(&self, volts: f64) -> f64 {
        let ratio = (volts / self.divider / self.supply_voltage).clamp(0.0, 1.0 - f64::EPSILON);
        -self.charge.k * (1.0 - ratio).ln() - self.charge.offset
    }

    /// Discharge time the model predicts for a sensed voltage (inverse of
    /// [`discharge_voltage`](Self::discharge_voltage))
    pub fn discharge_time(&self, volts: f64) -> f64 {
        let ratio = volts / self.divider / self.supply_voltage;
        if ratio <= 0.0 {
            return 0.0;
        }
        self.full_scale + self.discharge.k * ratio.ln() - self.discharge.offset
    }
}
