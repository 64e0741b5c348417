//! Delay-locked loop for block arrival times
//!
//! A second-order loop that locks a locally predicted block boundary to
//! noisy wall-clock measurements taken once per hardware period. The
//! proportional term corrects phase on every update and the integral term
//! accumulates into the period estimate, which absorbs the sound card's
//! crystal drift against the wall clock.
//!
//! The loop bandwidth starts wide for fast acquisition and narrows
//! geometrically toward a terminal value for low steady-state jitter.

use std::f64::consts::{PI, SQRT_2};

use crate::error::ClockError;

/// Locked interval for one block, in seconds relative to the stream epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockedInterval {
    pub t0: f64,
    pub t1: f64,
}

impl LockedInterval {
    pub fn duration(&self) -> f64 {
        self.t1 - self.t0
    }
}

/// Delay-locked loop state. One instance per stream, single owner.
#[derive(Debug, Clone)]
pub struct DelayLockedLoop {
    nominal_rate: f64,
    initial_bandwidth: f64,
    terminal_bandwidth: f64,
    bandwidth_adapt_coefficient: f64,
    current_bandwidth: f64,
    loop_gain_b: f64,
    loop_gain_c: f64,
    t0: f64,
    t1: f64,
    period_estimate: f64,
    is_reset: bool,
}

impl DelayLockedLoop {
    /// Create a loop expecting `nominal_rate` updates per second.
    ///
    /// `time_constant` is the number of updates over which the distance
    /// between the current and terminal bandwidth shrinks by a factor of e
    /// (to first order). Values below one update narrow instantly.
    ///
    /// Every parameter must be finite and positive.
    pub fn new(
        nominal_rate: f64,
        initial_bandwidth: f64,
        terminal_bandwidth: f64,
        time_constant: f64,
    ) -> Result<Self, ClockError> {
        for (name, value) in [
            ("nominal_rate", nominal_rate),
            ("initial_bandwidth", initial_bandwidth),
            ("terminal_bandwidth", terminal_bandwidth),
            ("time_constant", time_constant),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ClockError::InvalidParameter { name, value });
            }
        }

        let bandwidth_adapt_coefficient = (1.0 - 1.0 / time_constant).clamp(0.0, 1.0);
        Ok(Self {
            nominal_rate,
            initial_bandwidth,
            terminal_bandwidth,
            bandwidth_adapt_coefficient,
            current_bandwidth: initial_bandwidth,
            loop_gain_b: 0.0,
            loop_gain_c: 0.0,
            t0: 0.0,
            t1: 0.0,
            period_estimate: 1.0 / nominal_rate,
            is_reset: true,
        })
    }

    /// Feed the measured time of "now" and get the locked interval of the
    /// next block.
    pub fn update(&mut self, measured_time: f64) -> Result<LockedInterval, ClockError> {
        if !measured_time.is_finite() {
            return Err(ClockError::NonFiniteMeasurement(measured_time));
        }

        self.adapt_bandwidth();

        if self.is_reset {
            self.t0 = measured_time;
            self.period_estimate = 1.0 / self.nominal_rate;
            self.t1 = self.t0 + self.period_estimate;
            self.is_reset = false;
        } else {
            self.t0 = self.t1;
            let error = measured_time - self.t0;
            self.t1 = self.t0 + self.loop_gain_b * error + self.period_estimate;
            self.period_estimate += self.loop_gain_c * error;
        }

        Ok(self.interval())
    }

    fn adapt_bandwidth(&mut self) {
        if self.is_reset {
            self.current_bandwidth = self.initial_bandwidth;
        } else {
            self.current_bandwidth = self.terminal_bandwidth
                + (self.current_bandwidth - self.terminal_bandwidth)
                    * self.bandwidth_adapt_coefficient;
        }

        // Critically damped second-order loop
        let omega = 2.0 * PI * self.current_bandwidth / self.nominal_rate;
        self.loop_gain_b = SQRT_2 * omega;
        self.loop_gain_c = omega * omega;
    }

    /// Restart acquisition on the next update
    pub fn reset(&mut self) {
        self.is_reset = true;
    }

    pub fn interval(&self) -> LockedInterval {
        LockedInterval {
            t0: self.t0,
            t1: self.t1,
        }
    }

    pub fn is_reset(&self) -> bool {
        self.is_reset
    }

    pub fn nominal_rate(&self) -> f64 {
        self.nominal_rate
    }

    pub fn current_bandwidth(&self) -> f64 {
        self.current_bandwidth
    }

    pub fn period_estimate(&self) -> f64 {
        self.period_estimate
    }

    pub fn loop_gains(&self) -> (f64, f64) {
        (self.loop_gain_b, self.loop_gain_c)
    }
}
