//! RTT 估计（Jacobson/Karels）
//!
//! 首个样本：SRTT = S，DEV = S/2。
//! 之后：SRTT = (1-α)·SRTT + α·S，DEV = (1-β)·DEV + β·|S - SRTT|（使用更新后的 SRTT），
//! 超时间隔 = SRTT + 4·DEV。

use crate::sim::SimTime;

pub const ALPHA: f64 = 0.125;
pub const BETA: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// 秒
    srtt: Option<f64>,
    dev: f64,
    timeout: f64,
}

impl RttEstimator {
    pub fn new(init_timeout: SimTime) -> Self {
        Self {
            srtt: None,
            dev: 0.0,
            timeout: init_timeout.as_secs_f64(),
        }
    }

    pub fn sample(&mut self, rtt: SimTime) {
        self.sample_secs(rtt.as_secs_f64());
    }

    pub fn sample_secs(&mut self, s: f64) {
        let srtt = match self.srtt {
            None => {
                self.dev = s / 2.0;
                s
            }
            Some(prev) => {
                let srtt = (1.0 - ALPHA) * prev + ALPHA * s;
                self.dev = (1.0 - BETA) * self.dev + BETA * (s - srtt).abs();
                srtt
            }
        };
        self.srtt = Some(srtt);
        self.timeout = srtt + 4.0 * self.dev;
    }

    pub fn srtt_secs(&self) -> Option<f64> {
        self.srtt
    }

    pub fn dev_secs(&self) -> f64 {
        self.dev
    }

    pub fn timeout_secs(&self) -> f64 {
        self.timeout
    }

    pub fn timeout(&self) -> SimTime {
        SimTime::from_secs_f64(self.timeout)
    }
}
