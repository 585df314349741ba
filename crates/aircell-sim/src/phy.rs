//! Physical-layer math for the air interface.
//!
//! Log-distance path loss with log-normal shadowing, uplink/downlink SINR
//! under co-channel interference, Shannon-bounded throughput, and
//! QPSK/M-QAM error probabilities.
//!
//! Units:
//! - Power: dBm and linear mW (conversions provided)
//! - Distance: meters
//! - Bandwidth: Hz, rates in bit/s
//! - Latency: milliseconds
//!
//! Every path-loss evaluation draws a fresh shadowing sample from the RNG
//! handed in by the caller, so two calls at the same distance yield
//! different results. The simulator owns one seeded stream for this.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Thermal noise density in dBm/Hz.
const NOISE_DENSITY_DBM_HZ: f64 = -174.0;

/// Path-loss exponent (n). 5.0 models a dense urban deployment.
const PATHLOSS_EXPONENT: f64 = 5.0;

/// Standard deviation of the log-normal shadowing term, in dB.
const SHADOW_SIGMA_DB: f64 = 6.0;

/// Distances below this are clamped before the log-distance term.
const MIN_DISTANCE_M: f64 = 1.0;

/// Base-station antenna gain in dBi.
const BS_GAIN_DBI: f64 = 15.0;

/// UE antenna gain in dBi.
const UE_GAIN_DBI: f64 = 0.0;

/// Base-station transmit power in dBm (10 W macro).
const BS_TX_POWER_DBM: f64 = 40.0;

/// UE transmit power in dBm (~200 mW).
const UE_TX_POWER_DBM: f64 = 23.0;

/// Speed of light in m/s.
const LIGHT_SPEED_M_S: f64 = 3.0e8;

/// Seed for the simulator-wide shadowing stream.
pub const SHADOWING_SEED: u64 = 7;

/// Convert power from dB (or dBm) to linear (mW for dBm inputs).
pub fn db_to_lin(x_db: f64) -> f64 {
    10f64.powf(x_db / 10.0)
}

/// Convert linear power to dB. Non-positive inputs map to −999 dB.
pub fn lin_to_db(x: f64) -> f64 {
    if x <= 0.0 {
        return -999.0;
    }
    10.0 * x.log10()
}

/// Wire-level selector for the canonical PHY profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    #[serde(rename = "LTE_20")]
    Lte20,
    #[serde(rename = "NR_100")]
    Nr100,
}

impl NetworkType {
    pub fn profile(self) -> TechProfile {
        match self {
            NetworkType::Lte20 => TechProfile::lte_20(),
            NetworkType::Nr100 => TechProfile::nr_100(),
        }
    }
}

/// A named bundle of PHY parameters. Immutable once constructed.
///
/// Noise power and the 1 m free-space loss only depend on the profile, so
/// both are precomputed here rather than on every link evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TechProfile {
    pub name: &'static str,
    pub carrier_hz: f64,
    pub bandwidth_hz: f64,
    /// Spectral-efficiency factor applied to the Shannon bound, in (0, 1].
    pub eta_eff: f64,
    noise_mw: f64,
    fspl_1m_db: f64,
}

impl TechProfile {
    pub fn new(name: &'static str, carrier_hz: f64, bandwidth_hz: f64, eta_eff: f64) -> Self {
        let noise_dbm = NOISE_DENSITY_DBM_HZ + 10.0 * bandwidth_hz.log10();
        let wavelength = LIGHT_SPEED_M_S / carrier_hz;
        let fspl_1m_db = 20.0 * (4.0 * std::f64::consts::PI / wavelength).log10();
        Self {
            name,
            carrier_hz,
            bandwidth_hz,
            eta_eff,
            noise_mw: db_to_lin(noise_dbm),
            fspl_1m_db,
        }
    }

    /// LTE, 20 MHz at 2.6 GHz.
    pub fn lte_20() -> Self {
        Self::new("LTE-20MHz", 2.6e9, 20e6, 0.50)
    }

    /// 5G NR, 100 MHz at 3.5 GHz.
    pub fn nr_100() -> Self {
        Self::new("NR-100MHz", 3.5e9, 100e6, 0.60)
    }

    /// Thermal noise power over the profile bandwidth, in mW.
    pub fn noise_mw(&self) -> f64 {
        self.noise_mw
    }

    /// Free-space path loss at the 1 m reference distance, in dB.
    pub fn fspl_1m_db(&self) -> f64 {
        self.fspl_1m_db
    }
}

/// Link-budget evaluator for one [`TechProfile`].
pub struct RadioModel<'a> {
    profile: &'a TechProfile,
    shadowing: Normal<f64>,
}

impl<'a> RadioModel<'a> {
    pub fn new(profile: &'a TechProfile) -> Self {
        let shadowing =
            Normal::new(0.0, SHADOW_SIGMA_DB).expect("shadowing sigma is a positive constant");
        Self { profile, shadowing }
    }

    /// Path loss at distance `d_m`, in dB, including one fresh shadowing
    /// sample. Distances below 1 m are clamped.
    pub fn pathloss_db(&self, d_m: f64, rng: &mut impl Rng) -> f64 {
        let d = d_m.max(MIN_DISTANCE_M);
        let base = self.profile.fspl_1m_db + 10.0 * PATHLOSS_EXPONENT * d.log10();
        base + self.shadowing.sample(rng)
    }

    /// Received power in dBm after antenna gains and path loss.
    pub fn rx_power_dbm(
        &self,
        tx_dbm: f64,
        tx_gain_dbi: f64,
        rx_gain_dbi: f64,
        d_m: f64,
        rng: &mut impl Rng,
    ) -> f64 {
        tx_dbm + tx_gain_dbi + rx_gain_dbi - self.pathloss_db(d_m, rng)
    }

    /// Downlink SINR (linear): serving tower at `d_serv_m`, with every
    /// interfering tower contributing at full reuse-1 power.
    pub fn sinr_dl(&self, d_serv_m: f64, interferer_ds_m: &[f64], rng: &mut impl Rng) -> f64 {
        let s_mw = db_to_lin(self.rx_power_dbm(BS_TX_POWER_DBM, BS_GAIN_DBI, UE_GAIN_DBI, d_serv_m, rng));
        let i_mw: f64 = interferer_ds_m
            .iter()
            .map(|&d| db_to_lin(self.rx_power_dbm(BS_TX_POWER_DBM, BS_GAIN_DBI, UE_GAIN_DBI, d, rng)))
            .sum();
        s_mw / (i_mw + self.profile.noise_mw)
    }

    /// Uplink SINR (linear): the UE transmits, co-channel UEs interfere at
    /// the serving tower.
    pub fn sinr_ul(&self, d_serv_m: f64, interferer_ds_m: &[f64], rng: &mut impl Rng) -> f64 {
        let s_mw = db_to_lin(self.rx_power_dbm(UE_TX_POWER_DBM, UE_GAIN_DBI, BS_GAIN_DBI, d_serv_m, rng));
        let i_mw: f64 = interferer_ds_m
            .iter()
            .map(|&d| db_to_lin(self.rx_power_dbm(UE_TX_POWER_DBM, UE_GAIN_DBI, BS_GAIN_DBI, d, rng)))
            .sum();
        s_mw / (i_mw + self.profile.noise_mw)
    }

    /// Shannon-bounded throughput in bit/s. Zero for sinr ≤ 0.
    pub fn rate_bps(&self, sinr: f64) -> f64 {
        if sinr <= 0.0 {
            return 0.0;
        }
        self.profile.eta_eff * self.profile.bandwidth_hz * (1.0 + sinr).log2()
    }

    /// One-way latency in milliseconds: propagation plus transmission of
    /// `nbytes` at the Shannon-bounded rate.
    ///
    /// Callers must not pass sinr ≤ 0; treat such links as fully corrupted
    /// instead of computing a latency.
    pub fn latency_ms(&self, d_serv_m: f64, nbytes: usize, sinr: f64) -> f64 {
        let propagation_s = d_serv_m / LIGHT_SPEED_M_S;
        let transmission_s = (8 * nbytes) as f64 / self.rate_bps(sinr);
        (propagation_s + transmission_s) * 1e3
    }
}

/// BER for uncoded QPSK/BPSK in AWGN, treating the linear SINR as the
/// per-bit SNR. Non-positive SINR is a fully unreliable channel.
pub fn ber_qpsk(sinr: f64) -> f64 {
    if sinr <= 0.0 {
        return 0.5;
    }
    0.5 * erfc(sinr.sqrt())
}

/// Approximate BER for square M-QAM (M = 4, 16, 64, ...) in AWGN.
pub fn ber_mqam(sinr: f64, m: u32) -> f64 {
    if sinr <= 0.0 || m < 4 {
        return 0.5;
    }
    let m = m as f64;
    let bits_per_symbol = m.log2();
    let symbol_error = 4.0 * (1.0 - 1.0 / m.sqrt()) * 0.5 * erfc((3.0 * sinr / (2.0 * (m - 1.0))).sqrt());
    symbol_error / bits_per_symbol
}

/// Probability that a packet of `nbytes` suffers at least one bit error.
pub fn packet_error_prob(ber: f64, nbytes: usize) -> f64 {
    1.0 - (1.0 - ber).powf((8 * nbytes) as f64)
}

/// Complementary error function, Chebyshev-fitted rational approximation
/// (absolute error below 1.2e-7 everywhere).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}
