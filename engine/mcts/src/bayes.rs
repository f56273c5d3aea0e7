//! Conjugate posteriors used for Thompson sampling in AB-MCTS.
//!
//! Gaussian rewards use a Normal-Inverse-χ² model, bounded rewards a Beta
//! model. Both are updated in closed form from the observed scores.

use rand::Rng;
use rand_distr::{Beta, ChiSquared, Distribution, Normal};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("posterior sampling failed: {0}")]
pub struct SamplingError(pub String);

/// Normal-Inverse-χ² hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPrior {
    pub m: f64,
    pub kappa: f64,
    pub nu: f64,
    pub tau_square: f64,
}

impl GaussianPrior {
    pub fn with_mean(m: f64) -> Self {
        Self {
            m,
            kappa: 1.0,
            nu: 1.0,
            tau_square: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Posterior {
    Gaussian {
        m: f64,
        kappa: f64,
        nu: f64,
        tau_square: f64,
    },
    Beta {
        a: f64,
        b: f64,
    },
}

impl Posterior {
    pub fn gaussian(prior: GaussianPrior, obs: &[f64]) -> Self {
        let n = obs.len() as f64;
        if obs.is_empty() {
            return Self::Gaussian {
                m: prior.m,
                kappa: prior.kappa,
                nu: prior.nu,
                tau_square: prior.tau_square,
            };
        }
        let mean = obs.iter().sum::<f64>() / n;
        let ss: f64 = obs.iter().map(|x| (x - mean).powi(2)).sum();
        let kappa = prior.kappa + n;
        let nu = prior.nu + n;
        let m = (prior.kappa * prior.m + n * mean) / kappa;
        let shift = (n * prior.kappa / kappa) * (mean - prior.m).powi(2);
        let tau_square = (prior.nu * prior.tau_square + ss + shift) / nu;
        Self::Gaussian {
            m,
            kappa,
            nu,
            tau_square,
        }
    }

    /// Scores must already be known to lie in [0, 1].
    pub fn beta(a: f64, b: f64, obs: &[f64]) -> Self {
        let successes: f64 = obs.iter().sum();
        Self::Beta {
            a: a + successes,
            b: b + obs.len() as f64 - successes,
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Self::Gaussian { m, .. } => m,
            Self::Beta { a, b } => a / (a + b),
        }
    }

    /// Draw one plausible mean reward.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SamplingError> {
        match *self {
            Self::Gaussian {
                m,
                kappa,
                nu,
                tau_square,
            } => {
                let chi = ChiSquared::new(nu)
                    .map_err(|e| SamplingError(e.to_string()))?
                    .sample(rng)
                    .max(1e-12);
                let sigma_square = nu * tau_square / chi;
                Normal::new(m, (sigma_square / kappa).sqrt())
                    .map_err(|e| SamplingError(e.to_string()))
                    .map(|normal| normal.sample(rng))
            }
            Self::Beta { a, b } => Beta::new(a, b)
                .map_err(|e| SamplingError(e.to_string()))
                .map(|beta| beta.sample(rng)),
        }
    }
}

impl fmt::Display for Posterior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Gaussian {
                m,
                kappa,
                nu,
                tau_square,
            } => write!(
                f,
                "𝒩({m:.3}, σ²/{kappa:.3}), σ² ~ χ⁻²({nu:.3}, {tau_square:.3})"
            ),
            Self::Beta { a, b } => write!(f, "β({a:.3}, {b:.3})"),
        }
    }
}

/// Index of the largest sample; ties keep the earliest candidate.
pub(crate) fn argmax(samples: &[f64]) -> Option<usize> {
    samples
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_without_observations_is_prior() {
        let prior = GaussianPrior::with_mean(0.3);
        let post = Posterior::gaussian(prior, &[]);
        assert!((post.mean() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_update_moves_toward_data() {
        let prior = GaussianPrior::with_mean(0.0);
        let post = Posterior::gaussian(prior, &[1.0, 1.0, 1.0]);
        match post {
            Posterior::Gaussian { m, kappa, nu, .. } => {
                assert!((m - 0.75).abs() < 1e-12);
                assert!((kappa - 4.0).abs() < 1e-12);
                assert!((nu - 4.0).abs() < 1e-12);
            }
            _ => panic!("expected gaussian"),
        }
    }

    #[test]
    fn test_beta_update_counts() {
        let post = Posterior::beta(1.0, 1.0, &[1.0, 0.0, 0.5]);
        assert_eq!(post, Posterior::Beta { a: 2.5, b: 2.5 });
        assert!((post.mean() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_samples_are_finite_and_reproducible() {
        let post = Posterior::gaussian(GaussianPrior::with_mean(0.5), &[0.4, 0.6]);
        let mut a = ChaCha20Rng::seed_from_u64(7);
        let mut b = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..32 {
            let x = post.sample(&mut a).unwrap();
            assert!(x.is_finite());
            assert_eq!(x, post.sample(&mut b).unwrap());
        }

        let beta = Posterior::beta(2.0, 3.0, &[]);
        let x = beta.sample(&mut a).unwrap();
        assert!((0.0..=1.0).contains(&x));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Posterior::Beta { a: 1.0, b: 2.0 }.to_string(), "β(1.000, 2.000)");
        let g = Posterior::gaussian(GaussianPrior::with_mean(0.5), &[]);
        assert_eq!(
            g.to_string(),
            "𝒩(0.500, σ²/1.000), σ² ~ χ⁻²(1.000, 0.100)"
        );
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
