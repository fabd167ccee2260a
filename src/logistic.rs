//! L2-regularised logistic regression, `0.5·‖w‖² + C·Σ logloss`, intercept
//! unpenalised. Damped Newton steps.

use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_ITER: usize = 100;
const TOL: f64 = 1e-9;
// Per unit of `C·n`; a rejected step this close to stationary counts as done.
const GRAD_TOL: f64 = 1e-6;
// Keeps the intercept row of the Hessian invertible on separable data.
const INTERCEPT_RIDGE: f64 = 1e-9;

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    (p / (1.0 - p)).ln()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticFit {
    pub fn decision(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepStatus {
    Continue,
    Converged,
    Stalled,
}

fn step_status(accepted: bool, moved: f64, grad_max: f64, grad_tol: f64) -> StepStatus {
    match (accepted, moved < TOL, grad_max <= grad_tol) {
        (true, true, _) => StepStatus::Converged,
        (true, false, _) => StepStatus::Continue,
        (false, _, true) => StepStatus::Converged,
        (false, _, false) => StepStatus::Stalled,
    }
}

fn objective(x: &[Vec<f64>], y: &[f64], c: f64, params: &[f64]) -> f64 {
    let d = params.len() - 1;
    let penalty = 0.5 * params[1..].iter().map(|w| w * w).sum::<f64>();
    let mut loss = 0.0;
    for (row, target) in x.iter().zip(y) {
        let z = params[0] + (0..d).map(|j| params[j + 1] * row[j]).sum::<f64>();
        // log(1 + e^z) - y·z, computed stably.
        let softplus = if z > 0.0 {
            z + (-z).exp().ln_1p()
        } else {
            z.exp().ln_1p()
        };
        loss += softplus - target * z;
    }
    penalty + c * loss
}

/// Fits on rows `x` (all the same width) against targets `y` in {0, 1}.
pub fn fit_logistic(x: &[Vec<f64>], y: &[f64], c: f64) -> LogisticFit {
    let d = x.first().map(Vec::len).unwrap_or(0);
    let mut params = vec![0.0; d + 1];
    if x.is_empty() || x.len() != y.len() {
        return LogisticFit {
            intercept: 0.0,
            coefficients: vec![0.0; d],
            iterations: 0,
            converged: false,
        };
    }

    let grad_tol = GRAD_TOL * (1.0 + c * x.len() as f64);
    let mut current = objective(x, y, c, &params);
    let mut converged = false;
    let mut iterations = 0;
    for iter in 0..MAX_ITER {
        iterations = iter + 1;
        let mut grad = vec![0.0; d + 1];
        let mut hess = vec![vec![0.0; d + 1]; d + 1];
        for j in 1..=d {
            grad[j] = params[j];
            hess[j][j] = 1.0;
        }
        hess[0][0] = INTERCEPT_RIDGE;

        for (row, target) in x.iter().zip(y) {
            let z = params[0] + (0..d).map(|j| params[j + 1] * row[j]).sum::<f64>();
            let p = sigmoid(z);
            let r = c * (p - target);
            let w = c * p * (1.0 - p);
            grad[0] += r;
            hess[0][0] += w;
            for j in 0..d {
                grad[j + 1] += r * row[j];
                hess[0][j + 1] += w * row[j];
                for k in 0..=j {
                    hess[j + 1][k + 1] += w * row[j] * row[k];
                }
            }
        }
        for j in 0..=d {
            for k in (j + 1)..=d {
                if j == 0 {
                    hess[k][0] = hess[0][k];
                } else {
                    hess[j][k] = hess[k][j];
                }
            }
        }

        let grad_max = grad.iter().map(|g| g.abs()).fold(0.0, f64::max);
        let grad_max = if grad.iter().any(|g| g.is_nan()) { f64::NAN } else { grad_max };
        let Some(step) = solve(hess, grad) else {
            break;
        };

        // Backtrack until the objective does not increase.
        let mut scale = 1.0;
        let mut accepted = false;
        let mut moved = f64::INFINITY;
        for _ in 0..30 {
            let trial: Vec<f64> = params
                .iter()
                .zip(&step)
                .map(|(p, s)| p - scale * s)
                .collect();
            let value = objective(x, y, c, &trial);
            if value.is_finite() && value <= current {
                moved = step.iter().map(|s| (scale * s).abs()).fold(0.0, f64::max);
                params = trial;
                current = value;
                accepted = true;
                break;
            }
            scale *= 0.5;
        }
        match step_status(accepted, moved, grad_max, grad_tol) {
            StepStatus::Continue => {}
            StepStatus::Converged => {
                converged = true;
                break;
            }
            StepStatus::Stalled => {
                warn!(iterations, grad_max, "line search stalled away from the optimum");
                break;
            }
        }
    }

    LogisticFit {
        intercept: params[0],
        coefficients: params[1..].to_vec(),
        iterations,
        converged,
    }
}

fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let f = a[row][col] / a[col][col];
            if f == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut out = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / a[row][row];
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Per-column z-scoring fitted on one slice of rows and reused unchanged later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let d = x.first().map(Vec::len).unwrap_or(0);
        let n = x.len() as f64;
        let mut means = vec![0.0; d];
        let mut stds = vec![1.0; d];
        if x.is_empty() {
            return Self { means, stds };
        }
        for j in 0..d {
            let m = x.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = x.iter().map(|r| (r[j] - m).powi(2)).sum::<f64>() / n;
            means[j] = m;
            // Constant columns pass through centred.
            stds[j] = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        }
        Self { means, stds }
    }

    pub fn identity(width: usize) -> Self {
        Self {
            means: vec![0.0; width],
            stds: vec![1.0; width],
        }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter().map(|r| self.transform_row(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn simulate(n: usize, intercept: f64, coefs: &[f64], seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let row: Vec<f64> = coefs.iter().map(|_| rng.gen_range(-2.0..2.0)).collect();
            let z = intercept + row.iter().zip(coefs).map(|(a, b)| a * b).sum::<f64>();
            y.push(if rng.gen_bool(sigmoid(z)) { 1.0 } else { 0.0 });
            x.push(row);
        }
        (x, y)
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((logit(sigmoid(1.3)) - 1.3).abs() < 1e-9);
    }

    #[test]
    fn recovers_coefficients_with_weak_penalty() {
        let (x, y) = simulate(6000, 0.4, &[1.2, -0.7], 17);
        let fit = fit_logistic(&x, &y, 1e4);
        assert!(fit.converged);
        assert!((fit.intercept - 0.4).abs() < 0.15);
        assert!((fit.coefficients[0] - 1.2).abs() < 0.15);
        assert!((fit.coefficients[1] + 0.7).abs() < 0.15);
    }

    #[test]
    fn stronger_penalty_shrinks_weights() {
        let (x, y) = simulate(800, 0.0, &[1.0], 3);
        let loose = fit_logistic(&x, &y, 10.0);
        let tight = fit_logistic(&x, &y, 0.001);
        assert!(tight.coefficients[0].abs() < loose.coefficients[0].abs());
    }

    #[test]
    fn gradient_vanishes_at_optimum() {
        let (x, y) = simulate(500, -0.3, &[0.8, 0.2, -0.5], 9);
        let c = 0.1;
        let fit = fit_logistic(&x, &y, c);
        let mut g0 = 0.0;
        let mut g = fit.coefficients.clone();
        for (row, t) in x.iter().zip(&y) {
            let r = c * (fit.predict_proba(row) - t);
            g0 += r;
            for j in 0..row.len() {
                g[j] += r * row[j];
            }
        }
        assert!(g0.abs() < 1e-6);
        assert!(g.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn rejected_step_only_converges_near_a_stationary_point() {
        assert_eq!(step_status(true, 1e-12, 5.0, 1e-3), StepStatus::Converged);
        assert_eq!(step_status(true, 0.5, 5.0, 1e-3), StepStatus::Continue);
        assert_eq!(step_status(false, f64::INFINITY, 1e-4, 1e-3), StepStatus::Converged);
        assert_eq!(step_status(false, f64::INFINITY, 0.2, 1e-3), StepStatus::Stalled);
        assert_eq!(step_status(false, f64::INFINITY, f64::NAN, 1e-3), StepStatus::Stalled);
    }

    #[test]
    fn non_finite_inputs_are_not_reported_converged() {
        let (mut x, y) = simulate(50, 0.0, &[1.0], 4);
        x[3][0] = f64::NAN;
        let fit = fit_logistic(&x, &y, 1.0);
        assert!(!fit.converged);
    }

    #[test]
    fn standardizer_handles_constant_columns() {
        let x = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&x);
        assert_eq!(s.transform_row(&[2.0, 5.0]), vec![0.0, 0.0]);
        assert_eq!(s.stds[1], 1.0);
    }
}
