use log::debug;
use nalgebra::{SMatrix, SVector};

/// A linear Kalman filter over `S` states observed through `M` measurements.
///
/// States are laid out as `S / 2` quantities followed by their rates, which is
/// what the constant-velocity [`KalmanFilter::predict`] assumes.
#[derive(Debug, Clone)]
pub struct KalmanFilter<const S: usize, const M: usize> {
    mean: SVector<f32, S>,
    covariance: SMatrix<f32, S, S>,
    update_mat: SMatrix<f32, M, S>,
    measurement_cov: SMatrix<f32, M, M>,
}

impl<const S: usize, const M: usize> KalmanFilter<S, M> {
    pub fn new(
        mean: SVector<f32, S>,
        covariance: SMatrix<f32, S, S>,
        update_mat: SMatrix<f32, M, S>,
        measurement_cov: SMatrix<f32, M, M>,
    ) -> Self {
        Self {
            mean,
            covariance,
            update_mat,
            measurement_cov,
        }
    }

    /// Advances the filter by `dt` seconds under a constant-velocity model.
    ///
    /// `accel_var` is the variance of the piecewise-constant acceleration
    /// driving the process noise.
    pub fn predict(&mut self, dt: f32, accel_var: f32) {
        let (motion_mat, motion_cov) = constant_velocity::<S>(dt, accel_var);

        self.mean = motion_mat * self.mean;
        self.covariance = motion_mat * self.covariance * motion_mat.transpose() + motion_cov;
    }

    /// Corrects the filter with `measurement`.
    ///
    /// Returns `false` and leaves the filter untouched when the innovation
    /// covariance is not positive definite.
    pub fn update(&mut self, measurement: SVector<f32, M>) -> bool {
        let (projected_mean, projected_cov) = self.project();
        let Some(chol) = projected_cov.cholesky() else {
            debug!(target: "tracker", "skip kalman update with non-SPD innovation covariance");
            return false;
        };
        let ph_t = self.covariance * self.update_mat.transpose();
        let kalman_gain = ph_t * chol.solve(&SMatrix::<f32, M, M>::identity());
        let innovation = measurement - projected_mean;

        self.mean += kalman_gain * innovation;
        self.covariance -= kalman_gain * projected_cov * kalman_gain.transpose();
        true
    }

    fn project(&self) -> (SVector<f32, M>, SMatrix<f32, M, M>) {
        let mean = self.update_mat * self.mean;
        let cov =
            self.update_mat * self.covariance * self.update_mat.transpose() + self.measurement_cov;
        (mean, cov)
    }

    #[inline]
    pub fn mean(&self) -> &SVector<f32, S> {
        &self.mean
    }

    /// Mutable access to the state, for projecting it back onto a constraint
    /// after a step.
    #[inline]
    pub fn mean_mut(&mut self) -> &mut SVector<f32, S> {
        &mut self.mean
    }
}

/// Transition matrix and process noise of a constant-velocity model with `S / 2`
/// positions and `S / 2` velocities.
///
/// ```text
///        ┌ dt⁴/4·I   dt³/2·I ┐
/// Q = σ² │                    │
///        └ dt³/2·I   dt²  ·I ┘
/// ```
fn constant_velocity<const S: usize>(
    dt: f32,
    accel_var: f32,
) -> (SMatrix<f32, S, S>, SMatrix<f32, S, S>) {
    let half = S / 2;
    let mut motion_mat = SMatrix::<f32, S, S>::identity();
    let mut motion_cov = SMatrix::<f32, S, S>::zeros();
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;

    for i in 0..half {
        let v = i + half;
        motion_mat[(i, v)] = dt;
        motion_cov[(i, i)] = dt4 / 4.0 * accel_var;
        motion_cov[(i, v)] = dt3 / 2.0 * accel_var;
        motion_cov[(v, i)] = dt3 / 2.0 * accel_var;
        motion_cov[(v, v)] = dt2 * accel_var;
    }

    (motion_mat, motion_cov)
}

/// Builds an update matrix observing the first `M` states one-to-one.
pub fn observe_leading<const S: usize, const M: usize>() -> SMatrix<f32, M, S> {
    let mut update = SMatrix::<f32, M, S>::zeros();
    for i in 0..M.min(S) {
        update[(i, i)] = 1.0;
    }
    update
}

/// Builds a diagonal matrix with `variance` on the first half and
/// `rate_variance` on the second half of the diagonal.
pub fn split_diagonal<const S: usize>(variance: f32, rate_variance: f32) -> SMatrix<f32, S, S> {
    let mut mat = SMatrix::<f32, S, S>::zeros();
    for i in 0..S {
        mat[(i, i)] = if i < S / 2 { variance } else { rate_variance };
    }
    mat
}
