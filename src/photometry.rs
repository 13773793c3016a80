//! Magnitude ↔ flux conversion.
//!
//! A magnitude with Gaussian error corresponds to a log-normally distributed
//! flux; these functions convert the mean and standard deviation between the
//! two without linearising.

/// Zero point used when deriving lightcurve fluxes.
pub const ZERO_POINT: f64 = 22.0;

/// `2.5 · log10(e)`, the scale between magnitudes and natural-log flux.
const POGSON: f64 = 2.5 * std::f64::consts::LOG10_E;

/// Mean and standard deviation of the flux for a magnitude `mag ± mag_err`.
pub fn magnitude_to_flux(mag: f64, mag_err: f64, zero_point: f64) -> (f64, f64) {
    let mu = (zero_point - mag) / POGSON;
    let sigma = mag_err / POGSON;
    let var = sigma * sigma;
    let flux = (mu + 0.5 * var).exp();
    let flux_err = ((var.exp() - 1.0) * (2.0 * mu + var).exp()).sqrt();
    (flux, flux_err)
}

/// Inverse of [`magnitude_to_flux`].
pub fn flux_to_magnitude(flux: f64, flux_err: f64, zero_point: f64) -> (f64, f64) {
    let ratio = flux_err * flux_err / (flux * flux);
    let mag_err = POGSON * (ratio + 1.0).ln().sqrt();
    let mag = zero_point - POGSON * (flux.ln() - 0.5 * (1.0 + ratio).ln());
    (mag, mag_err)
}

/// Convert paired magnitude and error slices.
pub fn magnitudes_to_fluxes(mags: &[f64], errs: &[f64], zero_point: f64) -> (Vec<f64>, Vec<f64>) {
    mags.iter()
        .zip(errs)
        .map(|(&m, &e)| magnitude_to_flux(m, e, zero_point))
        .unzip()
}

/// Convert paired flux and error slices.
pub fn fluxes_to_magnitudes(fluxes: &[f64], errs: &[f64], zero_point: f64) -> (Vec<f64>, Vec<f64>) {
    fluxes
        .iter()
        .zip(errs)
        .map(|(&f, &e)| flux_to_magnitude(f, e, zero_point))
        .unzip()
}
