//! Otsu's threshold over a set of LoG responses.

/// Histogram resolution used by [`threshold_otsu`].
pub const OTSU_BINS: usize = 256;

/// Threshold maximizing the between-class variance of a 256-bin histogram.
///
/// Bins span `[min, max]`; the returned value is the center of the last bin of
/// the lower class. Constant input returns that constant, empty input `None`.
pub fn threshold_otsu(values: &[f32]) -> Option<f32> {
    let first = *values.first()?;
    if values.iter().all(|&v| v == first) {
        return Some(first);
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });
    let width = (max - min) / OTSU_BINS as f64;

    let mut counts = [0f64; OTSU_BINS];
    for &v in values {
        let bin = (((v as f64 - min) / width) as usize).min(OTSU_BINS - 1);
        counts[bin] += 1.0;
    }
    let centers: Vec<f64> = (0..OTSU_BINS)
        .map(|i| min + (i as f64 + 0.5) * width)
        .collect();

    // Class weights and means for "bins 0..=i" and "bins i..".
    let mut weight_low = [0f64; OTSU_BINS];
    let mut mean_low = [0f64; OTSU_BINS];
    let (mut w, mut s) = (0.0, 0.0);
    for i in 0..OTSU_BINS {
        w += counts[i];
        s += counts[i] * centers[i];
        weight_low[i] = w;
        mean_low[i] = if w > 0.0 { s / w } else { 0.0 };
    }

    let mut weight_high = [0f64; OTSU_BINS];
    let mut mean_high = [0f64; OTSU_BINS];
    let (mut w, mut s) = (0.0, 0.0);
    for i in (0..OTSU_BINS).rev() {
        w += counts[i];
        s += counts[i] * centers[i];
        weight_high[i] = w;
        mean_high[i] = if w > 0.0 { s / w } else { 0.0 };
    }

    let mut best = 0;
    let mut best_variance = f64::NEG_INFINITY;
    for i in 0..OTSU_BINS - 1 {
        let diff = mean_low[i] - mean_high[i + 1];
        let variance = weight_low[i] * weight_high[i + 1] * diff * diff;
        if variance > best_variance {
            best_variance = variance;
            best = i;
        }
    }

    Some(centers[best] as f32)
}
