
pub fn frame_mean_abs(x: &[f64]) -> f64 {
    let mut s = 0.0f64;
    for &v in x {
        s += v.abs();
    }
    s / (x.len().max(1) as f64)
}

pub fn frame_rms(x: &[f64]) -> f64 {
    let mut s = 0.0f64;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f64)).sqrt()
}

pub fn frame_energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}
