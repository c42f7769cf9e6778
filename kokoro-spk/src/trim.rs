//! Leading/trailing silence removal for raw model waveforms

/// Samples per analysis window
pub const WINDOW_SIZE: usize = 256;

/// Samples kept on each side of the detected speech as a margin
pub const MARGIN_SAMPLES: usize = 256;

/// Fraction of the loudest window's mean amplitude used as the silence threshold
pub const THRESHOLD_RATIO: f32 = 0.05;

/// Trim silence at both ends of `waveform`.
///
/// The buffer is split into windows of 256 samples and the mean absolute amplitude of
/// each window is computed. Anything at or below 5% of the loudest window counts as
/// silence. The first and last samples above that threshold bound the result, widened
/// by 256 samples on each side. A buffer with no sample above the threshold (e.g. all
/// zeros) is returned unchanged.
pub fn trim_waveform(waveform: &[f32]) -> Vec<f32> {
    let (start, end) = trim_bounds(waveform);
    waveform[start..end].to_vec()
}

/// Compute the `[start, end)` range `trim_waveform` keeps.
pub fn trim_bounds(waveform: &[f32]) -> (usize, usize) {
    let len = waveform.len();
    if len == 0 {
        return (0, 0);
    }

    let window_amplitudes: Vec<f32> = waveform
        .chunks(WINDOW_SIZE)
        .map(|window| window.iter().map(|s| s.abs()).sum::<f32>() / window.len() as f32)
        .collect();
    let max_window_amp = window_amplitudes.iter().copied().fold(0.0f32, f32::max);
    let threshold = max_window_amp * THRESHOLD_RATIO;

    let mut start = 0;
    if let Some(i) = window_amplitudes.iter().position(|&amp| amp > threshold) {
        let window_start = i * WINDOW_SIZE;
        let window_end = (window_start + WINDOW_SIZE).min(len);
        if let Some(j) = (window_start..window_end).find(|&j| waveform[j].abs() > threshold) {
            start = j;
        }
    }

    let mut end = len;
    if let Some(i) = window_amplitudes.iter().rposition(|&amp| amp > threshold) {
        let window_start = i * WINDOW_SIZE;
        let window_end = (window_start + WINDOW_SIZE).min(len);
        if let Some(j) = (window_start..window_end).rev().find(|&j| waveform[j].abs() > threshold) {
            end = j + 1;
        }
    }

    (start.saturating_sub(MARGIN_SAMPLES), (end + MARGIN_SAMPLES).min(len))
}
