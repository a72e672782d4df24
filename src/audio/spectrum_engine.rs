use crate::audio::constants::{MAX_SCROLL_FACTOR, MIN_SCROLL_FACTOR};
use crate::audio::fft_engine::SpectralSlice;
use crate::error::{Result, SpectrogramError};

/// Scrolling time × frequency matrix of the most recent slices
///
/// Storage is column-major and contiguous: column `t` occupies
/// `data[t * bins .. (t + 1) * bins]`, column 0 is the oldest and column
/// `columns - 1` the newest. Appending shifts the whole matrix one column
/// toward the oldest end, which is O(T·nf) but keeps the renderer's view a
/// single contiguous, already-ordered slice.
pub struct SpectrogramHistory {
    data: Vec<f32>,
    columns: usize,
    bins: usize,

    // Display ticks since the last shift, in [0, scroll_factor)
    scroll_count: u32,
}

impl SpectrogramHistory {
    pub fn new(columns: usize, bins: usize) -> Result<Self> {
        if columns == 0 || bins == 0 {
            return Err(SpectrogramError::config(format!(
                "history needs at least one column and one bin, got {}x{}",
                columns, bins
            )));
        }

        Ok(Self {
            data: vec![0.0; columns * bins],
            columns,
            bins,
            scroll_count: 0,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn scroll_count(&self) -> u32 {
        self.scroll_count
    }

    /// Drop the oldest column and write `slice` as the newest.
    pub fn append(&mut self, slice: &SpectralSlice) -> Result<()> {
        if slice.bins() != self.bins {
            return Err(SpectrogramError::config(format!(
                "slice has {} bins, history holds {}",
                slice.bins(),
                self.bins
            )));
        }

        // scroll existing data
        self.data.copy_within(self.bins.., 0);

        // add new data
        let newest = (self.columns - 1) * self.bins;
        self.data[newest..].copy_from_slice(slice.power());
        Ok(())
    }

    /// Count one display tick; every `scroll_factor`-th tick appends `latest`.
    /// Returns whether the matrix shifted.
    pub fn tick(&mut self, latest: &SpectralSlice, scroll_factor: u32) -> Result<bool> {
        self.scroll_count += 1;
        if self.scroll_count < scroll_factor.max(1) {
            return Ok(false);
        }

        self.scroll_count = 0;
        self.append(latest)?;
        Ok(true)
    }

    pub fn reset_scroll_count(&mut self) {
        self.scroll_count = 0;
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.scroll_count = 0;
    }

    pub fn view(&self) -> HistoryView<'_> {
        HistoryView {
            data: &self.data,
            columns: self.columns,
            bins: self.bins,
        }
    }
}

/// Read-only view of the history for renderers
#[derive(Clone, Copy)]
pub struct HistoryView<'a> {
    data: &'a [f32],
    columns: usize,
    bins: usize,
}

impl<'a> HistoryView<'a> {
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Column `t`, 0 = oldest
    pub fn column(&self, t: usize) -> &'a [f32] {
        &self.data[t * self.bins..(t + 1) * self.bins]
    }

    pub fn get(&self, t: usize, bin: usize) -> f32 {
        self.data[t * self.bins + bin]
    }

    pub fn newest(&self) -> &'a [f32] {
        self.column(self.columns - 1)
    }

    pub fn iter_columns(&self) -> impl Iterator<Item = &'a [f32]> + 'a {
        self.data.chunks_exact(self.bins)
    }

    /// The whole matrix, column-major, oldest column first
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }
}

/// Interactive scroll speed, in display ticks per history column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollControl {
    scroll_factor: u32,
}

impl ScrollControl {
    pub fn new(scroll_factor: u32) -> Result<Self> {
        if !(MIN_SCROLL_FACTOR..=MAX_SCROLL_FACTOR).contains(&scroll_factor) {
            return Err(SpectrogramError::config(format!(
                "scroll factor must be in {}..={}, got {}",
                MIN_SCROLL_FACTOR, MAX_SCROLL_FACTOR, scroll_factor
            )));
        }
        Ok(Self { scroll_factor })
    }

    pub fn scroll_factor(&self) -> u32 {
        self.scroll_factor
    }

    /// Scroll faster; returns true when the factor changed
    pub fn faster(&mut self) -> bool {
        if self.scroll_factor > MIN_SCROLL_FACTOR {
            self.scroll_factor -= 1;
            return true;
        }
        false
    }

    /// Scroll slower; returns true when the factor changed
    pub fn slower(&mut self) -> bool {
        if self.scroll_factor < MAX_SCROLL_FACTOR {
            self.scroll_factor += 1;
            return true;
        }
        false
    }

    /// Time spanned by one history column
    pub fn seconds_per_column(&self, tick_rate_hz: f32) -> f32 {
        self.scroll_factor as f32 / tick_rate_hz
    }

    /// Time spanned by the whole history
    pub fn span_seconds(&self, tick_rate_hz: f32, columns: usize) -> f32 {
        self.seconds_per_column(tick_rate_hz) * columns as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(values: &[f32]) -> SpectralSlice {
        SpectralSlice::from_power(values.to_vec())
    }

    #[test]
    fn test_append_shifts_toward_oldest() {
        let mut history = SpectrogramHistory::new(3, 2).unwrap();
        history.append(&slice(&[1.0, 2.0])).unwrap();
        history.append(&slice(&[3.0, 4.0])).unwrap();

        let view = history.view();
        assert_eq!(view.column(0), &[0.0, 0.0]);
        assert_eq!(view.column(1), &[1.0, 2.0]);
        assert_eq!(view.column(2), &[3.0, 4.0]);

        history.append(&slice(&[5.0, 6.0])).unwrap();
        history.append(&slice(&[7.0, 8.0])).unwrap();
        assert_eq!(
            history.view().as_slice(),
            &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
        assert_eq!(history.view().get(2, 1), 8.0);
    }

    #[test]
    fn test_tick_shifts_every_scroll_factor() {
        let mut history = SpectrogramHistory::new(4, 2).unwrap();
        history.append(&slice(&[1.0, 1.0])).unwrap();
        let before = history.view().as_slice().to_vec();
        let latest = slice(&[9.0, 9.5]);

        for _ in 0..2 {
            assert!(!history.tick(&latest, 3).unwrap());
            assert_eq!(history.view().as_slice(), before.as_slice());
        }

        assert!(history.tick(&latest, 3).unwrap());
        assert_eq!(history.scroll_count(), 0);
        let view = history.view();
        assert_eq!(view.column(2), &before[6..8]);
        assert_eq!(view.newest(), &[9.0, 9.5]);
        for t in 0..3 {
            assert_eq!(view.column(t), &before[(t + 1) * 2..(t + 2) * 2]);
        }
    }

    #[test]
    fn test_scroll_factor_one_shifts_every_tick() {
        let mut history = SpectrogramHistory::new(2, 1).unwrap();
        assert!(history.tick(&slice(&[1.0]), 1).unwrap());
        assert!(history.tick(&slice(&[2.0]), 1).unwrap());
        assert_eq!(history.view().as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_append_rejects_wrong_bins() {
        let mut history = SpectrogramHistory::new(2, 3).unwrap();
        assert!(history.append(&slice(&[1.0])).unwrap_err().is_configuration());
        assert!(history.view().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_scroll_control_bounds() {
        let mut control = ScrollControl::new(2).unwrap();
        assert!(control.faster());
        assert!(!control.faster());
        assert_eq!(control.scroll_factor(), 1);

        let mut control = ScrollControl::new(MAX_SCROLL_FACTOR).unwrap();
        assert!(!control.slower());
        assert!(ScrollControl::new(0).unwrap_err().is_configuration());
        assert!(ScrollControl::new(51).is_err());
    }

    #[test]
    fn test_time_axis() {
        let control = ScrollControl::new(2).unwrap();
        assert!((control.seconds_per_column(60.0) - 1.0 / 30.0).abs() < 1e-6);
        assert!((control.span_seconds(60.0, 1024) - 1024.0 / 30.0).abs() < 1e-3);
    }
}
