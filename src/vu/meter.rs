//! Maps a frequency snapshot onto a fixed grid of lit bars.

pub const COLUMNS: usize = 5;
pub const SENSITIVITY: f32 = 1.8;
pub const DEFAULT_BARS: usize = 10;

/// Visual state of a single bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tier {
    #[default]
    Inactive,
    Active,
    Peak,
    Max,
}

impl Tier {
    pub fn glyph(self) -> char {
        match self {
            Tier::Inactive => '·',
            Tier::Active => '▮',
            Tier::Peak => '▲',
            Tier::Max => '█',
        }
    }
}

/// Bass columns carry more energy, so they are weighted up.
pub fn column_weight(column: usize) -> f32 {
    1.5 - 0.15 * column as f32
}

/// Weighted activation in [0, 1] for each column.
pub fn column_levels(snapshot: &[u8]) -> [f32; COLUMNS] {
    let band_size = snapshot.len() / COLUMNS;
    let mut levels = [0.0; COLUMNS];
    if band_size == 0 {
        return levels;
    }
    for (i, level) in levels.iter_mut().enumerate() {
        let band = &snapshot[i * band_size..(i + 1) * band_size];
        let sum: u32 = band.iter().map(|&b| u32::from(b)).sum();
        let average = sum as f32 / band_size as f32 / 255.0;
        *level = (average * column_weight(i) * SENSITIVITY).min(1.0);
    }
    levels
}

/// Rounds up so that any signal lights at least one bar.
pub fn active_bar_count(level: f32, bars: usize) -> usize {
    ((level * bars as f32).ceil() as usize).min(bars)
}

pub fn tier_for(bar: usize, active: usize, bars: usize) -> Tier {
    if bar >= active {
        return Tier::Inactive;
    }
    let position = bar as f32;
    if position > 0.8 * bars as f32 {
        Tier::Max
    } else if position > 0.5 * bars as f32 {
        Tier::Peak
    } else {
        Tier::Active
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VuGrid {
    columns: Vec<Vec<Tier>>,
}

impl VuGrid {
    pub fn inactive(bars: usize) -> Self {
        Self {
            columns: vec![vec![Tier::Inactive; bars]; COLUMNS],
        }
    }

    /// One segment per column, bottom bar first.
    pub fn to_text(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.iter().map(|t| t.glyph()).collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
impl VuGrid {
    pub fn active_bars(&self, column: usize) -> usize {
        self.columns[column]
            .iter()
            .filter(|t| **t != Tier::Inactive)
            .count()
    }

    pub fn is_inactive(&self) -> bool {
        self.columns.iter().flatten().all(|t| *t == Tier::Inactive)
    }
}

/// Holds the rendered grid; the grid is the only state kept between frames.
pub struct VuMeter {
    bars: usize,
    grid: VuGrid,
}

impl VuMeter {
    pub fn new(bars: usize) -> Self {
        let bars = bars.max(1);
        Self {
            bars,
            grid: VuGrid::inactive(bars),
        }
    }

    pub fn grid(&self) -> &VuGrid {
        &self.grid
    }

    pub fn update(&mut self, snapshot: &[u8]) -> &VuGrid {
        let levels = column_levels(snapshot);
        for (column, level) in self.grid.columns.iter_mut().zip(levels) {
            let active = active_bar_count(level, self.bars);
            for (j, bar) in column.iter_mut().enumerate() {
                *bar = tier_for(j, active, self.bars);
            }
        }
        &self.grid
    }

    pub fn reset(&mut self) -> &VuGrid {
        for bar in self.grid.columns.iter_mut().flatten() {
            *bar = Tier::Inactive;
        }
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_lights_nothing() {
        let mut meter = VuMeter::new(10);
        assert!(meter.update(&[0; 128]).is_inactive());
    }

    #[test]
    fn full_scale_lights_everything() {
        let mut meter = VuMeter::new(10);
        let grid = meter.update(&[255; 128]).clone();
        for column in 0..COLUMNS {
            assert_eq!(grid.active_bars(column), 10);
        }
        assert_eq!(column_levels(&[255; 128]), [1.0; COLUMNS]);
    }

    #[test]
    fn weights_favour_bass() {
        let weights: Vec<f32> = (0..COLUMNS).map(column_weight).collect();
        let expected = [1.5, 1.35, 1.2, 1.05, 0.9];
        for (w, e) in weights.iter().zip(expected) {
            assert!((w - e).abs() < 1e-6);
        }
    }

    #[test]
    fn trailing_samples_are_ignored() {
        // 128 / 5 = 25, so samples 125..128 belong to no band
        let mut snapshot = [0u8; 128];
        snapshot[125..].fill(255);
        assert_eq!(column_levels(&snapshot), [0.0; COLUMNS]);
    }

    #[test]
    fn short_snapshot_is_inactive() {
        assert_eq!(column_levels(&[255, 255, 255]), [0.0; COLUMNS]);
    }

    #[test]
    fn weak_signal_still_lights_one_bar() {
        let mut snapshot = [0u8; 128];
        snapshot[0] = 1;
        let mut meter = VuMeter::new(10);
        let grid = meter.update(&snapshot);
        assert_eq!(grid.active_bars(0), 1);
        assert_eq!(grid.active_bars(1), 0);
    }

    #[test]
    fn tiers_follow_bar_position() {
        let tiers: Vec<Tier> = (0..10).map(|j| tier_for(j, 10, 10)).collect();
        assert_eq!(&tiers[..6], &[Tier::Active; 6]);
        assert_eq!(&tiers[6..9], &[Tier::Peak; 3]);
        assert_eq!(tiers[9], Tier::Max);
        assert_eq!(tier_for(7, 7, 10), Tier::Inactive);
    }

    #[test]
    fn reset_clears_previous_frame() {
        let mut meter = VuMeter::new(4);
        meter.update(&[200; 128]);
        assert!(!meter.grid().is_inactive());
        assert!(meter.reset().is_inactive());
    }

    #[test]
    fn text_has_one_segment_per_column() {
        let meter = VuMeter::new(3);
        assert_eq!(meter.grid().to_text(), "··· ··· ··· ··· ···");
    }
}
