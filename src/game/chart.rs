use rand::SeedableRng;
use rand::distr::{Distribution, StandardUniform, Uniform};
use rand::rngs::StdRng;
use smallvec::SmallVec;
use thiserror::Error;

pub const NUM_DIRECTIONS: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Down,
    Up,
    Right,
}

impl Direction {
    pub const ALL: [Self; NUM_DIRECTIONS] = [Self::Left, Self::Down, Self::Up, Self::Right];

    #[inline(always)]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Down => Self::Up,
            Self::Up => Self::Down,
            Self::Right => Self::Left,
        }
    }

    #[inline(always)]
    const fn from_index(i: usize) -> Self {
        match i % NUM_DIRECTIONS {
            0 => Self::Left,
            1 => Self::Down,
            2 => Self::Up,
            _ => Self::Right,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub direction: Direction,
    pub completed: bool,
    /// Drawn inverted; the player presses the opposite direction.
    pub reverse: bool,
}

impl Note {
    #[inline(always)]
    pub const fn new(direction: Direction) -> Self {
        Self { direction, completed: false, reverse: false }
    }

    #[inline(always)]
    pub const fn required_direction(&self) -> Direction {
        if self.reverse { self.direction.opposite() } else { self.direction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("no current note: every note in the chart is already completed")]
    NoCurrentNote,
}

/// The short run of arrows a player must clear before the next beatline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteChart {
    notes: SmallVec<[Note; 16]>,
}

impl NoteChart {
    /// Uniformly random directions with `reverse_count` of them (capped at
    /// `note_count`) flagged reverse. The same seed always yields the same chart.
    pub fn create(note_count: usize, reverse_count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::generate(note_count, reverse_count, &mut rng)
    }

    pub fn generate(note_count: usize, reverse_count: usize, rng: &mut StdRng) -> Self {
        let mut notes: SmallVec<[Note; 16]> = SmallVec::with_capacity(note_count);
        let direction_dist = Uniform::new(0usize, NUM_DIRECTIONS).ok();
        for _ in 0..note_count {
            let idx = direction_dist.as_ref().map_or(0, |d| d.sample(rng));
            notes.push(Note::new(Direction::from_index(idx)));
        }

        // Partial Fisher-Yates over note indices picks distinct reverse slots.
        let reverse_count = reverse_count.min(note_count);
        let mut order: SmallVec<[usize; 16]> = (0..note_count).collect();
        for i in 0..reverse_count {
            let j = Uniform::new(i, note_count).map_or(i, |d| d.sample(rng));
            order.swap(i, j);
            notes[order[i]].reverse = true;
        }
        Self { notes }
    }

    pub fn from_directions(directions: &[Direction]) -> Self {
        Self { notes: directions.iter().copied().map(Note::new).collect() }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// First incomplete note, or `None` once the chart is cleared.
    pub fn current_note(&self) -> Option<&Note> {
        self.notes.iter().find(|n| !n.completed)
    }

    pub fn mark_current_completed(&mut self) -> Result<(), ChartError> {
        let note = self
            .notes
            .iter_mut()
            .find(|n| !n.completed)
            .ok_or(ChartError::NoCurrentNote)?;
        note.completed = true;
        Ok(())
    }

    pub fn mark_all_completed(&mut self) {
        for note in &mut self.notes {
            note.completed = true;
        }
    }

    /// Clears every completion flag. The only way a completed note reverts.
    pub fn reset(&mut self) {
        for note in &mut self.notes {
            note.completed = false;
        }
    }

    pub fn number_completed(&self) -> usize {
        self.notes.iter().filter(|n| n.completed).count()
    }

    pub fn number_remaining(&self) -> usize {
        self.notes.len() - self.number_completed()
    }

    pub fn number_reverse(&self) -> usize {
        self.notes.iter().filter(|n| n.reverse).count()
    }

    pub fn is_complete(&self) -> bool {
        self.notes.iter().all(|n| n.completed)
    }

    /// Shrinks the chart to at most `to_level` notes.
    pub fn truncate_notes(&mut self, to_level: usize) {
        self.notes.truncate(to_level);
    }
}

/// Source of fresh charts for each beatline.
pub trait ChartProvider {
    fn next_chart(&mut self, note_count: usize, reverse_count: usize) -> NoteChart;
}

/// Random charts from a seeded generator; each chart gets its own seed so a
/// session replays identically from the same root seed.
#[derive(Debug)]
pub struct RandomCharts {
    rng: StdRng,
}

impl RandomCharts {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl ChartProvider for RandomCharts {
    fn next_chart(&mut self, note_count: usize, reverse_count: usize) -> NoteChart {
        let seed: u64 = StandardUniform.sample(&mut self.rng);
        NoteChart::create(note_count, reverse_count, seed)
    }
}
