//! Column storage with lossless run truncation.
//!
//! A column that shares a long leading or trailing run of values with a
//! nearby earlier column stores only the rest, plus a signed offset naming
//! the column to copy the run from. Negative offsets mean the leading run
//! was dropped, positive ones the trailing run. Column 0 and any column
//! whose length differs from the bin count are stored whole.

/// Furthest back a column may reference.
pub const MAX_TRUNCATION_DISTANCE: usize = 6;

/// How one stored column relates to its reference column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// Stored whole.
    None,
    /// Leading run omitted; copied from the column `distance` back.
    Leading { distance: usize },
    /// Trailing run omitted; copied from the column `distance` back.
    Trailing { distance: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StoredColumn {
    values: Vec<f32>,
    trunc: i8,
}

impl StoredColumn {
    fn whole(values: Vec<f32>) -> Self {
        Self { values, trunc: 0 }
    }

    fn distance(&self) -> usize {
        self.trunc.unsigned_abs() as usize
    }
}

/// Growable array of compressed columns of nominal height `height`.
#[derive(Debug, Clone, Default)]
pub struct ColumnStore {
    columns: Vec<StoredColumn>,
    height: usize,
}

impl ColumnStore {
    /// An empty store for columns of `height` bins.
    pub fn new(height: usize) -> Self {
        Self {
            columns: Vec::new(),
            height,
        }
    }

    /// Number of columns, including unset gaps.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Nominal bin count.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Changes the nominal bin count. Existing columns keep their stored
    /// data and are padded or spliced against the new height on read.
    pub fn set_height(&mut self, height: usize) {
        self.height = height;
    }

    /// Removes every column.
    pub fn clear(&mut self) {
        self.columns.clear();
    }

    /// The expanded column at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<Vec<f32>> {
        (index < self.columns.len()).then(|| self.expand(index))
    }

    /// Floats physically stored for `index`.
    pub fn stored_len(&self, index: usize) -> Option<usize> {
        self.columns.get(index).map(|c| c.values.len())
    }

    /// Floats physically stored across all columns.
    pub fn stored_total(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).sum()
    }

    /// How `index` is stored.
    pub fn truncation(&self, index: usize) -> Option<Truncation> {
        self.columns.get(index).map(|c| match c.trunc {
            0 => Truncation::None,
            t if t < 0 => Truncation::Leading { distance: c.distance() },
            _ => Truncation::Trailing { distance: c.distance() },
        })
    }

    /// Replaces the column at `index`, growing the store with empty columns
    /// as needed.
    pub fn set(&mut self, index: usize, values: Vec<f32>) {
        if index >= self.columns.len() {
            self.columns.resize_with(index + 1, StoredColumn::default);
        } else {
            self.detach_dependents(index);
        }
        self.truncate_and_store(index, values);
    }

    /// Stores whole every later column that copies values from `index`, so
    /// `index` can be rewritten without corrupting them.
    fn detach_dependents(&mut self, index: usize) {
        let last = (index + MAX_TRUNCATION_DISTANCE).min(self.columns.len().saturating_sub(1));
        for later in index + 1..=last {
            let column = &self.columns[later];
            if column.trunc != 0 && later - column.distance() == index {
                let expanded = self.expand(later);
                self.columns[later] = StoredColumn::whole(expanded);
            }
        }
    }

    fn truncate_and_store(&mut self, index: usize, values: Vec<f32>) {
        let h = self.height;
        if index == 0 || values.len() != h {
            self.columns[index] = StoredColumn::whole(values);
            return;
        }

        // The only candidate reference is the previous column, or the
        // column that one refers to, which keeps every chain one hop long.
        let previous = &self.columns[index - 1];
        let (known_direction, distance) = match previous.trunc {
            0 => (None, 1),
            t if t < 0 => (Some(Direction::Leading), previous.distance() + 1),
            _ => (Some(Direction::Trailing), previous.distance() + 1),
        };

        if distance <= MAX_TRUNCATION_DISTANCE {
            let reference = self.expand(index - distance);
            if reference.len() == h {
                let same = |i: usize| values[i].to_bits() == reference[i].to_bits();

                let leading = match known_direction {
                    Some(Direction::Trailing) => 0,
                    _ => (0..h).take_while(|&i| same(i)).count(),
                };
                let trailing = match known_direction {
                    Some(Direction::Leading) => 0,
                    _ => (0..h).rev().take_while(|&i| same(i)).count(),
                };
                let direction = known_direction.unwrap_or(if trailing > leading {
                    Direction::Trailing
                } else {
                    Direction::Leading
                });

                let limit = h / 4;
                match direction {
                    Direction::Leading if leading > limit => {
                        self.columns[index] = StoredColumn {
                            values: values[leading..].to_vec(),
                            trunc: -(distance as i8),
                        };
                        return;
                    }
                    Direction::Trailing if trailing > limit => {
                        self.columns[index] = StoredColumn {
                            values: values[..h - trailing].to_vec(),
                            trunc: distance as i8,
                        };
                        return;
                    }
                    _ => {}
                }
            }
        }

        self.columns[index] = StoredColumn::whole(values);
    }

    fn expand(&self, index: usize) -> Vec<f32> {
        let column = &self.columns[index];
        if index == 0 || column.trunc == 0 || column.distance() > index {
            return self.right_height(&column.values);
        }

        let reference = self.expand(index - column.distance());
        let stored = &column.values;
        let psize = reference.len();
        let csize = stored.len().min(psize);

        if column.trunc > 0 {
            let mut full = stored.clone();
            full.extend_from_slice(&reference[csize..]);
            full
        } else {
            let mut full = reference[..psize - csize].to_vec();
            full.extend_from_slice(stored);
            full
        }
    }

    fn right_height(&self, values: &[f32]) -> Vec<f32> {
        let mut column = values.to_vec();
        if column.len() != self.height {
            column.resize(self.height, 0.0);
        }
        column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Leading,
    Trailing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(height: usize, columns: &[Vec<f32>]) -> ColumnStore {
        let mut store = ColumnStore::new(height);
        for (i, c) in columns.iter().enumerate() {
            store.set(i, c.clone());
        }
        store
    }

    #[test]
    fn test_first_column_never_truncated() {
        let store = store_with(4, &[vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(store.truncation(0), Some(Truncation::None));
        assert_eq!(store.get(0), Some(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_shared_leading_run_is_dropped() {
        let a: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        let mut b = a.clone();
        b[7] = 9.0;
        let store = store_with(8, &[a.clone(), b.clone()]);

        assert_eq!(store.truncation(1), Some(Truncation::Leading { distance: 1 }));
        assert_eq!(store.stored_len(1), Some(1));
        assert_eq!(store.get(0), Some(a));
        assert_eq!(store.get(1), Some(b));
    }

    #[test]
    fn test_shared_trailing_run_is_dropped() {
        let a = vec![0.0, 1.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let b = vec![3.0, 2.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let store = store_with(8, &[a, b.clone()]);

        assert_eq!(store.truncation(1), Some(Truncation::Trailing { distance: 1 }));
        assert_eq!(store.stored_len(1), Some(2));
        assert_eq!(store.get(1), Some(b));
    }

    #[test]
    fn test_short_runs_stored_whole() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let b = vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let store = store_with(8, &[a, b.clone()]);
        assert_eq!(store.truncation(1), Some(Truncation::None));
        assert_eq!(store.get(1), Some(b));
    }

    #[test]
    fn test_direction_reused_and_reference_shared() {
        let base = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mut columns = vec![base.clone()];
        for i in 1..=7 {
            let mut c = base.clone();
            c[7] = i as f32 + 1.0;
            columns.push(c);
        }
        let store = store_with(8, &columns);

        for i in 1..=6 {
            assert_eq!(store.truncation(i), Some(Truncation::Leading { distance: i }));
        }
        // Seventh hop would exceed the maximum distance.
        assert_eq!(store.truncation(7), Some(Truncation::None));
        for (i, c) in columns.iter().enumerate() {
            assert_eq!(store.get(i).as_ref(), Some(c));
        }
        assert!(store.stored_total() < 8 * 8);
    }

    #[test]
    fn test_wrong_length_column_stored_whole_and_padded() {
        let store = store_with(4, &[vec![1.0; 4], vec![1.0, 1.0]]);
        assert_eq!(store.truncation(1), Some(Truncation::None));
        assert_eq!(store.get(1), Some(vec![1.0, 1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_gaps_read_as_zero() {
        let mut store = ColumnStore::new(3);
        store.set(3, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.width(), 4);
        assert_eq!(store.get(1), Some(vec![0.0, 0.0, 0.0]));
        assert_eq!(store.get(3), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(store.get(4), None);
    }

    #[test]
    fn test_negative_zero_not_treated_as_equal() {
        let a = vec![0.0, 0.0, 0.0, 0.0, 1.0];
        let b = vec![-0.0, -0.0, -0.0, -0.0, 2.0];
        let store = store_with(5, &[a, b.clone()]);
        let back = store.get(1).expect("column");
        assert!(back.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_rewriting_reference_keeps_dependents_intact() {
        let a = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mut b = a.clone();
        b[7] = 2.0;
        let mut store = store_with(8, &[a, b.clone()]);
        assert_eq!(store.truncation(1), Some(Truncation::Leading { distance: 1 }));

        store.set(0, vec![9.0; 8]);
        assert_eq!(store.get(0), Some(vec![9.0; 8]));
        assert_eq!(store.get(1), Some(b));
    }

    #[test]
    fn test_height_change_does_not_panic() {
        let a = vec![1.0, 1.0, 1.0, 1.0];
        let b = vec![1.0, 1.0, 1.0, 2.0];
        let mut store = store_with(4, &[a, b]);
        store.set_height(2);
        assert_eq!(store.get(0), Some(vec![1.0, 1.0]));
        assert!(store.get(1).is_some());
    }
}
