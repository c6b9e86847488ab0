//! Tabular Q-learning over the cyclic step-index state space.

use crate::domain::Action;
use crate::error::{BacktestError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Version tag written into every persisted table.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// Dense action-value grid indexed by (state, action).
///
/// States are `step mod window`, so the table has exactly `window` rows.
/// The table survives across runs; only a ruin wipes it.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    values: Vec<[f64; Action::COUNT]>,
}

/// On-disk shape of a table. Explicit dimensions let a loader reject a grid
/// written for a different window instead of silently misindexing it.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable {
    format_version: u32,
    states: usize,
    actions: usize,
    values: Vec<Vec<f64>>,
}

impl QTable {
    pub fn zeros(states: usize) -> Self {
        Self {
            values: vec![[0.0; Action::COUNT]; states],
        }
    }

    pub fn states(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, state: usize, action: Action) -> f64 {
        self.values[state][action.index()]
    }

    pub fn set_value(&mut self, state: usize, action: Action, value: f64) {
        self.values[state][action.index()] = value;
    }

    /// Greedy action. Ties resolve to the lowest action index.
    pub fn best_action(&self, state: usize) -> Action {
        let row = &self.values[state];
        let mut best = 0;
        for i in 1..Action::COUNT {
            if row[i] > row[best] {
                best = i;
            }
        }
        Action::ALL[best]
    }

    pub fn max_value(&self, state: usize) -> f64 {
        self.value(state, self.best_action(state))
    }

    /// Epsilon-greedy selection: with probability `exploration_rate` pick a
    /// uniformly random action, otherwise the greedy one.
    pub fn choose_action(&self, state: usize, exploration_rate: f64, rng: &mut impl Rng) -> Action {
        if rng.gen::<f64>() < exploration_rate {
            Action::ALL[rng.gen_range(0..Action::COUNT)]
        } else {
            self.best_action(state)
        }
    }

    /// One-step Q-learning update.
    pub fn update(
        &mut self,
        state: usize,
        action: Action,
        reward: f64,
        next_state: usize,
        learning_rate: f64,
        discount_factor: f64,
    ) {
        let current = self.value(state, action);
        let target = reward + discount_factor * self.max_value(next_state);
        self.set_value(state, action, current + learning_rate * (target - current));
    }

    pub fn reset(&mut self) {
        for row in &mut self.values {
            *row = [0.0; Action::COUNT];
        }
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|row| row.iter().all(|&v| v == 0.0))
    }

    /// Write the table, replacing any previous file only once the new one is
    /// fully on disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let persisted = PersistedTable {
            format_version: TABLE_FORMAT_VERSION,
            states: self.states(),
            actions: Action::COUNT,
            values: self.values.iter().map(|row| row.to_vec()).collect(),
        };

        let tmp_path = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &persisted)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a table and check it matches the expected number of states.
    pub fn load(path: &Path, expected_states: usize) -> Result<Self> {
        let file = File::open(path)?;
        let persisted: PersistedTable = serde_json::from_reader(BufReader::new(file))?;

        if persisted.format_version != TABLE_FORMAT_VERSION {
            return Err(BacktestError::Table(format!(
                "unsupported format version {} in {}",
                persisted.format_version,
                path.display()
            )));
        }
        if persisted.states != expected_states || persisted.actions != Action::COUNT {
            return Err(BacktestError::Table(format!(
                "{} holds a {}x{} grid, expected {}x{}",
                path.display(),
                persisted.states,
                persisted.actions,
                expected_states,
                Action::COUNT
            )));
        }
        if persisted.values.len() != persisted.states {
            return Err(BacktestError::Table(format!(
                "{} declares {} states but stores {} rows",
                path.display(),
                persisted.states,
                persisted.values.len()
            )));
        }

        let mut values = Vec::with_capacity(persisted.states);
        for (state, row) in persisted.values.iter().enumerate() {
            let row: [f64; Action::COUNT] = row.as_slice().try_into().map_err(|_| {
                BacktestError::Table(format!(
                    "row {} of {} has {} columns",
                    state,
                    path.display(),
                    row.len()
                ))
            })?;
            values.push(row);
        }
        Ok(Self { values })
    }

    /// Load the table if the file exists, otherwise start from zeros.
    pub fn load_or_zeros(path: &Path, states: usize) -> Result<Self> {
        if path.exists() {
            Self::load(path, states)
        } else {
            Ok(Self::zeros(states))
        }
    }
}
