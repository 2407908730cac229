use crate::models::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Hold,
    Open {
        direction: Direction,
        sl_index: usize,
        tp_index: usize,
    },
    CloseExplicit,
}

impl Action {
    pub fn open_long(sl_index: usize, tp_index: usize) -> Self {
        Action::Open {
            direction: Direction::Long,
            sl_index,
            tp_index,
        }
    }

    pub fn open_short(sl_index: usize, tp_index: usize) -> Self {
        Action::Open {
            direction: Direction::Short,
            sl_index,
            tp_index,
        }
    }
}

/// Flat discrete encoding used by agents:
///
/// ```text
/// 0                       Hold
/// 1                       CloseExplicit
/// 2 ..  2 + S*T           Open Long  (sl = k / T, tp = k % T)
/// 2 + S*T .. 2 + 2*S*T    Open Short (same layout)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpace {
    sl_options: usize,
    tp_options: usize,
}

impl ActionSpace {
    pub fn new(sl_options: usize, tp_options: usize) -> Self {
        Self {
            sl_options,
            tp_options,
        }
    }

    fn combos(&self) -> usize {
        self.sl_options * self.tp_options
    }

    pub fn size(&self) -> usize {
        2 + 2 * self.combos()
    }

    /// Indices past the end decode to Hold.
    pub fn decode(&self, index: usize) -> Action {
        let combos = self.combos();
        match index {
            0 => Action::Hold,
            1 => Action::CloseExplicit,
            _ if combos == 0 => Action::Hold,
            i if i < 2 + combos => {
                let k = i - 2;
                Action::open_long(k / self.tp_options, k % self.tp_options)
            }
            i if i < 2 + 2 * combos => {
                let k = i - 2 - combos;
                Action::open_short(k / self.tp_options, k % self.tp_options)
            }
            _ => Action::Hold,
        }
    }

    pub fn encode(&self, action: Action) -> usize {
        match action {
            Action::Hold => 0,
            Action::CloseExplicit => 1,
            Action::Open {
                direction,
                sl_index,
                tp_index,
            } => {
                let (sl, tp) = self.clamp(sl_index, tp_index);
                let offset = match direction {
                    Direction::Long => 2,
                    Direction::Short => 2 + self.combos(),
                };
                offset + sl * self.tp_options + tp
            }
        }
    }

    /// Out-of-range option indices snap to the last configured option.
    pub fn clamp(&self, sl_index: usize, tp_index: usize) -> (usize, usize) {
        (
            sl_index.min(self.sl_options.saturating_sub(1)),
            tp_index.min(self.tp_options.saturating_sub(1)),
        )
    }
}
