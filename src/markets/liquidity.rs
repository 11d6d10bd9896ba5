use std::collections::HashMap;

/// Last-seen `scaledLiquidityMeasure` per bet id, recorded when a bet is
/// sampled. Lives for the whole agent lifetime and is never shared.
#[derive(Debug, Clone, Default)]
pub struct LiquidityCache {
    seen: HashMap<String, f64>,
}

impl LiquidityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bet_id: &str) -> Option<f64> {
        self.seen.get(bet_id).copied()
    }

    pub fn record(&mut self, bet_id: &str, liquidity: f64) {
        self.seen.insert(bet_id.to_string(), liquidity);
    }

    /// True when the bet was never recorded or its liquidity moved.
    pub fn has_changed(&self, bet_id: &str, liquidity: f64) -> bool {
        match self.get(bet_id) {
            Some(previous) => previous != liquidity,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
