use std::collections::HashMap;

/// High-water table for mesas_pct. The upstream completion percentage
/// occasionally regresses between polls (partial retotalization); the value
/// shown downstream must never go backward for a given (ambito_id, categoria).
#[derive(Debug, Default)]
pub struct HighWater {
    last: HashMap<(String, String), f64>,
}

impl HighWater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns max(observed, last recorded) and records it.
    pub fn enforce(&mut self, ambito_id: &str, categoria: &str, observed: f64) -> f64 {
        let key = (ambito_id.to_string(), categoria.to_string());
        let effective = match self.last.get(&key) {
            Some(prev) => observed.max(*prev),
            None => observed,
        };
        self.last.insert(key, effective);
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_passes_through() {
        let mut hw = HighWater::new();
        assert_eq!(hw.enforce("AR", "SENADORES", 12.5), 12.5);
    }

    #[test]
    fn regressions_are_masked() {
        let mut hw = HighWater::new();
        assert_eq!(hw.enforce("AR", "SENADORES", 80.0), 80.0);
        assert_eq!(hw.enforce("AR", "SENADORES", 75.0), 80.0);
        assert_eq!(hw.enforce("AR", "SENADORES", 85.0), 85.0);
    }

    #[test]
    fn keys_are_independent() {
        let mut hw = HighWater::new();
        hw.enforce("AR", "SENADORES", 90.0);
        assert_eq!(hw.enforce("AR", "DIPUTADOS", 10.0), 10.0);
        assert_eq!(hw.enforce("04", "SENADORES", 10.0), 10.0);
    }
}
