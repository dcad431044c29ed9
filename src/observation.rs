use std::time::Instant;

/// One timestamped tick for a symbol.
///
/// Built once by the producer and only ever cloned afterwards; the feed hands
/// out copies, so nothing outside the producer can alter a stored tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: String,
    pub value: f64,
    /// Change from the previous value of the same key.
    pub delta: f64,
    pub generated_at: Instant,
}

impl Observation {
    /// Stamp a new observation with the current instant.
    pub fn new(key: impl Into<String>, value: f64, delta: f64) -> Self {
        Self::at(key, value, delta, Instant::now())
    }

    pub fn at(key: impl Into<String>, value: f64, delta: f64, generated_at: Instant) -> Self {
        Self {
            key: key.into(),
            value,
            delta,
            generated_at,
        }
    }

    pub fn is_uptick(&self) -> bool {
        self.delta >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_now() {
        let before = Instant::now();
        let obs = Observation::new("AAPL", 101.5, 0.5);
        assert_eq!(obs.key, "AAPL");
        assert!(obs.generated_at >= before);
    }

    #[test]
    fn test_zero_delta_counts_as_uptick() {
        assert!(Observation::new("X", 1.0, 0.0).is_uptick());
        assert!(!Observation::new("X", 1.0, -0.01).is_uptick());
    }
}
