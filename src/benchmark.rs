use std::collections::HashMap;

/// External industry-benchmark lookup, used only as a fallback when a
/// measure's own peer sample is too small to trust (§4.9.1). The peer
/// distribution's own average always wins once the sample is large
/// enough; this trait exists so that source can change without touching
/// the scoring engine.
pub trait BenchmarkProvider: Send + Sync {
    fn benchmark_for(&self, measure_name: &str) -> Option<f64>;
}

/// Default provider: a small fixed table of industry figures. A
/// data-driven provider can be swapped in later without the report-card
/// generator knowing the difference.
pub struct StaticBenchmarkProvider {
    table: HashMap<String, f64>,
}

impl StaticBenchmarkProvider {
    pub fn new(table: HashMap<String, f64>) -> Self {
        Self { table }
    }

    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }
}

impl BenchmarkProvider for StaticBenchmarkProvider {
    fn benchmark_for(&self, measure_name: &str) -> Option<f64> {
        self.table.get(measure_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_measure_returns_its_benchmark() {
        let mut table = HashMap::new();
        table.insert("no_show_rate".to_string(), 8.5);
        let provider = StaticBenchmarkProvider::new(table);
        assert_eq!(provider.benchmark_for("no_show_rate"), Some(8.5));
    }

    #[test]
    fn unknown_measure_returns_none() {
        let provider = StaticBenchmarkProvider::empty();
        assert_eq!(provider.benchmark_for("anything"), None);
    }
}
