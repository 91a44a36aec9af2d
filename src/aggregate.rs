use crate::memory::Memory;
use crate::record::{Measurement, SUBJECT_FIELDS};

/// Running sums over the valid repetitions of one case.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    sums: [f64; SUBJECT_FIELDS],
    memory_kb: f64,
    memory_readings: u32,
    count: u32,
}

/// Arithmetic means of a case's repetitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Averaged {
    pub measurement: Measurement,
    pub memory: Memory,
    pub runs: u32,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, measurement: &Measurement, memory: Memory) {
        for (sum, value) in self.sums.iter_mut().zip(measurement.values()) {
            *sum += value;
        }
        if let Memory::Known(kb) = memory {
            self.memory_kb += kb;
            self.memory_readings += 1;
        }
        self.count += 1;
    }

    /// Repetitions accumulated so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Sum of `time_total` over the accumulated repetitions.
    pub fn cumulative_total_ms(&self) -> f64 {
        Measurement::from_values(self.sums).total_time_ms()
    }

    /// Divide every sum by the number of repetitions actually accumulated.
    ///
    /// Runs without a memory reading count as zero; memory stays `Unknown`
    /// only when no run reported it. Returns `None` if nothing was accumulated.
    pub fn finalize(self) -> Option<Averaged> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let memory = if self.memory_readings > 0 {
            Memory::Known(self.memory_kb / n)
        } else {
            Memory::Unknown
        };
        Some(Averaged {
            measurement: Measurement::from_values(self.sums.map(|sum| sum / n)),
            memory,
            runs: self.count,
        })
    }
}
