//! # qtask-sim
//!
//! The quantum circuit execution boundary treated as opaque by the rest of
//! this system (spec §1: "the quantum-circuit simulator backend, treated
//! as an opaque synchronous function `execute(circuit, shots) → counts |
//! error`"). [`SimulatorBackend`] is the trait the worker calls through;
//! [`MockSimulator`] stands in for a real backend (Qiskit/Aer in the
//! system this was distilled from) the way a narrow PyO3-style adapter
//! crate stands in for an external native library — a small,
//! clearly-bounded boundary around a foreign execution engine.
//!
//! `execute` is deliberately synchronous: the caller (see `qtask-worker`)
//! is responsible for running it off the async runtime via
//! `spawn_blocking`, since this is CPU-bound work that must not block the
//! consume loop's ability to heartbeat and observe shutdown signals
//! (spec §4.5 step d, §9).

use qtask_core::task::Counts;
use thiserror::Error;

/// A classified simulator failure (spec §4.3's error categories).
#[derive(Debug, Error)]
pub enum SimError {
    #[error("{0}")]
    CircuitParse(String),
    #[error("{0}")]
    Execution(String),
    #[error("{0}")]
    Unexpected(String),
}

impl SimError {
    pub fn category(&self) -> qtask_core::ErrorCategory {
        match self {
            SimError::CircuitParse(_) => qtask_core::ErrorCategory::CircuitParse,
            SimError::Execution(_) => qtask_core::ErrorCategory::Execution,
            SimError::Unexpected(_) => qtask_core::ErrorCategory::Unexpected,
        }
    }

    /// The message to store on the task, in the "{category}: {detail}"
    /// shape produced by `ErrorCategory::classify`.
    pub fn classified_message(&self) -> String {
        self.category().classify(self)
    }
}

/// The opaque execution boundary. Implementations must be safe to call
/// from a blocking-pool thread.
pub trait SimulatorBackend: Send + Sync {
    /// Startup validation (spec §4.5 step 1): verify the backend is
    /// importable/initializable before the worker consumes any messages.
    fn self_check(&self) -> Result<(), SimError>;

    /// Execute `circuit` for `shots` repetitions, returning measurement
    /// counts or a classified failure.
    fn execute(&self, circuit: &str, shots: i32) -> Result<Counts, SimError>;
}

/// A mock backend standing in for a real quantum simulator.
///
/// Accepts a minimal OpenQASM-3-shaped subset: a version header and at
/// least one `qubit` declaration. Produces a plausible-looking counts
/// distribution over all measured bitstrings rather than actually
/// simulating the circuit — this system does not interpret circuit
/// semantics (spec's GLOSSARY: "Circuit — opaque string input to the
/// simulator; this system does not parse or interpret it").
///
/// Two magic substrings exist purely so tests can drive every branch of
/// the worker's error classification without a real backend:
/// `FORCE_EXECUTION_ERROR` and `FORCE_UNEXPECTED_ERROR`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSimulator;

const FORCE_EXECUTION_ERROR: &str = "FORCE_EXECUTION_ERROR";
const FORCE_UNEXPECTED_ERROR: &str = "FORCE_UNEXPECTED_ERROR";

impl MockSimulator {
    /// Count the qubits declared in `circuit`, e.g. `qubit[2] q;` → 2,
    /// bare `qubit q;` → 1. Returns `None` if no declaration is found.
    fn count_qubits(circuit: &str) -> Option<usize> {
        let idx = circuit.find("qubit")?;
        let rest = &circuit[idx + "qubit".len()..];
        let trimmed = rest.trim_start();
        if let Some(stripped) = trimmed.strip_prefix('[') {
            let end = stripped.find(']')?;
            stripped[..end].trim().parse::<usize>().ok()
        } else {
            Some(1)
        }
    }
}

impl SimulatorBackend for MockSimulator {
    fn self_check(&self) -> Result<(), SimError> {
        Ok(())
    }

    fn execute(&self, circuit: &str, shots: i32) -> Result<Counts, SimError> {
        if circuit.contains(FORCE_EXECUTION_ERROR) {
            return Err(SimError::Execution("simulator backend reported a runtime fault".into()));
        }
        if circuit.contains(FORCE_UNEXPECTED_ERROR) {
            return Err(SimError::Unexpected("unhandled fault escaped the executor".into()));
        }

        let trimmed = circuit.trim_start();
        if !trimmed.to_uppercase().starts_with("OPENQASM") {
            return Err(SimError::CircuitParse("missing OPENQASM version header".into()));
        }

        let num_qubits = Self::count_qubits(circuit)
            .ok_or_else(|| SimError::CircuitParse("no qubit declaration found".into()))?;
        if num_qubits == 0 || num_qubits > 32 {
            return Err(SimError::CircuitParse(format!(
                "qubit count {num_qubits} out of supported range"
            )));
        }

        Ok(distribute_shots(num_qubits, shots))
    }
}

/// Spread `shots` across a handful of random basis states over
/// `num_qubits` bits, mimicking the shape of real measurement counts
/// without simulating the circuit.
fn distribute_shots(num_qubits: usize, shots: i32) -> Counts {
    use rand::Rng;

    let shots = shots.max(0) as u64;
    let mut rng = rand::thread_rng();
    let num_outcomes = rng.gen_range(1..=(4usize.min(1 << num_qubits.min(8))).max(1));

    let mut outcomes = Vec::with_capacity(num_outcomes);
    for _ in 0..num_outcomes {
        let bits: String = (0..num_qubits)
            .map(|_| if rng.gen_bool(0.5) { '1' } else { '0' })
            .collect();
        outcomes.push(bits);
    }
    outcomes.sort();
    outcomes.dedup();

    let mut counts = Counts::new();
    let mut remaining = shots;
    for (i, bits) in outcomes.iter().enumerate() {
        let share = if i + 1 == outcomes.len() {
            remaining
        } else {
            let s = remaining / (outcomes.len() - i) as u64;
            remaining -= s;
            s
        };
        counts.insert(bits.clone(), share);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_header() {
        let sim = MockSimulator;
        let err = sim.execute("qubit[2] q;", 100).unwrap_err();
        assert!(matches!(err, SimError::CircuitParse(_)));
    }

    #[test]
    fn rejects_non_qasm_garbage() {
        let sim = MockSimulator;
        let err = sim.execute("INVALID QASM", 100).unwrap_err();
        assert!(matches!(err, SimError::CircuitParse(_)));
        assert_eq!(err.classified_message(), "Circuit parse error: no qubit declaration found");
    }

    #[test]
    fn happy_path_produces_bitstring_counts_summing_to_shots() {
        let sim = MockSimulator;
        let counts = sim
            .execute(
                "OPENQASM 3; include \"stdgates.inc\"; qubit[2] q; bit[2] c; h q[0]; cx q[0],q[1]; c[0]=measure q[0]; c[1]=measure q[1];",
                100,
            )
            .unwrap();
        assert!(!counts.is_empty());
        assert_eq!(counts.values().sum::<u64>(), 100);
        for key in counts.keys() {
            assert_eq!(key.len(), 2);
            assert!(key.chars().all(|c| c == '0' || c == '1'));
        }
    }

    #[test]
    fn force_execution_error_magic_string() {
        let sim = MockSimulator;
        let err = sim
            .execute("OPENQASM 3; qubit q; FORCE_EXECUTION_ERROR", 10)
            .unwrap_err();
        assert!(matches!(err, SimError::Execution(_)));
    }

    #[test]
    fn force_unexpected_error_magic_string() {
        let sim = MockSimulator;
        let err = sim
            .execute("OPENQASM 3; qubit q; FORCE_UNEXPECTED_ERROR", 10)
            .unwrap_err();
        assert!(matches!(err, SimError::Unexpected(_)));
    }

    #[test]
    fn self_check_always_succeeds_for_mock() {
        assert!(MockSimulator.self_check().is_ok());
    }
}
