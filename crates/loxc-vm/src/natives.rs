//! Built-in native functions.

use std::sync::OnceLock;
use std::time::Instant;

use loxc_runtime::Value;

/// Process start reference for `clock()`. Pinned once, on first VM
/// construction, so every VM in the process shares the same epoch.
static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Pins the clock epoch; called from `Vm::new`.
pub(crate) fn record_process_start() {
    PROCESS_START.get_or_init(Instant::now);
}

/// `clock()`: seconds since process start, as a number.
pub fn clock(_args: &[Value]) -> Value {
    let start = PROCESS_START.get_or_init(Instant::now);
    Value::Number(start.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        record_process_start();
        let first = match clock(&[]) {
            Value::Number(n) => n,
            other => panic!("clock returned {other:?}"),
        };
        let second = match clock(&[]) {
            Value::Number(n) => n,
            other => panic!("clock returned {other:?}"),
        };
        assert!(second >= first);
        assert!(first >= 0.0);
    }
}
