//! The CPU-bound computation every `/fibonacci-*` endpoint performs.
//!
//! Naive exponential recursion, so each input costs a predictable amount of
//! CPU. The base cases are part of the wire contract and differ from the
//! canonical sequence: `fib(2) = 2`.

/// Computes `fib(n)` with base cases `fib(n <= 0) = 0`, `fib(1) = 1` and
/// `fib(2) = 2`.
///
/// ```
/// use offload_core::fibonacci::fibonacci;
///
/// assert_eq!(fibonacci(0), 0);
/// assert_eq!(fibonacci(2), 2);
/// assert_eq!(fibonacci(10), 89);
/// ```
pub fn fibonacci(n: i64) -> u64 {
    match n {
        i64::MIN..=0 => 0,
        1 => 1,
        2 => 2,
        _ => fibonacci(n - 1).wrapping_add(fibonacci(n - 2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_cases_are_preserved() {
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(1), 1);
        assert_eq!(fibonacci(2), 2);
    }

    #[test]
    fn negative_inputs_yield_zero() {
        assert_eq!(fibonacci(-1), 0);
        assert_eq!(fibonacci(i64::MIN), 0);
    }

    #[test]
    fn recurrence_follows_shifted_base() {
        let expected = [0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];
        for (n, want) in expected.into_iter().enumerate() {
            assert_eq!(fibonacci(n as i64), want, "fib({n})");
        }
    }
}
