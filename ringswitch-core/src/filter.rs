//! Per-leaf frame predicates.

use std::fmt;

/// Opaque predicate over a raw frame.
///
/// Leaves own their gate by value: attaching clones the caller's gate, so
/// later changes to the original do not reach already wired leaves.
pub trait FilterGate: fmt::Debug + Send {
    fn pass(&self, frame: &[u8]) -> bool;

    fn clone_gate(&self) -> Box<dyn FilterGate>;
}

impl Clone for Box<dyn FilterGate> {
    fn clone(&self) -> Self {
        self.clone_gate()
    }
}

/// Gate built from a closure; mostly useful in tests and benches.
#[derive(Clone)]
pub struct FnGate<F>(pub F);

impl<F> fmt::Debug for FnGate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnGate")
    }
}

impl<F> FilterGate for FnGate<F>
where
    F: Fn(&[u8]) -> bool + Clone + Send + 'static,
{
    fn pass(&self, frame: &[u8]) -> bool {
        (self.0)(frame)
    }

    fn clone_gate(&self) -> Box<dyn FilterGate> {
        Box::new(self.clone())
    }
}
