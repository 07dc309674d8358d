/// Runs the wrapped closure when dropped, whichever way the scope is left.
pub struct ScopeGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_on_early_return() {
        let ran = Cell::new(false);
        let leave = |early: bool| {
            let _guard = ScopeGuard::new(|| ran.set(true));
            if early {
                return;
            }
        };
        leave(true);
        assert!(ran.get());
    }
}
