/// Additive-increase/multiplicative-decrease window for the effective lookup
/// concurrency.
///
/// The operator-configured `concurrency` is a static guess at the external
/// service's tolerance; this window adapts below it. A slice that observed
/// lookup errors halves the window, a clean slice grows it by one, and it
/// never leaves the `[1, ceiling]` band, so the configured bound is still a
/// hard guarantee.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AimdWindow {
    ceiling: usize,
    current: usize,
}

impl AimdWindow {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            ceiling,
            current: ceiling,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Feed back one slice's lookup-failure count.
    pub fn observe(&mut self, lookup_failures: u64) {
        if lookup_failures > 0 {
            self.current = (self.current / 2).max(1);
        } else {
            self.current = (self.current + 1).min(self.ceiling);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_on_failures_and_recovers_additively() {
        let mut window = AimdWindow::new(8);
        assert_eq!(window.current(), 8);

        window.observe(3);
        assert_eq!(window.current(), 4);
        window.observe(1);
        assert_eq!(window.current(), 2);

        window.observe(0);
        window.observe(0);
        assert_eq!(window.current(), 4);
    }

    #[test]
    fn never_leaves_the_configured_band() {
        let mut window = AimdWindow::new(2);
        for _ in 0..10 {
            window.observe(5);
        }
        assert_eq!(window.current(), 1);

        for _ in 0..10 {
            window.observe(0);
        }
        assert_eq!(window.current(), 2);
    }

    #[test]
    fn zero_ceiling_is_clamped() {
        let window = AimdWindow::new(0);
        assert_eq!(window.current(), 1);
    }
}
