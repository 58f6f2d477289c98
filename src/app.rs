//! Shared plumbing for full-screen applications: the frame throttle that
//! paces their busy-wait loops and a small deterministic random source.

/// Reads the CPU cycle counter. Applications pace themselves against this
/// instead of a timer interrupt, since the kernel keeps IRQ 0 silent.
pub fn cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: rdtsc has no side effects and is available on every
    // supported CPU.
    unsafe {
        core::arch::x86_64::_rdtsc()
    }

    #[cfg(not(target_arch = "x86_64"))]
    0
}

/// Paces a polling loop to one step per `interval` counter ticks.
///
/// Comparisons use wrapping arithmetic so a counter wrap costs at most one
/// mistimed frame instead of a stall.
pub struct FrameThrottle {
    last: u64,
    interval: u64,
}

impl FrameThrottle {
    pub fn new(now: u64, interval: u64) -> FrameThrottle {
        FrameThrottle { last: now, interval }
    }

    /// True when a full interval has passed; arms the next one.
    pub fn ready(&mut self, now: u64) -> bool {
        self.tick(now).is_some()
    }

    /// Like [`ready`](Self::ready), but reports the elapsed tick count so
    /// callers can scale their simulation step to the real frame time.
    pub fn tick(&mut self, now: u64) -> Option<u64> {
        let elapsed = now.wrapping_sub(self.last);
        if elapsed < self.interval {
            return None;
        }

        self.last = now;
        Some(elapsed)
    }
}

/// Linear congruential generator, seeded from the cycle counter at
/// application start.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Rng {
        Rng { state: seed }
    }

    pub fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Uniform-ish pick in `0..n`.
    pub fn pick(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}
