//! Deterministic generators for driving the engines in tests.

use rand::RngCore;

/// Replays a fixed script of 32-bit words and panics when it runs dry, so a
/// test draws exactly as many words as it budgeted for.
pub(crate) struct ScriptRng {
    words: Vec<u32>,
    at: usize,
}

impl ScriptRng {
    pub(crate) fn new(words: &[u32]) -> Self {
        Self {
            words: words.to_vec(),
            at: 0,
        }
    }
}

impl RngCore for ScriptRng {
    fn next_u32(&mut self) -> u32 {
        let word = *self
            .words
            .get(self.at)
            .expect("test drew more random words than scripted");
        self.at += 1;
        word
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Wraps a real generator and counts how many words were drawn.
pub(crate) struct CountingRng<R: RngCore> {
    inner: R,
    draws: u64,
}

impl<R: RngCore> CountingRng<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, draws: 0 }
    }

    pub(crate) fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws += 1;
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws += 1;
        self.inner.fill_bytes(dest);
    }
}
