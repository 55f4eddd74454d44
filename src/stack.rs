//! Fixed-depth value stack used by threads and the global stack

/// Depth of every CPU stack.
pub const STACK_SIZE: usize = 10;

/// Circular stack of `STACK_SIZE` integers. Pushing past the depth
/// overwrites the oldest value; popping an empty slot yields 0.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuStack {
    values: [i32; STACK_SIZE],
    sp: usize,
}

impl CpuStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, value: i32) {
        self.sp = if self.sp == 0 { STACK_SIZE - 1 } else { self.sp - 1 };
        self.values[self.sp] = value;
    }

    #[inline]
    pub fn pop(&mut self) -> i32 {
        let value = self.values[self.sp];
        self.values[self.sp] = 0;
        self.sp = (self.sp + 1) % STACK_SIZE;
        value
    }

    /// Top of stack without removing it.
    #[inline]
    pub fn top(&self) -> i32 {
        self.values[self.sp]
    }

    #[inline]
    pub fn top_mut(&mut self) -> &mut i32 {
        &mut self.values[self.sp]
    }

    /// Value `depth` entries below the top.
    pub fn get(&self, depth: usize) -> i32 {
        self.values[(self.sp + depth) % STACK_SIZE]
    }

    /// Reverse the order of all entries.
    pub fn flip(&mut self) {
        let mut ordered: Vec<i32> = (0..STACK_SIZE).map(|d| self.get(d)).collect();
        ordered.reverse();
        for (d, v) in ordered.into_iter().enumerate() {
            self.values[(self.sp + d) % STACK_SIZE] = v;
        }
    }

    pub fn clear(&mut self) {
        self.values = [0; STACK_SIZE];
        self.sp = 0;
    }
}
