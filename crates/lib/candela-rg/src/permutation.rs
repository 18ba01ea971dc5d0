/// Compile-time permutation domain of a kernel, reimplemented as a plain
/// bitfield value type with an explicit canonicalization function instead of
/// shader-combinator metaprogramming.
///
/// `remap` collapses logically redundant vectors (implication rules such as
/// "sky shadowing implies dynamic sky light implies sky light") and must be
/// idempotent. Only canonical, compiled vectors exist in the kernel registry;
/// the invocation layer canonicalizes before every lookup.
pub trait KernelPermutation: Sized + Copy + PartialEq {
    const BIT_COUNT: u32;

    fn from_bits(bits: u32) -> Self;
    fn bits(self) -> u32;

    fn remap(self) -> Self {
        self
    }

    fn should_compile(self) -> bool {
        true
    }

    fn enumerate() -> Vec<Self> {
        (0u32..(1 << Self::BIT_COUNT)).map(Self::from_bits).collect()
    }

    /// The distinct vectors that actually get compiled: canonical
    /// (fixed points of `remap`) and not excluded by `should_compile`.
    fn compiled_variants() -> Vec<Self> {
        Self::enumerate()
            .into_iter()
            .filter(|v| v.remap().bits() == v.bits() && v.should_compile())
            .collect()
    }
}

pub fn permuted_kernel_name<P: KernelPermutation>(base: &str, permutation: P) -> String {
    let canonical = permutation.remap();
    assert!(
        canonical.should_compile(),
        "kernel {:?} requested with a non-compiled permutation {:#x}",
        base,
        canonical.bits(),
    );
    format!("{}#{:x}", base, canonical.bits())
}
