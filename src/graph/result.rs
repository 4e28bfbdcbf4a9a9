//------------ LookupResult --------------------------------------------------

/// The outcome of evaluating a component graph for an address.
///
/// The default result, all zeroes with `is_group_offset` unset, is
/// returned when no graph matches the requested pair or when the raw
/// value maps into neither table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LookupResult {
    /// The raw leaf value the traversal produced.
    pub raw_value: u32,
    /// Offset into the profiles table or, when `is_group_offset` is set,
    /// the profile groups table. Zero when the raw value is unmapped.
    pub offset: u32,
    /// True when `offset` addresses a profile group rather than a single
    /// profile.
    pub is_group_offset: bool,
}
