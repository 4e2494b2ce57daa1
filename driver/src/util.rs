//! Small value-level helpers.

/// Returns `None` when `value` equals the type's default ("empty") value.
pub(crate) fn none_if_default<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_if_default() {
        assert_eq!(none_if_default(String::new()), None);
        assert_eq!(none_if_default("q".to_string()), Some("q".to_string()));
        assert_eq!(none_if_default(0_i32), None);
        assert_eq!(none_if_default(100_i32), Some(100));
    }
}
