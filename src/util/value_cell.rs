//! Versioned value boxes for uniform and renderable values.
//!
//! Every write bumps the cell's version, so a consumer that remembers the
//! version it last uploaded can tell whether the value changed without
//! comparing the payload.

/// A value paired with a monotonically increasing version counter.
#[derive(Debug, Clone)]
pub struct ValueCell<T> {
    value: T,
    version: u64,
}

impl<T> ValueCell<T> {
    /// Wrap `value` at version 0.
    pub fn new(value: T) -> Self {
        Self { value, version: 0 }
    }

    /// Current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Version of the current value.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the value unconditionally and bump the version.
    pub fn update(&mut self, value: T) {
        self.value = value;
        self.version += 1;
    }

    /// Mutate in place through a closure and bump the version.
    pub fn modify(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.version += 1;
    }
}

impl<T: PartialEq> ValueCell<T> {
    /// Replace the value only when it differs from the current one.
    /// Returns `true` when the cell was written.
    pub fn update_if_changed(&mut self, value: T) -> bool {
        if self.value == value {
            false
        } else {
            self.update(value);
            true
        }
    }
}

impl<T: Copy> ValueCell<T> {
    /// Copy of the current value.
    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: Default> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_bumps_version() {
        let mut cell = ValueCell::new(1.0_f32);
        assert_eq!(cell.version(), 0);
        cell.update(2.0);
        assert_eq!(cell.value(), 2.0);
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn unchanged_value_keeps_version() {
        let mut cell = ValueCell::new([1.0_f32, 0.0]);
        assert!(!cell.update_if_changed([1.0, 0.0]));
        assert_eq!(cell.version(), 0);
        assert!(cell.update_if_changed([0.5, 0.0]));
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn modify_in_place() {
        let mut cell = ValueCell::new(vec![1, 2]);
        cell.modify(|v| v.push(3));
        assert_eq!(cell.get(), &vec![1, 2, 3]);
        assert_eq!(cell.version(), 1);
    }
}
