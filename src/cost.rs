/// Assigns a weight to a queued item for capacity accounting.
///
/// The buffer only ever sums these weights; what a unit means (bytes,
/// records, anything else) is up to the implementation. Implementations
/// must be pure: the same item always yields the same cost.
pub trait CostAssigner<T: ?Sized>: Send + Sync {
    fn cost(&self, item: &T) -> usize;
}

/// Cost of a string is its UTF-8 encoded length in bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringLengthCost;

impl<T: AsRef<str> + ?Sized> CostAssigner<T> for StringLengthCost {
    fn cost(&self, item: &T) -> usize {
        item.as_ref().len()
    }
}

/// Every item costs 1, turning the buffer into a count-bounded queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCost;

impl<T: ?Sized> CostAssigner<T> for UnitCost {
    fn cost(&self, _item: &T) -> usize {
        1
    }
}

impl<T: ?Sized, F> CostAssigner<T> for F
where
    F: Fn(&T) -> usize + Send + Sync,
{
    fn cost(&self, item: &T) -> usize {
        self(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_length_counts_bytes() {
        assert_eq!(StringLengthCost.cost("msg1"), 4);
        assert_eq!(StringLengthCost.cost(&"héllo".to_string()), 6);
        assert_eq!(StringLengthCost.cost(""), 0);
    }

    #[test]
    fn unit_cost_ignores_content() {
        assert_eq!(CostAssigner::<str>::cost(&UnitCost, "a very long line"), 1);
        assert_eq!(CostAssigner::<u64>::cost(&UnitCost, &42), 1);
    }

    #[test]
    fn closures_are_cost_assigners() {
        let double = |s: &String| s.len() * 2;
        assert_eq!(double.cost(&"abc".to_string()), 6);
    }
}
